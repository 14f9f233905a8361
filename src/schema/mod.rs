//! Parsed schemas and the lookups the codec runs on
//!
//! A [`ZP_Schema`] is built once from a compiled binary bundle with
//! [`ZP_Schema::from_bundle`], then used read-only by any number of encode and
//! decode calls.  Types and protocols are stored in flat arrays and referenced
//! by index, so cyclic struct references cost nothing and the whole schema is
//! released as one unit.
//!
//! The bundle format itself is the same tag-value layout user messages use,
//! the schema is self-describing.  Parsing lives in [`parser`].

pub mod parser;
#[cfg(test)]
pub(crate) mod tests;

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ZP_Error;
use crate::memory::{ZP_Pool, ZP_PoolStr};

/// Scalar kind of a field.
///
/// Arrays are flagged separately on [`ZP_Field`], the kind here is always the
/// element kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZP_Kind {
    /// 32 or 64 bit signed integer, optionally a scaled decimal
    Integer,
    /// true/false
    Boolean,
    /// UTF-8 text, or a binary blob when `extra` is 1
    String,
    /// Nested struct, the value is an index into the schema's type array
    Struct(usize)
}

/// One declared field of a type.
#[derive(Debug, Clone, Copy)]
pub struct ZP_Field {
    pub(crate) name: ZP_PoolStr,
    /// Wire tag, unique within the type
    pub tag: i32,
    /// Element kind
    pub kind: ZP_Kind,
    /// Whether the field is an array of `kind`
    pub is_array: bool,
    /// For keyed struct arrays, the tag inside the element type whose value
    /// is the map key.  `-1` means a plain sequence.
    pub key: i32,
    /// Kind refinement: `10^k` for decimal integers (`0` = plain integer),
    /// `1` for binary strings (`0` = text)
    pub extra: i64
}

/// A user type: named, with fields in ascending tag order.
#[derive(Debug)]
pub struct ZP_Type {
    pub(crate) name: ZP_PoolStr,
    pub(crate) fields: Vec<ZP_Field>,
    /// First tag when the tags are dense, `-1` otherwise
    pub(crate) base: i32,
    /// Worst case number of header slots an encoded value of this type needs
    pub(crate) maxn: usize
}

impl ZP_Type {

    /// Field lookup by wire tag.  O(1) when the tags are dense, binary search
    /// otherwise.
    pub(crate) fn field_by_tag(&self, tag: i32) -> Option<&ZP_Field> {
        if self.base >= 0 {
            let idx = tag - self.base;
            if idx < 0 || idx as usize >= self.fields.len() {
                return None;
            }
            return Some(&self.fields[idx as usize]);
        }
        let mut begin = 0usize;
        let mut end = self.fields.len();
        while begin < end {
            let mid = (begin + end) / 2;
            let t = self.fields[mid].tag;
            if t == tag {
                return Some(&self.fields[mid]);
            }
            if tag > t {
                begin = mid + 1;
            } else {
                end = mid;
            }
        }
        None
    }
}

/// An RPC protocol entry: a wire tag mapped to request/response types.
#[derive(Debug)]
pub struct ZP_Protocol {
    pub(crate) name: ZP_PoolStr,
    pub(crate) tag: i32,
    pub(crate) request: Option<usize>,
    pub(crate) response: Option<usize>,
    pub(crate) confirm: bool
}

/// A parsed schema: the arena, the type array and the protocol array.
///
/// Immutable once built.  Share it freely between threads, every codec call
/// only borrows it.
#[derive(Debug)]
pub struct ZP_Schema {
    pub(crate) memory: ZP_Pool,
    pub(crate) types: Vec<ZP_Type>,
    /// Sorted by tag for binary search
    pub(crate) protocols: Vec<ZP_Protocol>
}

/// Borrowed handle to one type of a schema.
#[derive(Debug, Clone, Copy)]
pub struct ZP_TypeRef<'schema> {
    pub(crate) schema: &'schema ZP_Schema,
    pub(crate) index: usize
}

impl<'schema> ZP_TypeRef<'schema> {

    #[inline(always)]
    pub(crate) fn inner(&self) -> &'schema ZP_Type {
        &self.schema.types[self.index]
    }

    /// Name of the type.
    pub fn name(&self) -> &'schema str {
        self.schema.memory.read(self.inner().name)
    }

    /// Position of the type inside its schema's type array.
    pub fn index(&self) -> usize {
        self.index
    }

    /// How many fields the type declares.
    pub fn field_count(&self) -> usize {
        self.inner().fields.len()
    }
}

/// Borrowed handle to one protocol of a schema.
#[derive(Debug, Clone, Copy)]
pub struct ZP_ProtocolRef<'schema> {
    pub(crate) schema: &'schema ZP_Schema,
    pub(crate) index: usize
}

impl<'schema> ZP_ProtocolRef<'schema> {

    #[inline(always)]
    fn inner(&self) -> &'schema ZP_Protocol {
        &self.schema.protocols[self.index]
    }

    /// Name of the protocol.
    pub fn name(&self) -> &'schema str {
        self.schema.memory.read(self.inner().name)
    }

    /// Wire tag of the protocol.
    pub fn tag(&self) -> i32 {
        self.inner().tag
    }

    /// The request type, if the protocol declares one.
    pub fn request(&self) -> Option<ZP_TypeRef<'schema>> {
        self.inner().request.map(|index| ZP_TypeRef { schema: self.schema, index })
    }

    /// The response type, if the protocol declares one.
    pub fn response(&self) -> Option<ZP_TypeRef<'schema>> {
        self.inner().response.map(|index| ZP_TypeRef { schema: self.schema, index })
    }

    /// Whether the protocol requires an empty-bodied acknowledgement when no
    /// response type is declared.
    pub fn confirm(&self) -> bool {
        self.inner().confirm
    }

    /// Whether a reply is expected at all.
    ///
    /// True when a response type is declared, or when the protocol is marked
    /// `confirm` and an empty-bodied acknowledgement is required.
    pub fn has_response(&self) -> bool {
        let p = self.inner();
        p.response.is_some() || p.confirm
    }
}

impl ZP_Schema {

    /// Parse a compiled binary schema bundle.
    ///
    /// Any structural violation in the bundle aborts with an error, a partial
    /// schema is never observable.
    pub fn from_bundle(bundle: &[u8]) -> Result<ZP_Schema, ZP_Error> {
        parser::create(bundle)
    }

    /// Number of types in the schema.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of protocols in the schema.
    pub fn protocol_count(&self) -> usize {
        self.protocols.len()
    }

    /// Look a type up by name.  Types are few, this is a linear scan.
    pub fn type_by_name(&self, name: &str) -> Option<ZP_TypeRef> {
        for (index, t) in self.types.iter().enumerate() {
            if self.memory.read(t.name) == name {
                return Some(ZP_TypeRef { schema: self, index });
            }
        }
        None
    }

    /// Get a type by its index in the type array.
    pub fn type_by_index(&self, index: usize) -> Option<ZP_TypeRef> {
        if index >= self.types.len() {
            return None;
        }
        Some(ZP_TypeRef { schema: self, index })
    }

    /// Look a protocol up by tag.  The protocol array is sorted by tag, this
    /// is a binary search.
    pub fn protocol_by_tag(&self, tag: i32) -> Option<ZP_ProtocolRef> {
        let mut begin = 0usize;
        let mut end = self.protocols.len();
        while begin < end {
            let mid = (begin + end) / 2;
            let t = self.protocols[mid].tag;
            if t == tag {
                return Some(ZP_ProtocolRef { schema: self, index: mid });
            }
            if tag > t {
                begin = mid + 1;
            } else {
                end = mid;
            }
        }
        None
    }

    /// Look a protocol up by name.  Linear scan.
    pub fn protocol_by_name(&self, name: &str) -> Option<ZP_ProtocolRef> {
        for (index, p) in self.protocols.iter().enumerate() {
            if self.memory.read(p.name) == name {
                return Some(ZP_ProtocolRef { schema: self, index });
            }
        }
        None
    }

    /// Render the schema as human readable text, for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== {} types ===\n", self.types.len()));
        for t in &self.types {
            out.push_str(&format!("{}\n", self.memory.read(t.name)));
            for f in &t.fields {
                let array = if f.is_array { "*" } else { "" };
                let kind = match f.kind {
                    ZP_Kind::Integer => {
                        if f.extra > 0 { "decimal" } else { "integer" }
                    },
                    ZP_Kind::Boolean => "boolean",
                    ZP_Kind::String => {
                        if f.extra == 1 { "binary" } else { "string" }
                    },
                    ZP_Kind::Struct(idx) => self.memory.read(self.types[idx].name)
                };
                out.push_str(&format!("\t{} ({}) {}{}", self.memory.read(f.name), f.tag, array, kind));
                if let ZP_Kind::Integer = f.kind {
                    if f.extra > 0 {
                        out.push_str(&format!("({})", f.extra));
                    }
                }
                if f.key >= 0 {
                    out.push_str(&format!("[{}]", f.key));
                }
                out.push('\n');
            }
        }
        out.push_str(&format!("=== {} protocol ===\n", self.protocols.len()));
        for p in &self.protocols {
            out.push_str(&format!("\t{} ({})", self.memory.read(p.name), p.tag));
            match p.request {
                Some(idx) => out.push_str(&format!(" request:{}", self.memory.read(self.types[idx].name))),
                None => out.push_str(" request:(null)")
            }
            if let Some(idx) = p.response {
                out.push_str(&format!(" response:{}", self.memory.read(self.types[idx].name)));
            } else if p.confirm {
                out.push_str(" response nil");
            }
            out.push('\n');
        }
        out
    }
}
