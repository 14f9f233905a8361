#![warn(missing_docs)]
#![allow(non_camel_case_types)]
#![no_std]

//! ## Schema-Driven Tag-Value Serialization
//! Compact sparse messages from compiled binary schemas, with an RPC protocol registry and zero-run packing
//!
//! ### Features
//! - Zero dependencies
//! - `no_std` support, WASM ready
//! - Schemas are data: one compiled bundle drives any number of encodes & decodes
//! - Sparse messages cost almost nothing: absent fields use no space, runs of absent tags collapse into one skip slot
//! - Small integers and booleans ride inline in the message header
//! - Integer arrays pick their element width at encode time (4 or 8 bytes)
//! - Adding fields to a type never breaks old readers, unknown tags are skipped
//! - Keyed struct arrays decode straight into maps
//! - Fixed point decimals, binary blobs, deeply nested & cyclic struct types
//! - A byte level zero-run packer squeezes the zeros typical of sparse messages
//!
//! The codec is host agnostic: encode pulls values through a callback and
//! decode pushes them back through the same shape, so any value model can sit
//! on top ([`encode::zp_encode`] / [`decode::zp_decode`]).  A dynamic value
//! host ships in [`values`], and [`ZP_Factory`] wraps the whole thing up.
//!
//! # Quick Example
//! ```rust
//! use zero_proto::ZP_Factory;
//! use zero_proto::error::ZP_Error;
//! use zero_proto::values::ZP_Value;
//! use zero_proto::pack::{zp_pack_vec, zp_unpack_vec};
//! use std::collections::BTreeMap;
//!
//! // Schema bundles are produced by a schema compiler; they use the same
//! // tag-value wire format as messages.  Built by hand here to stay self
//! // contained: .Person { name 0 : string, age 1 : integer }
//! fn item(payload: &[u8]) -> Vec<u8> {
//!     let mut out = (payload.len() as u32).to_le_bytes().to_vec();
//!     out.extend_from_slice(payload);
//!     out
//! }
//! fn record(slots: &[u16], blobs: &[&[u8]]) -> Vec<u8> {
//!     let mut out = (slots.len() as u16).to_le_bytes().to_vec();
//!     for s in slots { out.extend_from_slice(&s.to_le_bytes()); }
//!     for b in blobs { out.extend_from_slice(&item(b)); }
//!     out
//! }
//! let name_field = record(&[0, 6, 1, 2], &[b"name"]); // string, tag 0
//! let age_field  = record(&[0, 2, 1, 4], &[b"age"]);  // integer, tag 1
//! let fields = [item(&name_field), item(&age_field)].concat();
//! let person = record(&[0, 0], &[b"Person", &fields]);
//! let bundle = record(&[0], &[&item(&person)]);
//!
//! // one factory per schema, reusable for any number of messages
//! let factory = ZP_Factory::new(&bundle)?;
//!
//! let mut value = BTreeMap::new();
//! value.insert("name".to_string(), ZP_Value::String("Billy Joel".to_string()));
//! value.insert("age".to_string(), ZP_Value::Integer(44));
//!
//! let bytes = factory.encode("Person", &ZP_Value::Struct(value.clone()))?;
//! let (decoded, _used) = factory.decode("Person", &bytes)?;
//! assert_eq!(decoded, ZP_Value::Struct(value));
//!
//! // squeeze the zeros out for the wire
//! let packed = zp_pack_vec(&bytes);
//! let plain = zp_unpack_vec(&packed)?;
//! assert_eq!(&plain[..bytes.len()], &bytes[..]);
//!
//! # Ok::<(), ZP_Error>(())
//! ```
//!
//! ## Limits
//! - Encoded messages grow up to 16 MiB through the factory before failing
//! - Struct nesting is capped at 64 levels
//! - A header slot is 16 bits: inline values reach 0x7FFE, larger integers
//!   move to the data region

#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

pub mod error;
pub mod memory;
pub mod schema;
pub mod encode;
pub mod decode;
pub mod pack;
pub mod values;
mod utils;

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ZP_Error;
use crate::schema::{ZP_Schema, ZP_TypeRef};
use crate::values::{decode_value, default_value, encode_value, ZP_Value};

pub(crate) const SIZEOF_LENGTH: usize = 4;
pub(crate) const SIZEOF_HEADER: usize = 2;
pub(crate) const SIZEOF_FIELD: usize = 2;

/// Starting size of the factory's encode buffer.
pub const ZP_ENCODE_BUFFER_SIZE: usize = 2050;

/// Hard cap on encode buffer growth (16 MiB).
pub const ZP_ENCODE_MAX_SIZE: usize = 0x100_0000;

/// The main entry point: owns a parsed schema and drives the codec with the
/// dynamic value host from [`values`].
///
/// Factories are cheap to share: everything inside is read-only after
/// construction, so one factory can serve any number of threads.
#[derive(Debug)]
pub struct ZP_Factory {
    /// schema data used by this factory
    schema: ZP_Schema
}

impl ZP_Factory {

    /// Parse a compiled schema bundle into a factory.
    pub fn new(bundle: &[u8]) -> Result<Self, ZP_Error> {
        Ok(Self {
            schema: ZP_Schema::from_bundle(bundle)?
        })
    }

    /// The parsed schema, for direct lookups and the low level codec calls.
    pub fn schema(&self) -> &ZP_Schema {
        &self.schema
    }

    /// Render the schema as human readable text.
    pub fn dump(&self) -> String {
        self.schema.dump()
    }

    fn required_type(&self, type_name: &str) -> Result<ZP_TypeRef, ZP_Error> {
        match self.schema.type_by_name(type_name) {
            Some(t) => Ok(t),
            None => Err(ZP_Error::new(format!("unknown type {}", type_name)))
        }
    }

    /// Encode a value of the named type into a fresh `Vec`.
    ///
    /// The scratch buffer starts at [`ZP_ENCODE_BUFFER_SIZE`] and doubles on
    /// every [`ZP_Error::BufferTooSmall`] until the message fits or
    /// [`ZP_ENCODE_MAX_SIZE`] is reached.
    pub fn encode(&self, type_name: &str, value: &ZP_Value) -> Result<Vec<u8>, ZP_Error> {
        let st = self.required_type(type_name)?;
        let mut size = ZP_ENCODE_BUFFER_SIZE;
        loop {
            let mut buffer = vec![0u8; size];
            match encode_value(st, value, &mut buffer) {
                Ok(used) => {
                    buffer.truncate(used);
                    return Ok(buffer);
                },
                Err(ZP_Error::BufferTooSmall) => {
                    size *= 2;
                    if size > ZP_ENCODE_MAX_SIZE {
                        return Err(ZP_Error::ObjectTooLarge);
                    }
                },
                Err(e) => return Err(e)
            }
        }
    }

    /// Decode a message of the named type.  Returns the value and the bytes
    /// consumed; trailing bytes (e.g. unpack padding) are ignored.
    pub fn decode(&self, type_name: &str, data: &[u8]) -> Result<(ZP_Value, usize), ZP_Error> {
        let st = self.required_type(type_name)?;
        decode_value(st, data)
    }

    /// Build the default value of the named type.
    pub fn default_of(&self, type_name: &str) -> Result<ZP_Value, ZP_Error> {
        Ok(default_value(self.required_type(type_name)?))
    }
}

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeMap;
    use alloc::string::ToString;

    use crate::error::ZP_Error;
    use crate::schema::tests::{bundle, field_record, type_record};
    use crate::values::ZP_Value;
    use crate::ZP_Factory;

    fn blob_factory() -> Result<ZP_Factory, ZP_Error> {
        let t = type_record("Blob", &[field_record("data", Some(2), None, 0, false, None)]);
        ZP_Factory::new(&bundle(&[t], None))
    }

    #[test]
    fn encode_grows_past_the_first_buffer() -> Result<(), ZP_Error> {
        let factory = blob_factory()?;
        let mut value = BTreeMap::new();
        value.insert("data".to_string(), ZP_Value::String("x".repeat(100_000)));
        let value = ZP_Value::Struct(value);

        let bytes = factory.encode("Blob", &value)?;
        assert!(bytes.len() > crate::ZP_ENCODE_BUFFER_SIZE);

        let (decoded, used) = factory.decode("Blob", &bytes)?;
        assert_eq!(used, bytes.len());
        assert_eq!(decoded, value);
        Ok(())
    }

    #[test]
    fn encode_respects_the_size_cap() -> Result<(), ZP_Error> {
        let factory = blob_factory()?;
        let mut value = BTreeMap::new();
        value.insert("data".to_string(), ZP_Value::String("x".repeat(crate::ZP_ENCODE_MAX_SIZE + 1)));

        let r = factory.encode("Blob", &ZP_Value::Struct(value));
        assert_eq!(r, Err(ZP_Error::ObjectTooLarge));
        Ok(())
    }

    #[test]
    fn unknown_type_is_an_error() -> Result<(), ZP_Error> {
        let factory = blob_factory()?;
        assert!(factory.encode("Nope", &ZP_Value::Struct(BTreeMap::new())).is_err());
        assert!(factory.decode("Nope", &[0, 0]).is_err());
        Ok(())
    }
}
