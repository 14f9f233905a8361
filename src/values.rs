//! Dynamic host values for the codec
//!
//! The codec itself never sees a host value, it only talks to callbacks.
//! This module is the built in host: a dynamic [`ZP_Value`] tree plus the two
//! adapters that bridge it onto the callback contract,
//! [`encode_value`] and [`decode_value`].  Use it directly, or as the
//! reference for wiring your own value model to [`crate::encode::zp_encode`]
//! and [`crate::decode::zp_decode`].
//!
//! Structs are keyed by field name.  A keyed struct array (one that declares
//! a key tag) becomes a [`ZP_Value::Map`] whose keys are the elements' key
//! field values; every element must carry its key field.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::decode::{zp_decode, ZP_FieldData};
use crate::encode::{zp_encode, ZP_Arg, ZP_Supply};
use crate::error::ZP_Error;
use crate::schema::{ZP_Kind, ZP_TypeRef};

/// How deep nested structs may go before the codec gives up.
pub const ZP_MAX_DEPTH: usize = 64;

/// A dynamically typed value, the in-memory mirror of one encoded message.
#[derive(Debug, Clone, PartialEq)]
pub enum ZP_Value {
    /// Plain integer field
    Integer(i64),
    /// Decimal field (an integer with a scale factor on the wire)
    Double(f64),
    /// Boolean field
    Boolean(bool),
    /// Text string field
    String(String),
    /// Binary string field
    Bytes(Vec<u8>),
    /// Struct value, fields by declared name
    Struct(BTreeMap<String, ZP_Value>),
    /// Plain array field
    Array(Vec<ZP_Value>),
    /// Keyed struct array field
    Map(BTreeMap<ZP_Key, ZP_Value>)
}

/// Key of a [`ZP_Value::Map`] entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ZP_Key {
    /// Key taken from a boolean field
    Boolean(bool),
    /// Key taken from an integer field
    Integer(i64),
    /// Key taken from a string field
    String(String)
}

fn mismatch(arg: &ZP_Arg, expected: &str) -> ZP_Error {
    ZP_Error::new(format!(".{}[{}] is not {}", arg.tagname, arg.index, expected))
}

/// Write one scalar value into the codec's destination buffer.
fn supply(arg: &ZP_Arg, value: &ZP_Value, dest: &mut [u8], deep: usize) -> Result<ZP_Supply, ZP_Error> {
    match arg.kind {
        ZP_Kind::Integer => {
            let v: i64 = if arg.extra > 0 {
                match value {
                    ZP_Value::Double(d) => (*d * arg.extra as f64 + 0.5) as i64,
                    ZP_Value::Integer(i) => i.wrapping_mul(arg.extra),
                    _ => return Err(mismatch(arg, "a number"))
                }
            } else {
                match value {
                    ZP_Value::Integer(i) => *i,
                    _ => return Err(mismatch(arg, "an integer"))
                }
            };
            let high = v >> 31;
            if high == 0 || high == -1 {
                if dest.len() < 4 {
                    return Err(ZP_Error::BufferTooSmall);
                }
                dest[..4].copy_from_slice(&(v as u32).to_le_bytes());
                Ok(ZP_Supply::Size(4))
            } else {
                if dest.len() < 8 {
                    return Err(ZP_Error::BufferTooSmall);
                }
                dest[..8].copy_from_slice(&(v as u64).to_le_bytes());
                Ok(ZP_Supply::Size(8))
            }
        },
        ZP_Kind::Boolean => {
            let b = match value {
                ZP_Value::Boolean(b) => *b,
                _ => return Err(mismatch(arg, "a boolean"))
            };
            if dest.len() < 4 {
                return Err(ZP_Error::BufferTooSmall);
            }
            dest[..4].copy_from_slice(&(b as u32).to_le_bytes());
            Ok(ZP_Supply::Size(4))
        },
        ZP_Kind::String => {
            let bytes: &[u8] = match value {
                ZP_Value::String(s) => s.as_bytes(),
                ZP_Value::Bytes(b) => &b[..],
                _ => return Err(mismatch(arg, "a string"))
            };
            if dest.len() < bytes.len() {
                return Err(ZP_Error::BufferTooSmall);
            }
            dest[..bytes.len()].copy_from_slice(bytes);
            Ok(ZP_Supply::Size(bytes.len()))
        },
        ZP_Kind::Struct(_) => {
            let sub = match value {
                ZP_Value::Struct(m) => m,
                _ => return Err(mismatch(arg, "a struct"))
            };
            let subtype = match arg.subtype {
                Some(t) => t,
                None => return Err(ZP_Error::Unreachable)
            };
            let used = encode_struct(subtype, sub, dest, deep + 1)?;
            Ok(ZP_Supply::Size(used))
        }
    }
}

fn encode_struct(st: ZP_TypeRef, fields: &BTreeMap<String, ZP_Value>, buffer: &mut [u8], deep: usize) -> Result<usize, ZP_Error> {
    if deep >= ZP_MAX_DEPTH {
        return Err(ZP_Error::RecursionLimit);
    }
    // keyed maps are walked in key order, flattened once per array field
    let mut map_tag: i32 = -1;
    let mut map_elems: Vec<&ZP_Value> = Vec::new();
    let mut cb = |arg: &ZP_Arg, dest: &mut [u8]| -> Result<ZP_Supply, ZP_Error> {
        let entry = match fields.get(arg.tagname) {
            Some(v) => v,
            None => {
                return Ok(if arg.index > 0 { ZP_Supply::NoArray } else { ZP_Supply::Nil });
            }
        };
        if arg.index > 0 {
            let element = if arg.mainindex >= 0 {
                let map = match entry {
                    ZP_Value::Map(m) => m,
                    _ => return Err(mismatch(arg, "a map"))
                };
                if map_tag != arg.tagid {
                    map_tag = arg.tagid;
                    map_elems = map.values().collect();
                }
                match map_elems.get((arg.index - 1) as usize) {
                    Some(v) => *v,
                    None => return Ok(ZP_Supply::Nil)
                }
            } else {
                let items = match entry {
                    ZP_Value::Array(a) => a,
                    _ => return Err(mismatch(arg, "an array"))
                };
                match items.get((arg.index - 1) as usize) {
                    Some(v) => v,
                    None => return Ok(ZP_Supply::Nil)
                }
            };
            supply(arg, element, dest, deep)
        } else {
            supply(arg, entry, dest, deep)
        }
    };
    zp_encode(st, buffer, &mut cb)
}

/// Encode a [`ZP_Value::Struct`] as one message of type `st`.
///
/// Returns the bytes used, or [`ZP_Error::BufferTooSmall`] to be retried with
/// a larger buffer (see [`crate::ZP_Factory::encode`] for the retry loop).
pub fn encode_value(st: ZP_TypeRef, value: &ZP_Value, buffer: &mut [u8]) -> Result<usize, ZP_Error> {
    let fields = match value {
        ZP_Value::Struct(m) => m,
        _ => return Err(ZP_Error::new("top level value must be a struct"))
    };
    encode_struct(st, fields, buffer, 0)
}

/// Turn one decoded wire value into a [`ZP_Value`].
fn convert(arg: &ZP_Arg, value: ZP_FieldData, deep: usize) -> Result<ZP_Value, ZP_Error> {
    match (arg.kind, value) {
        (ZP_Kind::Integer, ZP_FieldData::Integer(v)) => {
            if arg.extra > 0 {
                Ok(ZP_Value::Double(v as f64 / arg.extra as f64))
            } else {
                Ok(ZP_Value::Integer(v))
            }
        },
        (ZP_Kind::Boolean, ZP_FieldData::Boolean(b)) => Ok(ZP_Value::Boolean(b)),
        (ZP_Kind::String, ZP_FieldData::Bytes(b)) => {
            if arg.extra == 1 {
                Ok(ZP_Value::Bytes(b.to_vec()))
            } else {
                Ok(ZP_Value::String(String::from_utf8(b.to_vec())?))
            }
        },
        (ZP_Kind::Struct(_), ZP_FieldData::Bytes(b)) => {
            let subtype = match arg.subtype {
                Some(t) => t,
                None => return Err(ZP_Error::Unreachable)
            };
            let mut sub = BTreeMap::new();
            let used = decode_struct(subtype, b, &mut sub, deep + 1)?;
            if used != b.len() {
                // a struct payload must be consumed exactly
                return Err(ZP_Error::MalformedInput);
            }
            Ok(ZP_Value::Struct(sub))
        },
        _ => Err(ZP_Error::MalformedInput)
    }
}

/// Pull the map key out of a decoded element.
fn element_key(arg: &ZP_Arg, element: &ZP_Value) -> Result<ZP_Key, ZP_Error> {
    let subtype = match arg.subtype {
        Some(t) => t,
        None => return Err(ZP_Error::Unreachable)
    };
    let key_field = match subtype.inner().field_by_tag(arg.mainindex) {
        Some(f) => f,
        None => return Err(ZP_Error::new(format!("no key field (tag={}) declared in [{}]", arg.mainindex, subtype.name())))
    };
    let key_name = subtype.schema.memory.read(key_field.name);
    let fields = match element {
        ZP_Value::Struct(m) => m,
        _ => return Err(ZP_Error::Unreachable)
    };
    match fields.get(key_name) {
        Some(ZP_Value::Integer(i)) => Ok(ZP_Key::Integer(*i)),
        Some(ZP_Value::Boolean(b)) => Ok(ZP_Key::Boolean(*b)),
        Some(ZP_Value::String(s)) => Ok(ZP_Key::String(s.clone())),
        _ => Err(ZP_Error::new(format!("Can't find main index (tag={}) in [{}]", arg.mainindex, arg.tagname)))
    }
}

fn decode_struct(st: ZP_TypeRef, data: &[u8], out: &mut BTreeMap<String, ZP_Value>, deep: usize) -> Result<usize, ZP_Error> {
    if deep >= ZP_MAX_DEPTH {
        return Err(ZP_Error::RecursionLimit);
    }
    let mut cb = |arg: &ZP_Arg, value: ZP_FieldData| -> Result<(), ZP_Error> {
        if let ZP_FieldData::EmptyArray = value {
            let container = if arg.mainindex >= 0 {
                ZP_Value::Map(BTreeMap::new())
            } else {
                ZP_Value::Array(Vec::new())
            };
            out.insert(arg.tagname.to_string(), container);
            return Ok(());
        }
        let converted = convert(arg, value, deep)?;
        if arg.index > 0 {
            if arg.mainindex >= 0 {
                let key = element_key(arg, &converted)?;
                let slot = out.entry(arg.tagname.to_string()).or_insert_with(|| ZP_Value::Map(BTreeMap::new()));
                match slot {
                    ZP_Value::Map(m) => {
                        m.insert(key, converted);
                    },
                    _ => return Err(ZP_Error::Unreachable)
                }
            } else {
                let slot = out.entry(arg.tagname.to_string()).or_insert_with(|| ZP_Value::Array(Vec::new()));
                match slot {
                    ZP_Value::Array(items) => items.push(converted),
                    _ => return Err(ZP_Error::Unreachable)
                }
            }
        } else {
            out.insert(arg.tagname.to_string(), converted);
        }
        Ok(())
    };
    zp_decode(st, data, &mut cb)
}

/// Decode one message of type `st` into a [`ZP_Value::Struct`].
///
/// Returns the value and the number of bytes consumed; trailing bytes past
/// the message are left alone.
pub fn decode_value(st: ZP_TypeRef, data: &[u8]) -> Result<(ZP_Value, usize), ZP_Error> {
    let mut out = BTreeMap::new();
    let used = decode_struct(st, data, &mut out, 0)?;
    Ok((ZP_Value::Struct(out), used))
}

/// Build the default value of a type: zeros, `false`, empty strings, empty
/// structs, and empty containers for array fields.
pub fn default_value(st: ZP_TypeRef) -> ZP_Value {
    let schema = st.schema;
    let mut out = BTreeMap::new();
    for f in &st.inner().fields {
        let name = schema.memory.read(f.name).to_string();
        let v = if f.is_array {
            if f.key >= 0 {
                ZP_Value::Map(BTreeMap::new())
            } else {
                ZP_Value::Array(Vec::new())
            }
        } else {
            match f.kind {
                ZP_Kind::Integer => {
                    if f.extra > 0 { ZP_Value::Double(0.0) } else { ZP_Value::Integer(0) }
                },
                ZP_Kind::Boolean => ZP_Value::Boolean(false),
                ZP_Kind::String => {
                    if f.extra == 1 { ZP_Value::Bytes(Vec::new()) } else { ZP_Value::String(String::new()) }
                },
                ZP_Kind::Struct(_) => ZP_Value::Struct(BTreeMap::new())
            }
        };
        out.insert(name, v);
    }
    ZP_Value::Struct(out)
}
