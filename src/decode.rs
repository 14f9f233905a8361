//! Schema directed tag-value decoding
//!
//! [`zp_decode`] reads the record header, walks the slots while rebuilding
//! the tag sequence from skip markers, and pushes every present value to the
//! host through a callback.  Tags the schema doesn't know are skipped without
//! a word, which is what makes adding fields to a type a compatible change.
//!
//! Each message is decoded from a complete buffer; there is no streaming.

use crate::encode::ZP_Arg;
use crate::error::ZP_Error;
use crate::schema::{ZP_Kind, ZP_TypeRef};
use crate::utils::{read_u16, read_u32};
use crate::{SIZEOF_FIELD, SIZEOF_HEADER, SIZEOF_LENGTH};

/// One decoded value as handed to the host callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZP_FieldData<'data> {
    /// Integer scalar or array element, sign extended to 64 bits
    Integer(i64),
    /// Boolean scalar or array element
    Boolean(bool),
    /// String, binary or struct payload, exactly as long as it was encoded
    Bytes(&'data [u8]),
    /// The field held an array with zero elements (delivered with
    /// `arg.index == -1` so the host can materialize an empty container)
    EmptyArray
}

#[inline(always)]
fn expand64(v: u32) -> i64 {
    v as i32 as i64
}

/// Decode one array payload (the bytes behind the outer length prefix).
fn decode_array<'data, CB>(cb: &mut CB, arg: &mut ZP_Arg, payload: &'data [u8]) -> Result<(), ZP_Error>
where CB: FnMut(&ZP_Arg, ZP_FieldData<'data>) -> Result<(), ZP_Error> {
    if payload.is_empty() {
        arg.index = -1;
        return cb(arg, ZP_FieldData::EmptyArray);
    }
    match arg.kind {
        ZP_Kind::Integer => {
            let width = payload[0] as usize;
            let body = &payload[1..];
            if width != 4 && width != 8 {
                return Err(ZP_Error::MalformedInput);
            }
            if body.len() % width != 0 {
                return Err(ZP_Error::MalformedInput);
            }
            for (i, chunk) in body.chunks_exact(width).enumerate() {
                let value = if width == 4 {
                    expand64(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                } else {
                    i64::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7]])
                };
                arg.index = i as i32 + 1;
                cb(arg, ZP_FieldData::Integer(value))?;
            }
        },
        ZP_Kind::Boolean => {
            for (i, b) in payload.iter().enumerate() {
                arg.index = i as i32 + 1;
                cb(arg, ZP_FieldData::Boolean(*b != 0))?;
            }
        },
        ZP_Kind::String | ZP_Kind::Struct(_) => {
            let mut offset = 0usize;
            let mut index = 1;
            while offset < payload.len() {
                let sz = read_u32(payload, offset).map_err(|_| ZP_Error::MalformedInput)? as usize;
                if payload.len() < offset + SIZEOF_LENGTH + sz {
                    return Err(ZP_Error::MalformedInput);
                }
                arg.index = index;
                cb(arg, ZP_FieldData::Bytes(&payload[offset + SIZEOF_LENGTH..offset + SIZEOF_LENGTH + sz]))?;
                offset += SIZEOF_LENGTH + sz;
                index += 1;
            }
        }
    }
    Ok(())
}

/// Decode one message of type `st` from `data`, pushing values to the host
/// callback.  Returns the number of bytes consumed.
///
/// Unknown tags are skipped silently.  Any structural violation (truncated
/// blob, bad integer width, inline value on a non-scalar field) aborts with
/// an error and the partial result should be discarded by the host.
pub fn zp_decode<'data, CB>(st: ZP_TypeRef, data: &'data [u8], cb: &mut CB) -> Result<usize, ZP_Error>
where CB: FnMut(&ZP_Arg, ZP_FieldData<'data>) -> Result<(), ZP_Error> {
    let t = st.inner();
    let schema = st.schema;
    let fn_count = read_u16(data, 0).map_err(|_| ZP_Error::MalformedInput)? as usize;
    let mut data_offset = SIZEOF_HEADER + fn_count * SIZEOF_FIELD;
    if data.len() < data_offset {
        return Err(ZP_Error::MalformedInput);
    }

    let mut tag: i32 = -1;
    for i in 0..fn_count {
        let value = read_u16(data, SIZEOF_HEADER + i * SIZEOF_FIELD)? as i32;
        tag += 1;
        if value & 1 != 0 {
            tag += value / 2;
            continue;
        }
        let value = value / 2 - 1;

        let blob = if value < 0 {
            // blob valued slot, consume it whether the tag is known or not
            let sz = read_u32(data, data_offset).map_err(|_| ZP_Error::MalformedInput)? as usize;
            if data.len() < data_offset + SIZEOF_LENGTH + sz {
                return Err(ZP_Error::MalformedInput);
            }
            let blob = &data[data_offset + SIZEOF_LENGTH..data_offset + SIZEOF_LENGTH + sz];
            data_offset += SIZEOF_LENGTH + sz;
            Some(blob)
        } else {
            None
        };

        let f = match t.field_by_tag(tag) {
            Some(f) => f,
            // unknown tag, additive schema evolution
            None => continue
        };
        let mut arg = ZP_Arg {
            tagname: schema.memory.read(f.name),
            tagid: f.tag,
            kind: f.kind,
            subtype: match f.kind {
                ZP_Kind::Struct(idx) => Some(ZP_TypeRef { schema, index: idx }),
                _ => None
            },
            mainindex: f.key,
            extra: f.extra,
            index: 0
        };

        match blob {
            Some(blob) => {
                if f.is_array {
                    decode_array(cb, &mut arg, blob)?;
                } else {
                    match f.kind {
                        ZP_Kind::Integer => {
                            let value = if blob.len() == 4 {
                                expand64(u32::from_le_bytes([blob[0], blob[1], blob[2], blob[3]]))
                            } else if blob.len() == 8 {
                                i64::from_le_bytes([blob[0], blob[1], blob[2], blob[3], blob[4], blob[5], blob[6], blob[7]])
                            } else {
                                return Err(ZP_Error::MalformedInput);
                            };
                            cb(&arg, ZP_FieldData::Integer(value))?;
                        },
                        ZP_Kind::String | ZP_Kind::Struct(_) => {
                            cb(&arg, ZP_FieldData::Bytes(blob))?;
                        },
                        ZP_Kind::Boolean => return Err(ZP_Error::MalformedInput)
                    }
                }
            },
            None => {
                // inline header value, only integer and boolean scalars qualify
                if f.is_array {
                    return Err(ZP_Error::MalformedInput);
                }
                match f.kind {
                    ZP_Kind::Integer => cb(&arg, ZP_FieldData::Integer(value as i64))?,
                    ZP_Kind::Boolean => cb(&arg, ZP_FieldData::Boolean(value != 0))?,
                    _ => return Err(ZP_Error::MalformedInput)
                }
            }
        }
    }
    Ok(data_offset)
}
