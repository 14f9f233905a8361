//! Schema directed tag-value encoding
//!
//! [`zp_encode`] walks a type's field list and pulls every value from the
//! host through a callback, then lays the message out as a record header
//! (slot per present field, skip markers over the holes) followed by the data
//! region.  Small integers and booleans ride inline in their header slot,
//! everything else is a length prefixed blob.
//!
//! The callback receives a [`ZP_Arg`] describing the field plus a destination
//! buffer, and answers with a [`ZP_Supply`]: how many bytes it wrote, or one
//! of the absence sentinels.  Fatal host errors travel as `Err`.
//!
//! A destination buffer that's too small fails with
//! [`ZP_Error::BufferTooSmall`], nothing is ever truncated silently.  Callers
//! retry with a doubled buffer ([`crate::ZP_Factory::encode`] does this).

use crate::error::ZP_Error;
use crate::schema::{ZP_Kind, ZP_TypeRef};
use crate::utils::{write_u16, write_u32};
use crate::{SIZEOF_FIELD, SIZEOF_HEADER, SIZEOF_LENGTH};

/// Everything the codec tells the host about the value it wants next.
///
/// The same shape is used on the decode side, there the host reads instead of
/// writes.
#[derive(Debug, Clone, Copy)]
pub struct ZP_Arg<'schema> {
    /// Declared name of the field
    pub tagname: &'schema str,
    /// Declared wire tag of the field
    pub tagid: i32,
    /// Element kind (arrays report the element kind here)
    pub kind: ZP_Kind,
    /// For struct fields, the element type
    pub subtype: Option<ZP_TypeRef<'schema>>,
    /// For keyed struct arrays, the key tag inside the element type, else `-1`
    pub mainindex: i32,
    /// Kind refinement, see [`crate::schema::ZP_Field::extra`]
    pub extra: i64,
    /// `0` for a scalar field, `1..` for array elements, `-1` for the
    /// empty-array marker during decode
    pub index: i32
}

/// The host's answer to one value request during encode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZP_Supply {
    /// A value was written into the destination buffer, this many bytes
    Size(usize),
    /// No value for this field or array element
    Nil,
    /// The whole array field is absent, emit nothing
    NoArray
}

/// Whether a field made it into the message, and how.
enum Emitted {
    Skip,
    /// Inline header slot value, no data region bytes
    Inline(u16),
    /// Blob slot (slot value 0), this many data region bytes
    Data(usize)
}

#[inline(always)]
fn fill_size(buffer: &mut [u8], offset: usize, sz: usize) -> Result<usize, ZP_Error> {
    write_u32(buffer, offset, sz as u32)?;
    Ok(SIZEOF_LENGTH + sz)
}

fn encode_u32(value: u32, buffer: &mut [u8], offset: usize) -> Result<usize, ZP_Error> {
    if buffer.len() < offset + SIZEOF_LENGTH + 4 {
        return Err(ZP_Error::BufferTooSmall);
    }
    buffer[offset + SIZEOF_LENGTH..offset + SIZEOF_LENGTH + 4].copy_from_slice(&value.to_le_bytes());
    fill_size(buffer, offset, 4)
}

fn encode_u64(value: u64, buffer: &mut [u8], offset: usize) -> Result<usize, ZP_Error> {
    if buffer.len() < offset + SIZEOF_LENGTH + 8 {
        return Err(ZP_Error::BufferTooSmall);
    }
    buffer[offset + SIZEOF_LENGTH..offset + SIZEOF_LENGTH + 8].copy_from_slice(&value.to_le_bytes());
    fill_size(buffer, offset, 8)
}

/// Ask the host for a string or struct value, emitted as one blob.
fn encode_object<CB>(cb: &mut CB, arg: &ZP_Arg, buffer: &mut [u8], offset: usize) -> Result<Emitted, ZP_Error>
where CB: FnMut(&ZP_Arg, &mut [u8]) -> Result<ZP_Supply, ZP_Error> {
    if buffer.len() < offset + SIZEOF_LENGTH {
        return Err(ZP_Error::BufferTooSmall);
    }
    let capacity = buffer.len() - offset - SIZEOF_LENGTH;
    let sz = match cb(arg, &mut buffer[offset + SIZEOF_LENGTH..])? {
        ZP_Supply::Nil | ZP_Supply::NoArray => return Ok(Emitted::Skip),
        ZP_Supply::Size(sz) => sz
    };
    if sz > capacity {
        // the host wrote past the capacity it was given
        return Err(ZP_Error::Unreachable);
    }
    Ok(Emitted::Data(fill_size(buffer, offset, sz)?))
}

fn sign_extend_slot(buffer: &mut [u8], offset: usize) {
    let filler = if buffer[offset + 3] & 0x80 != 0 { 0xff } else { 0 };
    for b in &mut buffer[offset + 4..offset + 8] {
        *b = filler;
    }
}

/// Integer arrays pack elements back to back behind a single width byte.
///
/// Encoding starts in 4 byte mode; the first 8 byte element rewrites what's
/// already emitted, sign extending each earlier element in place.
fn encode_integer_array<CB>(cb: &mut CB, arg: &mut ZP_Arg, buffer: &mut [u8], offset: usize) -> Result<Option<usize>, ZP_Error>
where CB: FnMut(&ZP_Arg, &mut [u8]) -> Result<ZP_Supply, ZP_Error> {
    if buffer.len() < offset + 1 {
        return Err(ZP_Error::BufferTooSmall);
    }
    let width_offset = offset;
    let mut cursor = offset + 1;
    let mut intlen = 4usize;
    let mut n = 0usize;

    loop {
        arg.index = (n + 1) as i32;
        let mut tmp = [0u8; 8];
        match cb(arg, &mut tmp)? {
            ZP_Supply::Nil => break,
            ZP_Supply::NoArray => return Ok(None),
            ZP_Supply::Size(4) => {
                if buffer.len() < cursor + 8 {
                    return Err(ZP_Error::BufferTooSmall);
                }
                buffer[cursor..cursor + 4].copy_from_slice(&tmp[..4]);
                if intlen == 8 {
                    sign_extend_slot(buffer, cursor);
                }
                cursor += intlen;
            },
            ZP_Supply::Size(8) => {
                if intlen == 4 {
                    // rearrange everything emitted so far to 8 bytes
                    if buffer.len() < width_offset + 1 + n * 8 + 8 {
                        return Err(ZP_Error::BufferTooSmall);
                    }
                    for i in (0..n).rev() {
                        let src = width_offset + 1 + i * 4;
                        let dst = width_offset + 1 + i * 8;
                        buffer.copy_within(src..src + 4, dst);
                        sign_extend_slot(buffer, dst);
                    }
                    intlen = 8;
                    cursor = width_offset + 1 + n * 8;
                }
                if buffer.len() < cursor + 8 {
                    return Err(ZP_Error::BufferTooSmall);
                }
                buffer[cursor..cursor + 8].copy_from_slice(&tmp);
                cursor += 8;
            },
            ZP_Supply::Size(_) => return Err(ZP_Error::Unreachable)
        }
        n += 1;
    }

    if n == 0 {
        // empty array: the width byte is dropped, payload stays empty
        return Ok(Some(0));
    }
    buffer[width_offset] = intlen as u8;
    Ok(Some(cursor - offset))
}

/// Encode one array field as a single outer blob.
///
/// Returns `Emitted::Skip` when the host answers `NoArray`.
fn encode_array<CB>(cb: &mut CB, arg: &mut ZP_Arg, buffer: &mut [u8], offset: usize) -> Result<Emitted, ZP_Error>
where CB: FnMut(&ZP_Arg, &mut [u8]) -> Result<ZP_Supply, ZP_Error> {
    if buffer.len() < offset + SIZEOF_LENGTH {
        return Err(ZP_Error::BufferTooSmall);
    }
    let mut cursor = offset + SIZEOF_LENGTH;
    match arg.kind {
        ZP_Kind::Integer => {
            match encode_integer_array(cb, arg, buffer, cursor)? {
                None => return Ok(Emitted::Skip),
                Some(payload) => cursor += payload
            }
        },
        ZP_Kind::Boolean => {
            let mut index = 1;
            loop {
                arg.index = index;
                let mut tmp = [0u8; 8];
                match cb(arg, &mut tmp)? {
                    ZP_Supply::Nil => break,
                    ZP_Supply::NoArray => return Ok(Emitted::Skip),
                    ZP_Supply::Size(_) => {
                        if buffer.len() < cursor + 1 {
                            return Err(ZP_Error::BufferTooSmall);
                        }
                        let v = u32::from_le_bytes([tmp[0], tmp[1], tmp[2], tmp[3]]);
                        buffer[cursor] = if v != 0 { 1 } else { 0 };
                        cursor += 1;
                        index += 1;
                    }
                }
            }
        },
        ZP_Kind::String | ZP_Kind::Struct(_) => {
            // every element carries its own length prefix
            let mut index = 1;
            loop {
                if buffer.len() < cursor + SIZEOF_LENGTH {
                    return Err(ZP_Error::BufferTooSmall);
                }
                arg.index = index;
                let capacity = buffer.len() - cursor - SIZEOF_LENGTH;
                match cb(arg, &mut buffer[cursor + SIZEOF_LENGTH..])? {
                    ZP_Supply::Nil => break,
                    ZP_Supply::NoArray => return Ok(Emitted::Skip),
                    ZP_Supply::Size(sz) => {
                        if sz > capacity {
                            return Err(ZP_Error::Unreachable);
                        }
                        cursor += fill_size(buffer, cursor, sz)?;
                        index += 1;
                    }
                }
            }
        }
    }
    let payload = cursor - offset - SIZEOF_LENGTH;
    Ok(Emitted::Data(fill_size(buffer, offset, payload)?))
}

/// Encode one value of type `st` into `buffer`, pulling field values from the
/// host callback.  Returns the number of bytes used.
///
/// The callback contract is shared with decode: `Size(n)` supplies a value
/// (`n` bytes written into the destination), `Nil` ends a field or array,
/// `NoArray` omits a whole array field, and `Err` aborts the encode.
/// Integers and booleans are supplied as 4 or 8 little endian bytes; strings
/// are raw bytes; struct fields recursively call `zp_encode` into the
/// destination.
pub fn zp_encode<CB>(st: ZP_TypeRef, buffer: &mut [u8], cb: &mut CB) -> Result<usize, ZP_Error>
where CB: FnMut(&ZP_Arg, &mut [u8]) -> Result<ZP_Supply, ZP_Error> {
    let t = st.inner();
    let schema = st.schema;
    let header_sz = SIZEOF_HEADER + t.maxn * SIZEOF_FIELD;
    if buffer.len() < header_sz {
        return Err(ZP_Error::BufferTooSmall);
    }
    let mut data_offset = header_sz;
    let mut index = 0usize;
    let mut lasttag: i32 = -1;

    for f in &t.fields {
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

        let emitted = if f.is_array {
            encode_array(cb, &mut arg, buffer, data_offset)?
        } else {
            match f.kind {
                ZP_Kind::Integer | ZP_Kind::Boolean => {
                    let mut tmp = [0u8; 8];
                    match cb(&arg, &mut tmp)? {
                        ZP_Supply::Nil | ZP_Supply::NoArray => Emitted::Skip,
                        ZP_Supply::Size(4) => {
                            let v = u32::from_le_bytes([tmp[0], tmp[1], tmp[2], tmp[3]]);
                            if v < 0x7fff {
                                // small values ride inline in the header slot
                                Emitted::Inline(((v + 1) * 2) as u16)
                            } else {
                                Emitted::Data(encode_u32(v, buffer, data_offset)?)
                            }
                        },
                        ZP_Supply::Size(8) => {
                            Emitted::Data(encode_u64(u64::from_le_bytes(tmp), buffer, data_offset)?)
                        },
                        ZP_Supply::Size(_) => return Err(ZP_Error::Unreachable)
                    }
                },
                ZP_Kind::String | ZP_Kind::Struct(_) => {
                    encode_object(cb, &arg, buffer, data_offset)?
                }
            }
        };

        let slot_value = match emitted {
            Emitted::Skip => continue,
            Emitted::Inline(v) => v,
            Emitted::Data(sz) => {
                data_offset += sz;
                0
            }
        };

        let gap = f.tag - lasttag - 1;
        if gap > 0 {
            // cover the hole with a skip marker
            let skip = (gap - 1) * 2 + 1;
            if skip > 0xffff {
                return Err(ZP_Error::new("tag gap too large to encode"));
            }
            write_u16(buffer, SIZEOF_HEADER + index * SIZEOF_FIELD, skip as u16)?;
            index += 1;
        }
        write_u16(buffer, SIZEOF_HEADER + index * SIZEOF_FIELD, slot_value)?;
        index += 1;
        lasttag = f.tag;
    }

    write_u16(buffer, 0, index as u16)?;

    let datasz = data_offset - header_sz;
    if index != t.maxn {
        // fewer slots used than reserved, pull the data region left
        buffer.copy_within(header_sz..header_sz + datasz, SIZEOF_HEADER + index * SIZEOF_FIELD);
    }
    Ok(SIZEOF_HEADER + index * SIZEOF_FIELD + datasz)
}
