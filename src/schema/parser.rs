//! Binary schema bundle parsing
//!
//! The bundle is one tag-value record with up to two blob fields: the type
//! array (tag 0) and the protocol array (tag 1).  Each array is a
//! concatenation of length prefixed records:
//!
//! ```text
//! .type {
//!     .field {
//!         name 0 : string
//!         buildin 1 : integer
//!         type 2 : integer
//!         tag 3 : integer
//!         array 4 : boolean
//!         key 5 : integer
//!     }
//!     name 0 : string
//!     fields 1 : *field
//! }
//! .protocol {
//!     name 0 : string
//!     tag 1 : integer
//!     request 2 : integer
//!     response 3 : integer
//!     confirm 4 : boolean
//! }
//! ```
//!
//! Every structural violation aborts the whole parse.

use alloc::vec::Vec;

use crate::error::ZP_Error;
use crate::memory::{ZP_Pool, ZP_PoolStr};
use crate::schema::{ZP_Field, ZP_Kind, ZP_Protocol, ZP_Schema, ZP_Type};
use crate::utils::{calc_pow, read_u16, read_u32};
use crate::{SIZEOF_FIELD, SIZEOF_HEADER, SIZEOF_LENGTH};

const BUILDIN_INTEGER: i32 = 0;
const BUILDIN_BOOLEAN: i32 = 1;
const BUILDIN_STRING: i32 = 2;
const BUILDIN_MAX: i32 = 3;

/// Validate the record layout of `stream` (header, slots, data region) and
/// return the slot count.
fn struct_field(stream: &[u8]) -> Result<usize, ZP_Error> {
    if stream.len() < SIZEOF_LENGTH {
        return Err(ZP_Error::MalformedBundle);
    }
    let fn_count = read_u16(stream, 0)? as usize;
    let header = SIZEOF_HEADER + SIZEOF_FIELD * fn_count;
    if stream.len() < header {
        return Err(ZP_Error::MalformedBundle);
    }
    let mut data_offset = header;
    for i in 0..fn_count {
        let value = read_u16(stream, SIZEOF_HEADER + i * SIZEOF_FIELD)?;
        if value != 0 {
            continue;
        }
        // a zero slot consumes one length prefixed blob from the data region
        let dsz = read_u32(stream, data_offset)? as usize;
        if stream.len() < data_offset + SIZEOF_LENGTH + dsz {
            return Err(ZP_Error::MalformedBundle);
        }
        data_offset += SIZEOF_LENGTH + dsz;
    }
    Ok(fn_count)
}

/// Count the items of a jagged array whose length prefix starts at `stream[0]`.
fn count_array(stream: &[u8]) -> Result<usize, ZP_Error> {
    let length = read_u32(stream, 0)? as usize;
    if stream.len() < SIZEOF_LENGTH + length {
        return Err(ZP_Error::MalformedBundle);
    }
    let end = SIZEOF_LENGTH + length;
    let mut offset = SIZEOF_LENGTH;
    let mut n = 0usize;
    while offset < end {
        let nsz = read_u32(stream, offset)? as usize;
        if offset + SIZEOF_LENGTH + nsz > end {
            return Err(ZP_Error::MalformedBundle);
        }
        n += 1;
        offset += SIZEOF_LENGTH + nsz;
    }
    Ok(n)
}

/// Intern the length prefixed string at `stream[offset..]`.
fn import_string(pool: &mut ZP_Pool, stream: &[u8], offset: usize) -> Result<ZP_PoolStr, ZP_Error> {
    let sz = read_u32(stream, offset)? as usize;
    let start = offset + SIZEOF_LENGTH;
    if stream.len() < start + sz {
        return Err(ZP_Error::MalformedBundle);
    }
    pool.intern(&stream[start..start + sz])
}

/// Parse one field record.  Returns the field and the bytes consumed from
/// `stream`, including the item's own length prefix.
fn import_field(pool: &mut ZP_Pool, type_n: usize, stream: &[u8]) -> Result<(ZP_Field, usize), ZP_Error> {
    let sz = read_u32(stream, 0)? as usize;
    let body = match stream.get(SIZEOF_LENGTH..SIZEOF_LENGTH + sz) {
        Some(b) => b,
        None => return Err(ZP_Error::MalformedBundle)
    };
    let fn_count = struct_field(body)?;
    let data_offset = SIZEOF_HEADER + fn_count * SIZEOF_FIELD;

    let mut name = None;
    let mut buildin: Option<i32> = None;
    let mut type_or_extra: Option<i32> = None;
    let mut field_tag: i32 = -1;
    let mut array = false;
    let mut key: i32 = -1;

    let mut tag: i32 = -1;
    for i in 0..fn_count {
        let value = read_u16(body, SIZEOF_HEADER + i * SIZEOF_FIELD)? as i32;
        tag += 1;
        if value & 1 != 0 {
            tag += value / 2;
            continue;
        }
        if tag == 0 {
            // name, always in the data region
            if value != 0 {
                return Err(ZP_Error::MalformedBundle);
            }
            name = Some(import_string(pool, body, data_offset)?);
            continue;
        }
        if value == 0 {
            // every other attribute must be inline
            return Err(ZP_Error::MalformedBundle);
        }
        let value = value / 2 - 1;
        match tag {
            1 => {
                if value >= BUILDIN_MAX {
                    return Err(ZP_Error::MalformedBundle);
                }
                buildin = Some(value);
            },
            2 => type_or_extra = Some(value),
            3 => field_tag = value,
            4 => array = value != 0,
            5 => key = value,
            _ => return Err(ZP_Error::MalformedBundle)
        }
    }

    let name = match name {
        Some(n) => n,
        None => return Err(ZP_Error::MalformedBundle)
    };
    if field_tag < 0 {
        return Err(ZP_Error::MalformedBundle);
    }

    let mut extra: i64 = 0;
    let kind = match buildin {
        Some(BUILDIN_INTEGER) => {
            if let Some(exp) = type_or_extra {
                extra = calc_pow(10, exp as u32);
            }
            ZP_Kind::Integer
        },
        Some(BUILDIN_BOOLEAN) => {
            if type_or_extra.is_some() {
                return Err(ZP_Error::MalformedBundle);
            }
            ZP_Kind::Boolean
        },
        Some(BUILDIN_STRING) => {
            if let Some(v) = type_or_extra {
                extra = v as i64;
            }
            ZP_Kind::String
        },
        Some(_) => return Err(ZP_Error::MalformedBundle),
        None => {
            // struct field, the type attribute is an index into the type array
            match type_or_extra {
                Some(idx) if idx >= 0 && (idx as usize) < type_n => ZP_Kind::Struct(idx as usize),
                _ => return Err(ZP_Error::MalformedBundle)
            }
        }
    };

    Ok((ZP_Field {
        name,
        tag: field_tag,
        kind,
        is_array: array,
        key,
        extra
    }, SIZEOF_LENGTH + sz))
}

/// Parse one type record.  Returns the type and the bytes consumed.
fn import_type(pool: &mut ZP_Pool, type_n: usize, stream: &[u8]) -> Result<(ZP_Type, usize), ZP_Error> {
    let sz = read_u32(stream, 0)? as usize;
    let body = match stream.get(SIZEOF_LENGTH..SIZEOF_LENGTH + sz) {
        Some(b) => b,
        None => return Err(ZP_Error::MalformedBundle)
    };
    let fn_count = struct_field(body)?;
    if fn_count < 1 || fn_count > 2 {
        return Err(ZP_Error::MalformedBundle);
    }
    // name and fields both live in the data region
    for i in 0..fn_count {
        if read_u16(body, SIZEOF_HEADER + i * SIZEOF_FIELD)? != 0 {
            return Err(ZP_Error::MalformedBundle);
        }
    }
    let mut data_offset = SIZEOF_HEADER + fn_count * SIZEOF_FIELD;
    let name = import_string(pool, body, data_offset)?;

    if fn_count == 1 {
        return Ok((ZP_Type { name, fields: Vec::new(), base: -1, maxn: 0 }, SIZEOF_LENGTH + sz));
    }

    data_offset += read_u32(body, data_offset)? as usize + SIZEOF_LENGTH;
    let field_array = match body.get(data_offset..) {
        Some(b) => b,
        None => return Err(ZP_Error::MalformedBundle)
    };
    let n = count_array(field_array)?;

    let mut fields = Vec::with_capacity(n);
    let mut maxn = n;
    let mut last: i32 = -1;
    let mut item_offset = SIZEOF_LENGTH;
    for _ in 0..n {
        let (field, used) = import_field(pool, type_n, &field_array[item_offset..])?;
        if field.tag <= last {
            // tags must be in ascending order
            return Err(ZP_Error::MalformedBundle);
        }
        if field.tag > last + 1 {
            // a hole costs one skip slot in the worst case header
            maxn += 1;
        }
        last = field.tag;
        fields.push(field);
        item_offset += used;
    }

    let base = if fields.is_empty() {
        -1
    } else {
        let first = fields[0].tag;
        let span = fields[fields.len() - 1].tag - first + 1;
        if span as usize != fields.len() { -1 } else { first }
    };

    Ok((ZP_Type { name, fields, base, maxn }, SIZEOF_LENGTH + sz))
}

/// Parse one protocol record.  Returns the protocol and the bytes consumed.
fn import_protocol(pool: &mut ZP_Pool, type_n: usize, stream: &[u8]) -> Result<(ZP_Protocol, usize), ZP_Error> {
    let sz = read_u32(stream, 0)? as usize;
    let body = match stream.get(SIZEOF_LENGTH..SIZEOF_LENGTH + sz) {
        Some(b) => b,
        None => return Err(ZP_Error::MalformedBundle)
    };
    let fn_count = struct_field(body)?;
    let data_offset = SIZEOF_HEADER + fn_count * SIZEOF_FIELD;

    let mut name = None;
    let mut proto_tag: i32 = -1;
    let mut request: Option<usize> = None;
    let mut response: Option<usize> = None;
    let mut confirm = false;

    let mut tag: i32 = -1;
    for i in 0..fn_count {
        let value = read_u16(body, SIZEOF_HEADER + i * SIZEOF_FIELD)? as i32;
        tag += 1;
        if value & 1 != 0 {
            tag += value / 2;
            continue;
        }
        if tag == 0 {
            if value != 0 {
                return Err(ZP_Error::MalformedBundle);
            }
            name = Some(import_string(pool, body, data_offset)?);
            continue;
        }
        if value == 0 {
            return Err(ZP_Error::MalformedBundle);
        }
        let value = value / 2 - 1;
        match tag {
            1 => {
                if value < 0 {
                    return Err(ZP_Error::MalformedBundle);
                }
                proto_tag = value;
            },
            2 => {
                if value < 0 || value as usize >= type_n {
                    return Err(ZP_Error::MalformedBundle);
                }
                request = Some(value as usize);
            },
            3 => {
                if value < 0 || value as usize >= type_n {
                    return Err(ZP_Error::MalformedBundle);
                }
                response = Some(value as usize);
            },
            4 => confirm = value != 0,
            _ => return Err(ZP_Error::MalformedBundle)
        }
    }

    let name = match name {
        Some(n) => n,
        None => return Err(ZP_Error::MalformedBundle)
    };
    if proto_tag < 0 {
        return Err(ZP_Error::MalformedBundle);
    }

    Ok((ZP_Protocol { name, tag: proto_tag, request, response, confirm }, SIZEOF_LENGTH + sz))
}

/// Parse a whole bundle into a schema.
pub(crate) fn create(bundle: &[u8]) -> Result<ZP_Schema, ZP_Error> {
    let mut pool = ZP_Pool::new();

    let fn_count = struct_field(bundle)?;
    if fn_count > 2 {
        return Err(ZP_Error::MalformedBundle);
    }

    let mut content = SIZEOF_HEADER + fn_count * SIZEOF_FIELD;
    let mut type_data: Option<(usize, usize)> = None;
    let mut proto_data: Option<(usize, usize)> = None;
    for i in 0..fn_count {
        // the type and protocol arrays are both blob valued
        if read_u16(bundle, SIZEOF_HEADER + i * SIZEOF_FIELD)? != 0 {
            return Err(ZP_Error::MalformedBundle);
        }
        let array = match bundle.get(content..) {
            Some(b) => b,
            None => return Err(ZP_Error::MalformedBundle)
        };
        let n = count_array(array)?;
        if i == 0 {
            type_data = Some((content + SIZEOF_LENGTH, n));
        } else {
            proto_data = Some((content + SIZEOF_LENGTH, n));
        }
        content += read_u32(bundle, content)? as usize + SIZEOF_LENGTH;
    }

    let type_n = type_data.map(|(_, n)| n).unwrap_or(0);

    let mut types = Vec::with_capacity(type_n);
    if let Some((mut offset, n)) = type_data {
        for _ in 0..n {
            let (t, used) = match bundle.get(offset..) {
                Some(s) => import_type(&mut pool, type_n, s)?,
                None => return Err(ZP_Error::MalformedBundle)
            };
            types.push(t);
            offset += used;
        }
    }

    let mut protocols = Vec::new();
    if let Some((mut offset, n)) = proto_data {
        protocols.reserve(n);
        for _ in 0..n {
            let (p, used) = match bundle.get(offset..) {
                Some(s) => import_protocol(&mut pool, type_n, s)?,
                None => return Err(ZP_Error::MalformedBundle)
            };
            protocols.push(p);
            offset += used;
        }
    }
    // lookups binary search on tag, the bundle order isn't trusted
    protocols.sort_by_key(|p| p.tag);

    Ok(ZP_Schema { memory: pool, types, protocols })
}
