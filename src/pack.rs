//! Zero-run packing of encoded messages
//!
//! Sparse messages are mostly zero bytes.  [`zp_pack`] walks the input in
//! 8 byte groups: a group with few nonzero bytes becomes a 1 byte bitmap plus
//! just its nonzero bytes, while runs of dense groups are passed through
//! behind an `0xFF` marker (`0xFF, N-1, 8*N raw bytes`, up to 256 groups per
//! run).  [`zp_unpack`] mirrors it exactly.  Both directions work in whole
//! groups, so packing then unpacking returns the input zero padded to a
//! multiple of 8; trailing zeros are invisible to the tag-value decoder,
//! which stops at the sizes the message declares.
//!
//! Both functions return the required output size.  When the destination is
//! too small the output is incomplete and the caller re-invokes with a buffer
//! of (at least) the returned size.  [`zp_pack_bound`] gives the worst case
//! packed size up front.

use alloc::vec::Vec;

use crate::error::ZP_Error;

/// Worst case size of `zp_pack` output for `len` input bytes: the input plus
/// 2 bytes of run header per 2 KiB, plus one trailing group.
pub fn zp_pack_bound(len: usize) -> usize {
    (len + 2047) / 2048 * 2 + len + 2
}

fn write_ff(src: &[u8], src_offset: usize, dst: &mut [u8], dst_offset: usize, n: usize) {
    let align8_n = (n + 7) & !7;
    if dst_offset + 2 + align8_n > dst.len() {
        // not enough room, the caller will retry with a larger buffer
        return;
    }
    dst[dst_offset] = 0xff;
    dst[dst_offset + 1] = (align8_n / 8 - 1) as u8;
    dst[dst_offset + 2..dst_offset + 2 + n].copy_from_slice(&src[src_offset..src_offset + n]);
    for b in &mut dst[dst_offset + 2 + n..dst_offset + 2 + align8_n] {
        *b = 0;
    }
}

/// Pack `src` into `dst`.  Returns the required output size, which may be
/// larger than `dst.len()`, in which case the caller retries.
pub fn zp_pack(src: &[u8], dst: &mut [u8]) -> usize {
    let mut ff_src = 0usize;
    let mut ff_dst = 0usize;
    let mut ff_n = 0usize;
    let mut size = 0usize;

    let mut i = 0usize;
    while i < src.len() {
        let mut seg = [0u8; 8];
        let take = core::cmp::min(8, src.len() - i);
        seg[..take].copy_from_slice(&src[i..i + take]);

        let mut header = 0u8;
        let mut notzero = 0usize;
        for (j, b) in seg.iter().enumerate() {
            if *b != 0 {
                header |= 1 << j;
                notzero += 1;
            }
        }

        // a group of 6 or 7 nonzero bytes only counts as dense inside a run,
        // on its own the bitmap form is smaller
        let dense = notzero == 8 || (notzero >= 6 && ff_n > 0);
        if dense {
            if ff_n == 0 {
                // run header + first group
                ff_src = i;
                ff_dst = size;
                ff_n = 1;
                size += 10;
            } else {
                ff_n += 1;
                size += 8;
                if ff_n == 256 {
                    // run cap; the closing group may be the padded tail
                    let n = core::cmp::min(src.len() - ff_src, 256 * 8);
                    write_ff(src, ff_src, dst, ff_dst, n);
                    ff_n = 0;
                }
            }
        } else {
            if ff_n > 0 {
                write_ff(src, ff_src, dst, ff_dst, ff_n * 8);
                ff_n = 0;
            }
            if size < dst.len() {
                dst[size] = header;
            }
            let mut w = size + 1;
            for b in seg.iter() {
                if *b != 0 {
                    if w < dst.len() {
                        dst[w] = *b;
                    }
                    w += 1;
                }
            }
            size += notzero + 1;
        }
        i += 8;
    }

    if ff_n > 0 {
        // the run reaches the end of the input, its last group may be short
        let avail = src.len() - ff_src;
        let n = core::cmp::min(avail, ff_n * 8);
        write_ff(src, ff_src, dst, ff_dst, n);
    }
    size
}

/// Unpack `src` into `dst`.  Returns the required output size, which may be
/// larger than `dst.len()`, in which case the caller retries.  A truncated
/// run header or missing bitmap bytes fail with
/// [`ZP_Error::MalformedInput`].
pub fn zp_unpack(src: &[u8], dst: &mut [u8]) -> Result<usize, ZP_Error> {
    let mut size = 0usize;
    let mut i = 0usize;
    while i < src.len() {
        let header = src[i];
        i += 1;
        if header == 0xff {
            if i >= src.len() {
                return Err(ZP_Error::MalformedInput);
            }
            let n = (src[i] as usize + 1) * 8;
            i += 1;
            if src.len() < i + n {
                return Err(ZP_Error::MalformedInput);
            }
            if dst.len() >= size + n {
                dst[size..size + n].copy_from_slice(&src[i..i + n]);
            }
            i += n;
            size += n;
        } else {
            for j in 0..8 {
                if (header >> j) & 1 != 0 {
                    if i >= src.len() {
                        return Err(ZP_Error::MalformedInput);
                    }
                    if size < dst.len() {
                        dst[size] = src[i];
                    }
                    i += 1;
                } else if size < dst.len() {
                    dst[size] = 0;
                }
                size += 1;
            }
        }
    }
    Ok(size)
}

/// Pack into a fresh `Vec`, sized by [`zp_pack_bound`].
pub fn zp_pack_vec(src: &[u8]) -> Vec<u8> {
    let mut dst = vec![0u8; zp_pack_bound(src.len())];
    let used = zp_pack(src, &mut dst);
    dst.truncate(used);
    dst
}

/// Unpack into a fresh `Vec`, retrying once with the required size.
pub fn zp_unpack_vec(src: &[u8]) -> Result<Vec<u8>, ZP_Error> {
    let mut dst = vec![0u8; src.len() * 2];
    let need = zp_unpack(src, &mut dst)?;
    if need > dst.len() {
        dst = vec![0u8; need];
        let again = zp_unpack(src, &mut dst)?;
        if again != need {
            return Err(ZP_Error::Unreachable);
        }
    }
    dst.truncate(need);
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(input: &[u8]) {
        let packed = zp_pack_vec(input);
        assert!(packed.len() <= zp_pack_bound(input.len()));
        let unpacked = zp_unpack_vec(&packed).unwrap();
        // unpack works in whole groups, a short tail comes back zero padded
        assert_eq!(unpacked.len(), (input.len() + 7) & !7);
        assert_eq!(&unpacked[..input.len()], input);
        assert!(unpacked[input.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn known_vector() {
        let input = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88,
        ];
        let packed = zp_pack_vec(&input);
        assert_eq!(packed, vec![
            0x00,
            0xff, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88,
        ]);
        let unpacked = zp_unpack_vec(&packed).unwrap();
        assert_eq!(&unpacked[..], &input[..]);
    }

    #[test]
    fn sparse_group_uses_bitmap() {
        let input = [0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
        let packed = zp_pack_vec(&input);
        // bit 1 and bit 7 set
        assert_eq!(packed, vec![0x82, 0x09, 0x01]);
        roundtrip(&input);
    }

    #[test]
    fn six_nonzero_alone_is_a_bitmap() {
        let input = [1, 2, 3, 4, 5, 6, 0, 0];
        let packed = zp_pack_vec(&input);
        assert_eq!(packed.len(), 7);
        assert_eq!(packed[0], 0x3f);
        roundtrip(&input);
    }

    #[test]
    fn six_nonzero_extends_a_run() {
        let mut input = vec![0xaa; 8];
        input.extend_from_slice(&[1, 2, 3, 4, 5, 6, 0, 0]);
        let packed = zp_pack_vec(&input);
        // one run of two groups: FF, count, 16 raw bytes
        assert_eq!(packed.len(), 18);
        assert_eq!(packed[0], 0xff);
        assert_eq!(packed[1], 0x01);
        roundtrip(&input);
    }

    #[test]
    fn empty_input() {
        assert_eq!(zp_pack_vec(&[]), Vec::<u8>::new());
        assert_eq!(zp_unpack_vec(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn all_zeros() {
        let input = vec![0u8; 64];
        let packed = zp_pack_vec(&input);
        assert_eq!(packed, vec![0u8; 8]);
        roundtrip(&input);
    }

    #[test]
    fn dense_run_crosses_group_cap() {
        // 257 dense groups force a second run after the 256 group cap
        for len in &[2047usize, 2048, 2049, 2056] {
            let input: Vec<u8> = (0..*len).map(|i| (i % 255) as u8 + 1).collect();
            roundtrip(&input);
        }
    }

    #[test]
    fn tail_not_multiple_of_eight() {
        for len in &[1usize, 3, 7, 9, 15, 255, 256, 257] {
            let input: Vec<u8> = (0..*len).map(|i| if i % 3 == 0 { 0 } else { i as u8 }).collect();
            roundtrip(&input);
        }
    }

    #[test]
    fn dense_tail_shorter_than_group() {
        // a dense run whose last group is padding
        let mut input = vec![0xbb; 16];
        input.extend_from_slice(&[1, 2, 3]);
        roundtrip(&input);
    }

    #[test]
    fn unpack_reports_required_size() {
        let input = [0x00u8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let packed = zp_pack_vec(&input);
        let mut small = [0u8; 2];
        let need = zp_unpack(&packed, &mut small).unwrap();
        assert_eq!(need, 8);
    }

    #[test]
    fn unpack_rejects_truncated_run() {
        assert_eq!(zp_unpack_vec(&[0xff]), Err(ZP_Error::MalformedInput));
        assert_eq!(zp_unpack_vec(&[0xff, 0x01, 0x00]), Err(ZP_Error::MalformedInput));
        // bitmap promising more bytes than remain
        assert_eq!(zp_unpack_vec(&[0x03, 0x01]), Err(ZP_Error::MalformedInput));
    }
}
