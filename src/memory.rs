//! Arena storage for parsed schemas
//!
//! Everything a schema owns (field tables, interned names) lives in one
//! [`ZP_Pool`] and is released together when the schema is dropped.  The pool
//! is a bump allocator over a list of fixed size chunks, so building a schema
//! costs a handful of allocations no matter how many strings it interns.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::str;

use crate::error::ZP_Error;

/// Payload size of one pool chunk.
pub const ZP_CHUNK_SIZE: usize = 1000;

/// Handle to a string interned in a [`ZP_Pool`].
///
/// The handle is a plain span, it stays valid for as long as the pool that
/// produced it.  Resolve it with [`ZP_Pool::read`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZP_PoolStr {
    chunk: u32,
    start: u32,
    len: u32
}

/// Bump allocator backed by a list of chunks.
#[derive(Debug)]
pub struct ZP_Pool {
    chunks: Vec<Box<[u8]>>,
    current: Option<usize>,
    current_used: usize
}

impl ZP_Pool {

    /// An empty pool with no chunks allocated yet.
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            current: None,
            current_used: 0
        }
    }

    fn new_chunk(&mut self, size: usize) -> usize {
        self.chunks.push(vec![0u8; size].into_boxed_slice());
        self.chunks.len() - 1
    }

    /// Reserve `size` bytes, aligned to 8.  Returns (chunk, offset).
    ///
    /// Requests of a chunk or more get a dedicated chunk.  A request that
    /// doesn't fit the current chunk gets a dedicated chunk too when it is at
    /// least as large as what the current chunk has already handed out,
    /// otherwise a fresh chunk becomes the current one.
    fn alloc(&mut self, size: usize) -> (usize, usize) {
        let size = (size + 7) & !7;
        if size >= ZP_CHUNK_SIZE {
            return (self.new_chunk(size), 0);
        }
        let current = match self.current {
            Some(idx) => idx,
            None => {
                let idx = self.new_chunk(ZP_CHUNK_SIZE);
                self.current = Some(idx);
                self.current_used = 0;
                idx
            }
        };
        if self.current_used + size <= ZP_CHUNK_SIZE {
            let offset = self.current_used;
            self.current_used += size;
            return (current, offset);
        }
        if size >= self.current_used {
            (self.new_chunk(size), 0)
        } else {
            let idx = self.new_chunk(ZP_CHUNK_SIZE);
            self.current = Some(idx);
            self.current_used = size;
            (idx, 0)
        }
    }

    /// Copy `bytes` into the pool and hand back a span for it.
    ///
    /// The bytes must be valid UTF-8, that's checked once here so [`read`]
    /// can stay cheap.
    ///
    /// [`read`]: ZP_Pool::read
    pub fn intern(&mut self, bytes: &[u8]) -> Result<ZP_PoolStr, ZP_Error> {
        if str::from_utf8(bytes).is_err() {
            return Err(ZP_Error::MalformedBundle);
        }
        let (chunk, start) = self.alloc(bytes.len());
        self.chunks[chunk][start..start + bytes.len()].copy_from_slice(bytes);
        Ok(ZP_PoolStr {
            chunk: chunk as u32,
            start: start as u32,
            len: bytes.len() as u32
        })
    }

    /// Resolve an interned span back into a `&str`.
    pub fn read(&self, span: ZP_PoolStr) -> &str {
        let start = span.start as usize;
        let bytes = &self.chunks[span.chunk as usize][start..start + span.len as usize];
        // spans are UTF-8 validated by intern
        unsafe { str::from_utf8_unchecked(bytes) }
    }

    #[cfg(test)]
    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
