//! Constant data pool.
//!
//! Generated code refers to constants (masks, tables, literals) by address.
//! The pool hands out 16-byte aligned copies, grows by whole OS chunks and
//! never frees individual allocations. Chunks for targets that embed
//! pointers as 32-bit immediates lie below 4 GiB.

use super::memory::{PageRegion, Placement};
use std::ptr::NonNull;

/// Minimum chunk size.
pub const DATA_CHUNK_SIZE: usize = 64 * 1024;

/// Alignment of every allocation.
pub const DATA_ALIGN: usize = 16;

const PAGE_SIZE: usize = 4096;

struct DataChunk {
    region: PageRegion,
    used: usize,
}

impl DataChunk {
    fn fit(&self, len: usize) -> Option<usize> {
        let at = (self.used + DATA_ALIGN - 1) & !(DATA_ALIGN - 1);
        (at <= self.region.len() && len <= self.region.len() - at).then_some(at)
    }
}

/// Append-only chunked allocator for constants referenced by generated code.
pub struct DataPool {
    chunks: Vec<DataChunk>,
    placement: Placement,
    bytes: usize,
}

impl DataPool {
    pub fn new(placement: Placement) -> Self {
        Self {
            chunks: Vec::new(),
            placement,
            bytes: 0,
        }
    }

    /// Copy `data` into the pool and return its stable address.
    ///
    /// Aborts the process if the OS cannot supply another chunk.
    pub fn copy_data(&mut self, data: &[u8]) -> NonNull<u8> {
        let (chunk, at) = match self.chunks.last().and_then(|c| c.fit(data.len())) {
            Some(at) => (self.chunks.len() - 1, at),
            None => (self.grow(data.len()), 0),
        };

        let chunk = &mut self.chunks[chunk];
        chunk.region.as_mut_slice()[at..at + data.len()].copy_from_slice(data);
        chunk.used = at + data.len();
        self.bytes += data.len();

        // SAFETY: `at` is inside a live mapping, which is never null.
        unsafe { NonNull::new_unchecked(chunk.region.as_ptr().add(at)) }
    }

    fn grow(&mut self, len: usize) -> usize {
        let size = DATA_CHUNK_SIZE.max((len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1));
        match PageRegion::reserve(size, self.placement) {
            Ok(region) => {
                log::debug!("data pool: new {} KB chunk at {:#x}", size / 1024, region.addr());
                self.chunks.push(DataChunk { region, used: 0 });
                self.chunks.len() - 1
            }
            Err(err) => {
                log::error!("data pool: cannot allocate {size} bytes: {err}");
                std::process::abort();
            }
        }
    }

    /// Drop every chunk.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Bytes handed out so far, without alignment padding.
    pub fn bytes_used(&self) -> usize {
        self.bytes
    }

    /// True when `ptr` points into one of the chunks.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        self.chunks
            .iter()
            .any(|c| addr >= c.region.addr() && addr < c.region.addr() + c.region.len())
    }
}
