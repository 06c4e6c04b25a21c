// This module implements the translation cache: one contiguous read-write-execute
// region holding every block of generated code plus the execution trampoline at its
// base. Positions inside the cache are byte offsets from the base, so handles survive
// nothing but their own cache incarnation; every invalidation or resize bumps an epoch
// counter that lets the generator reject stale handles. Emission never fails: a write
// that would run past the end is dropped whole and pins the cursor to the end, which the
// generator reports from gen_end.

//! Executable translation cache.

use super::error::{JitError, JitResult};
use super::memory::{flush_icache, PageRegion, Placement, Protection};
use crate::catalog::Field;

/// Slack added to every requested size.
pub const CACHE_GUARD: usize = 4096;

/// Cache sizes are multiples of this.
pub const CACHE_GRANULE: usize = 16 * 1024;

/// Contiguous executable region with a bump cursor.
pub struct TranslationCache {
    region: Option<PageRegion>,
    placement: Placement,
    code_start: usize,
    cursor: usize,
    epoch: u64,
}

impl TranslationCache {
    /// Create an unallocated cache; call [`init`](Self::init) before emitting.
    pub fn new(placement: Placement) -> Self {
        Self {
            region: None,
            placement,
            code_start: 0,
            cursor: 0,
            epoch: 0,
        }
    }

    /// Size in bytes of a cache requested as `size_kb`, or `None` when it
    /// does not fit a `usize`.
    pub fn rounded_size(size_kb: u32) -> Option<usize> {
        let granule = CACHE_GRANULE as u64;
        let requested = u64::from(size_kb)
            .checked_mul(1024)?
            .checked_add(CACHE_GUARD as u64)?;
        let rounded = requested.checked_add(granule - 1)? & !(granule - 1);
        usize::try_from(rounded).ok()
    }

    /// Allocate the cache, dropping any previous one.
    ///
    /// On failure the cache is left unallocated.
    pub fn init(&mut self, size_kb: u32) -> JitResult<()> {
        self.kill();

        let size = Self::rounded_size(size_kb).ok_or(JitError::CacheSize { size_kb })?;
        let region = PageRegion::reserve(size, self.placement)?;
        region.protect(Protection::ReadWriteExecute)?;

        log::debug!(
            "translation cache: {} KB at {:#x}",
            size / 1024,
            region.addr()
        );
        self.region = Some(region);
        Ok(())
    }

    /// Release the cache.
    pub fn kill(&mut self) {
        if self.region.take().is_some() {
            log::debug!("translation cache released");
        }
        self.code_start = 0;
        self.cursor = 0;
        self.epoch += 1;
    }

    /// Replace the cache by a fresh one of `size_kb`.
    pub fn set_cache_size(&mut self, size_kb: u32) -> JitResult<()> {
        self.init(size_kb)
    }

    pub fn is_allocated(&self) -> bool {
        self.region.is_some()
    }

    /// Total size in bytes, zero when unallocated.
    pub fn size(&self) -> usize {
        self.region.as_ref().map_or(0, PageRegion::len)
    }

    /// Host address of the base, zero when unallocated.
    pub fn base(&self) -> usize {
        self.region.as_ref().map_or(0, PageRegion::addr)
    }

    /// Host address of `offset`.
    pub fn address(&self, offset: usize) -> usize {
        self.base().wrapping_add(offset)
    }

    /// Offset of host address `addr` if it lies inside the cache.
    pub fn offset_of(&self, addr: usize) -> Option<usize> {
        let base = self.base();
        (self.is_allocated() && addr >= base && addr < base + self.size()).then(|| addr - base)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn code_start(&self) -> usize {
        self.code_start
    }

    /// Mark everything before `offset` as permanent; the cursor moves there too.
    pub fn set_code_start(&mut self, offset: usize) {
        let offset = offset.min(self.size());
        self.code_start = offset;
        self.cursor = offset;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn remaining(&self) -> usize {
        self.size().saturating_sub(self.cursor)
    }

    /// True when nothing more can be generated.
    pub fn is_full(&self) -> bool {
        !self.is_allocated() || self.cursor >= self.size()
    }

    /// Drop all generated code after the code start.
    pub fn invalidate(&mut self) {
        self.cursor = self.code_start;
        self.epoch += 1;
    }

    /// Align the cursor, filling the gap with `fill`. Returns the new cursor.
    pub fn align(&mut self, align: usize, fill: u8) -> usize {
        debug_assert!(align.is_power_of_two());
        let size = self.size();
        let target = ((self.cursor + align - 1) & !(align - 1)).min(size);
        if let Some(region) = self.region.as_mut() {
            region.as_mut_slice()[self.cursor..target].fill(fill);
        }
        self.cursor = target;
        target
    }

    /// Copy `bytes` to the cursor. Returns the offset they were written at.
    pub fn emit(&mut self, bytes: &[u8]) -> Option<usize> {
        let size = self.size();
        let region = self.region.as_mut()?;
        let at = self.cursor;
        if bytes.len() > size - at {
            self.cursor = size;
            return None;
        }
        region.as_mut_slice()[at..at + bytes.len()].copy_from_slice(bytes);
        self.cursor = at + bytes.len();
        Some(at)
    }

    pub fn emit_8(&mut self, value: u8) -> Option<usize> {
        self.emit(&[value])
    }

    pub fn emit_16(&mut self, value: u16) -> Option<usize> {
        self.emit(&value.to_ne_bytes())
    }

    pub fn emit_32(&mut self, value: u32) -> Option<usize> {
        self.emit(&value.to_ne_bytes())
    }

    pub fn emit_64(&mut self, value: u64) -> Option<usize> {
        self.emit(&value.to_ne_bytes())
    }

    /// Rewrite the field at `offset`. Out-of-range patches are ignored.
    pub fn patch(&mut self, offset: usize, field: Field, value: u64) {
        let Some(region) = self.region.as_mut() else {
            return;
        };
        if let Some(buf) = region.as_mut_slice().get_mut(offset..offset + field.width()) {
            field.write(buf, value);
        }
    }

    /// Bytes at `offset..offset+len`, clamped to the cache.
    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        match self.region.as_ref() {
            Some(region) => {
                let data = region.as_slice();
                let start = offset.min(data.len());
                let end = offset.saturating_add(len).min(data.len());
                &data[start..end]
            }
            None => &[],
        }
    }

    /// Make `offset..offset+len` visible to instruction fetch.
    pub fn flush(&self, offset: usize, len: usize) {
        if let Some(region) = self.region.as_ref() {
            let len = len.min(region.len().saturating_sub(offset));
            flush_icache(region.as_ptr().wrapping_add(offset), len);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn sizes_round_to_granule() {
        assert_eq!(TranslationCache::rounded_size(0), Some(CACHE_GRANULE));
        assert_eq!(TranslationCache::rounded_size(12), Some(CACHE_GRANULE));
        assert_eq!(TranslationCache::rounded_size(13), Some(2 * CACHE_GRANULE));
        assert_eq!(
            TranslationCache::rounded_size(2048),
            Some(2048 * 1024 + CACHE_GRANULE)
        );
    }

    #[test]
    fn largest_request_does_not_wrap() {
        // 0xffff_ffff KB plus the guard, rounded up to the granule.
        let expected = usize::try_from(0x4_0000_4000u64).ok();
        assert_eq!(TranslationCache::rounded_size(u32::MAX), expected);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn oversized_cache_is_an_error() {
        let mut cache = TranslationCache::new(Placement::Anywhere);
        let err = cache.init(u32::MAX).unwrap_err();
        assert!(matches!(err, JitError::CacheSize { size_kb: u32::MAX }));
        assert!(!cache.is_allocated());
    }

    #[test]
    fn overflowing_emit_pins_cursor() {
        let mut cache = TranslationCache::new(Placement::Anywhere);
        cache.init(0).unwrap();
        let size = cache.size();
        cache.emit(&vec![0x90; size - 2]).unwrap();
        assert!(!cache.is_full());
        assert_eq!(cache.emit(&[1, 2, 3]), None);
        assert_eq!(cache.cursor(), size);
        assert!(cache.is_full());
    }

    #[test]
    fn unallocated_cache_is_full() {
        let mut cache = TranslationCache::new(Placement::Anywhere);
        assert!(cache.is_full());
        assert_eq!(cache.emit(&[0xc3]), None);
        assert_eq!(cache.cursor(), 0);
    }
}
