// This module owns every interaction with the host's virtual memory system: reserving
// anonymous page regions (optionally inside the low 4 GiB so generated code can embed
// their addresses as 32-bit immediates), switching them to read-write-execute, releasing
// them, and flushing the instruction cache after code has been written. The translation
// cache and the data pool are the only users; nothing else in the crate calls mmap,
// mprotect or the icache primitives.

//! Page regions and icache maintenance.

use super::error::{JitError, JitResult};
use crate::catalog::Arch;
use std::io;
use std::ptr::NonNull;

/// Highest address (exclusive) of the low window.
pub const LOW_WINDOW_END: u64 = 1 << 32;

/// Address hint used where the OS has no dedicated low-placement flag.
#[cfg(all(
    unix,
    target_pointer_width = "64",
    not(all(target_os = "linux", target_arch = "x86_64"))
))]
const LOW_HINT: usize = 0x1000_0000;

/// Where a region may live in the host address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Anywhere the OS likes.
    Anywhere,
    /// Try the low 4 GiB first, fall back to anywhere.
    PreferLow,
    /// Must end below 4 GiB.
    RequireLow,
}

impl Placement {
    /// Placement for memory whose addresses code generated for `arch` embeds
    /// as pointer-sized immediates. Only targets with immediates narrower than
    /// a host pointer need the low window.
    pub fn for_pointer_immediates(arch: Arch) -> Self {
        if arch.pointer_width() >= std::mem::size_of::<usize>() {
            Placement::PreferLow
        } else {
            Placement::RequireLow
        }
    }
}

/// Access rights of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadWrite,
    ReadWriteExecute,
}

/// An anonymous, page-aligned mapping released on drop.
#[derive(Debug)]
pub struct PageRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl PageRegion {
    /// Map `len` bytes read-write.
    pub fn reserve(len: usize, placement: Placement) -> JitResult<Self> {
        let mapped = match placement {
            Placement::Anywhere => map_anonymous(len, false),
            Placement::PreferLow => map_low(len).or_else(|_| map_anonymous(len, false)),
            Placement::RequireLow => map_low(len),
        };
        let ptr = mapped.map_err(|source| JitError::Reserve { size: len, source })?;
        Ok(Self { ptr, len })
    }

    /// Change the access rights of the whole region.
    pub fn protect(&self, protection: Protection) -> JitResult<()> {
        protect(self.ptr, self.len, protection).map_err(|source| JitError::Protect {
            size: self.len,
            source,
        })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the whole region lies below 4 GiB.
    pub fn is_low(&self) -> bool {
        (self.addr() as u64).saturating_add(self.len as u64) <= LOW_WINDOW_END
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping is live and readable for `len` bytes while `self` exists.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for PageRegion {
    fn drop(&mut self) {
        unmap(self.ptr, self.len);
    }
}

/// Make freshly written code at `start..start+len` visible to instruction fetch.
pub fn flush_icache(start: *const u8, len: usize) {
    if len == 0 {
        return;
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        // x86 keeps instruction and data caches coherent.
        let _ = start;
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        extern "C" {
            fn __clear_cache(start: *mut libc::c_char, end: *mut libc::c_char);
        }
        // SAFETY: the range lies inside a live mapping owned by the caller.
        unsafe {
            let begin = start as *mut libc::c_char;
            __clear_cache(begin, begin.add(len));
        }
    }
}

#[cfg(unix)]
fn map_anonymous(len: usize, low: bool) -> io::Result<NonNull<u8>> {
    #[allow(unused_mut)]
    let mut flags = libc::MAP_PRIVATE | libc::MAP_ANON;
    #[allow(unused_mut)]
    let mut hint: *mut libc::c_void = std::ptr::null_mut();

    if low {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            flags |= libc::MAP_32BIT;
        }
        #[cfg(all(target_pointer_width = "64", not(all(target_os = "linux", target_arch = "x86_64"))))]
        {
            hint = LOW_HINT as *mut libc::c_void;
        }
    }

    // SAFETY: anonymous private mapping, no file descriptor involved.
    let ptr = unsafe {
        libc::mmap(
            hint,
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr as *mut u8).ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))
}

#[cfg(unix)]
fn map_low(len: usize) -> io::Result<NonNull<u8>> {
    let ptr = map_anonymous(len, true)?;
    if (ptr.as_ptr() as u64).saturating_add(len as u64) > LOW_WINDOW_END {
        unmap(ptr, len);
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no free range below 4 GiB",
        ));
    }
    Ok(ptr)
}

#[cfg(unix)]
fn protect(ptr: NonNull<u8>, len: usize, protection: Protection) -> io::Result<()> {
    let prot = match protection {
        Protection::ReadWrite => libc::PROT_READ | libc::PROT_WRITE,
        Protection::ReadWriteExecute => libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
    };
    // SAFETY: `ptr..ptr+len` is a mapping created by `map_anonymous`.
    let rc = unsafe { libc::mprotect(ptr.as_ptr() as *mut libc::c_void, len, prot) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn unmap(ptr: NonNull<u8>, len: usize) {
    // SAFETY: releases a mapping created by `map_anonymous`; nothing refers to it afterwards.
    let rc = unsafe { libc::munmap(ptr.as_ptr() as *mut libc::c_void, len) };
    if rc != 0 {
        log::warn!("munmap of {len} bytes at {:p} failed", ptr.as_ptr());
    }
}

#[cfg(not(unix))]
fn map_anonymous(_len: usize, _low: bool) -> io::Result<NonNull<u8>> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(not(unix))]
fn map_low(len: usize) -> io::Result<NonNull<u8>> {
    map_anonymous(len, true)
}

#[cfg(not(unix))]
fn protect(_ptr: NonNull<u8>, _len: usize, _protection: Protection) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

#[cfg(not(unix))]
fn unmap(_ptr: NonNull<u8>, _len: usize) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn region_is_writable_and_zeroed() {
        let mut region = PageRegion::reserve(4096, Placement::Anywhere).unwrap();
        assert_eq!(region.len(), 4096);
        assert!(region.as_slice().iter().all(|&b| b == 0));
        region.as_mut_slice()[10] = 0xAB;
        assert_eq!(region.as_slice()[10], 0xAB);
    }

    #[test]
    fn rwx_protection() {
        let region = PageRegion::reserve(16384, Placement::PreferLow).unwrap();
        region.protect(Protection::ReadWriteExecute).unwrap();
        region.protect(Protection::ReadWrite).unwrap();
    }

    #[test]
    fn narrow_immediates_need_the_low_window() {
        let expected = if cfg!(target_pointer_width = "64") {
            Placement::RequireLow
        } else {
            Placement::PreferLow
        };
        assert_eq!(Placement::for_pointer_immediates(Arch::PowerPc), expected);
        assert_eq!(Placement::for_pointer_immediates(Arch::X86), expected);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn imm64_targets_do_not_require_low_memory() {
        assert_eq!(
            Placement::for_pointer_immediates(Arch::X86_64),
            Placement::PreferLow
        );
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[test]
    fn low_placement_ends_below_4g() {
        let region = PageRegion::reserve(65536, Placement::RequireLow).unwrap();
        assert!(region.is_low());
    }
}
