// This module implements the code generator that the CPU interpreter drives. A generator
// owns one translation cache, one constant data pool and the template catalog of its
// target architecture. At construction (and after every resize) it places the execution
// trampoline at the cache base and marks it permanent; every block after that is opened
// with gen_start, filled through the gen_* emission methods and closed with gen_end,
// which reports whether the cache still has room. Emission never fails: a template that
// does not fit is dropped and the cache reads as full until it is invalidated. The
// emission methods themselves live in the ops, invoke and chain submodules, execution in
// exec.

//! Template-based code generator.
//!
//! - `emit` - template instantiation and fixup resolution
//! - [`ops`] - arithmetic, logic and memory micro-ops
//! - [`invoke`] - helper calls and jumps with short/long form selection
//! - [`chain`] - block handles and direct chaining
//! - [`exec`] - trampoline placement and execution

pub mod chain;
pub(crate) mod emit;
pub mod exec;
pub mod invoke;
pub mod ops;

pub use chain::{BlockEntry, ChainSlot, JumpSite};
pub use invoke::CpuPtr;
pub use ops::Addr;

use crate::catalog::{Arch, Catalog, MicroOp};
use crate::core::cache::{TranslationCache, CACHE_GRANULE};
use crate::core::config::{JitConfig, DEFAULT_CACHE_SIZE_KB};
use crate::core::context::{ContextField, ContextLayout};
use crate::core::data_pool::DataPool;
use crate::core::error::{JitError, JitResult};
use crate::core::memory::Placement;
use crate::core::stats::GenStats;
use crate::core::window::AddressWindow;
use std::ptr::NonNull;

/// Alignment of block entries.
pub const BLOCK_ALIGN: usize = 16;

/// Construction parameters of a [`CodeGenerator`].
#[derive(Debug, Clone, Copy)]
pub struct GeneratorOptions {
    /// Architecture to generate code for.
    pub arch: Arch,
    /// Requested translation cache size in KB.
    pub cache_size_kb: u32,
    /// Emulated address space mapping used by loads and stores.
    pub window: AddressWindow,
    /// Where the trampoline finds the virtual registers in the context.
    pub layout: ContextLayout,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            arch: Arch::host().unwrap_or(Arch::X86_64),
            cache_size_kb: DEFAULT_CACHE_SIZE_KB,
            window: AddressWindow::default(),
            layout: ContextLayout::default(),
        }
    }
}

impl GeneratorOptions {
    pub fn for_arch(arch: Arch) -> Self {
        Self {
            arch,
            ..Self::default()
        }
    }

    pub fn with_cache_size(mut self, cache_size_kb: u32) -> Self {
        self.cache_size_kb = cache_size_kb;
        self
    }

    pub fn with_window(mut self, window: AddressWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_layout(mut self, layout: ContextLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Dynamic code generator for one emulated CPU.
///
/// Not `Send`: generated code, the cache and the pool belong to the thread
/// running the interpreter.
pub struct CodeGenerator {
    arch: Arch,
    catalog: Catalog,
    cache: TranslationCache,
    data: DataPool,
    window: AddressWindow,
    layout: ContextLayout,
    /// Offset of the trampoline entry.
    execute_offset: usize,
    /// Offset of the trampoline exit sequence.
    epilogue: usize,
    block_start: usize,
    jumps: [Option<JumpSite>; 2],
    stats: GenStats,
}

impl CodeGenerator {
    /// Build the catalog, allocate the cache and place the trampoline.
    pub fn new(options: GeneratorOptions) -> JitResult<Self> {
        let arch = options.arch;
        check_layout(arch, &options.layout)?;
        let catalog = Catalog::build(arch)?;

        let mut generator = Self {
            arch,
            catalog,
            cache: TranslationCache::new(Placement::PreferLow),
            data: DataPool::new(Placement::for_pointer_immediates(arch)),
            window: options.window,
            layout: options.layout,
            execute_offset: 0,
            epilogue: 0,
            block_start: 0,
            jumps: [None; 2],
            stats: GenStats::default(),
        };
        generator
            .cache
            .init(clamp_cache_size(arch, options.cache_size_kb))?;
        generator.emit_trampoline();
        Ok(generator)
    }

    /// Drop the cache and the data pool and start over with `size_kb`.
    ///
    /// On failure the generator is left without a cache: every block reads as
    /// full until a later resize succeeds.
    pub fn set_cache_size(&mut self, size_kb: u32) -> JitResult<()> {
        self.jumps = [None; 2];
        self.block_start = 0;
        self.data.reset();
        self.stats.invalidations += 1;
        self.cache
            .set_cache_size(clamp_cache_size(self.arch, size_kb))?;
        self.emit_trampoline();
        Ok(())
    }

    /// Open a block. Clears both chain slots and returns the block entry.
    pub fn gen_start(&mut self) -> BlockEntry {
        self.jumps = [None; 2];
        let offset = self.gen_align(BLOCK_ALIGN);
        self.block_start = offset;
        BlockEntry::new(offset, self.cache.epoch())
    }

    /// Close the current block.
    ///
    /// Returns false when the cache ran out of room; the block must then be
    /// discarded and the cache invalidated before generating more code.
    pub fn gen_end(&mut self) -> bool {
        let end = self.cache.cursor();
        let len = end.saturating_sub(self.block_start);
        self.cache.flush(self.block_start, len);
        self.stats.blocks += 1;

        let room = !self.cache.is_full();
        if room {
            log::debug!("block at {:#x}: {} bytes", self.block_start, len);
        } else {
            self.stats.cache_full += 1;
            log::debug!("block at {:#x}: translation cache full", self.block_start);
        }
        room
    }

    /// Align the cursor to `align` bytes with the architecture's fill byte.
    pub fn gen_align(&mut self, align: usize) -> usize {
        self.cache.align(align, self.arch.fill_byte())
    }

    /// Forget every block generated after the trampoline. The data pool is kept.
    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
        self.jumps = [None; 2];
        self.block_start = self.cache.code_start();
        self.stats.invalidations += 1;
        log::debug!("translation cache invalidated (epoch {})", self.cache.epoch());
    }

    pub fn full_translation_cache(&self) -> bool {
        self.cache.is_full()
    }

    /// Offset of the write cursor from the cache base.
    pub fn code_offset(&self) -> usize {
        self.cache.cursor()
    }

    /// Offset below which code survives invalidation.
    pub fn code_start(&self) -> usize {
        self.cache.code_start()
    }

    /// Make everything before `offset` permanent, for hand-written stubs
    /// placed after the trampoline.
    pub fn set_code_start(&mut self, offset: usize) {
        self.cache.set_code_start(offset);
        self.block_start = self.cache.code_start();
    }

    /// Emit one micro-op with raw parameters.
    ///
    /// Returns the offset of the emitted template, or `None` when it did not fit
    /// or `op` has no template (`Mov`, `AddReg` and `SubReg` with equal registers).
    pub fn gen_op(&mut self, op: MicroOp, params: &[u64]) -> Option<usize> {
        let template = self.catalog.get(op)?;
        let operands = emit::Operands::new(&self.window, &self.layout, params);
        let at = emit::instantiate(&mut self.cache, template, &operands)?;
        self.stats.record_op(op, template.len());
        log::trace!("{op}: {} bytes at {:#x}", template.len(), at);
        Some(at)
    }

    pub fn emit_8(&mut self, value: u8) -> Option<usize> {
        self.cache.emit_8(value)
    }

    pub fn emit_16(&mut self, value: u16) -> Option<usize> {
        self.cache.emit_16(value)
    }

    pub fn emit_32(&mut self, value: u32) -> Option<usize> {
        self.cache.emit_32(value)
    }

    pub fn emit_64(&mut self, value: u64) -> Option<usize> {
        self.cache.emit_64(value)
    }

    /// Emit a host pointer in native width and byte order.
    pub fn emit_ptr(&mut self, value: usize) -> Option<usize> {
        self.cache.emit(&value.to_ne_bytes())
    }

    pub fn emit_block(&mut self, bytes: &[u8]) -> Option<usize> {
        let at = self.cache.emit(bytes)?;
        self.stats.code_bytes += bytes.len();
        Some(at)
    }

    /// Copy constant data into the pool and return its address.
    ///
    /// The address stays valid until the next [`set_cache_size`](Self::set_cache_size)
    /// and lies below 4 GiB on 64-bit hosts.
    pub fn copy_data(&mut self, data: &[u8]) -> NonNull<u8> {
        self.data.copy_data(data)
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn data_pool(&self) -> &DataPool {
        &self.data
    }

    pub fn window(&self) -> &AddressWindow {
        &self.window
    }

    pub fn layout(&self) -> &ContextLayout {
        &self.layout
    }

    pub fn stats(&self) -> &GenStats {
        &self.stats
    }

    /// Bytes emitted since `gen_start`.
    pub fn block_len(&self) -> usize {
        self.cache.cursor().saturating_sub(self.block_start)
    }

    /// Host address of a block entry.
    pub fn entry_address(&self, entry: BlockEntry) -> JitResult<usize> {
        self.check_epoch(entry.epoch())?;
        if !self.cache.is_allocated() {
            return Err(JitError::NoCache);
        }
        let size = self.cache.size();
        if entry.offset() >= size {
            return Err(JitError::EntryPastEnd {
                offset: entry.offset(),
                size,
            });
        }
        Ok(self.cache.address(entry.offset()))
    }

    fn check_epoch(&self, epoch: u64) -> JitResult<()> {
        let current = self.cache.epoch();
        if epoch == current {
            Ok(())
        } else {
            Err(JitError::StaleBlock {
                handle: epoch,
                current,
            })
        }
    }
}

/// Create a generator for the host from the JIT preferences.
///
/// Returns `None` when translation is disabled or cannot be set up; the
/// interpreter then runs alone.
pub fn initialize(config: &JitConfig) -> Option<CodeGenerator> {
    if !config.enabled {
        log::info!("JIT disabled by preferences");
        return None;
    }
    let Some(arch) = Arch::host() else {
        log::warn!("JIT disabled: no code generator for this host");
        return None;
    };

    let options = GeneratorOptions::for_arch(arch).with_cache_size(config.cache_size_kb);
    match CodeGenerator::new(options) {
        Ok(generator) => Some(generator),
        Err(err) => {
            log::warn!("JIT disabled: {err}");
            None
        }
    }
}

/// Limit `size_kb` so that every block reaches the epilogue with a short branch.
fn clamp_cache_size(arch: Arch, size_kb: u32) -> u32 {
    let Some(max) = arch.max_cache_bytes() else {
        return size_kb;
    };
    if TranslationCache::rounded_size(size_kb).is_some_and(|size| size <= max) {
        return size_kb;
    }
    let clamped = ((max - CACHE_GRANULE) / 1024) as u32;
    log::warn!("{arch}: translation cache of {size_kb} KB clamped to {clamped} KB");
    clamped
}

fn check_layout(arch: Arch, layout: &ContextLayout) -> JitResult<()> {
    if arch != Arch::PowerPc {
        return Ok(());
    }
    // lwz/stw displacements are signed 16-bit.
    for field in ContextField::ALL {
        let offset = layout.offset(field);
        if i16::try_from(offset).is_err() {
            return Err(JitError::Layout {
                register: field.name(),
                offset,
                arch,
            });
        }
    }
    Ok(())
}
