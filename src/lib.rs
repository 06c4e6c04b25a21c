//! dyngen - template-based dynamic code generation.
//!
//! dyngen translates a stream of abstract micro-ops into host machine code by
//! copying precomputed instruction templates into an executable translation
//! cache and patching their operands in place. It backs the JIT of a CPU
//! emulator: the interpreter opens a block, emits micro-ops for the guest
//! instructions it decodes, closes the block and later runs it through a
//! shared trampoline.
//!
//! # Primary Usage
//!
//! ```ignore
//! use dyngen::{CodeGenerator, GeneratorOptions, VReg, VirtualRegisters};
//!
//! extern "C" fn report(value: u32) {
//!     println!("T0 = {value}");
//! }
//!
//! let mut gen = CodeGenerator::new(GeneratorOptions::default().with_cache_size(16))?;
//! let entry = gen.gen_start();
//! gen.gen_mov_32_im(VReg::T0, 42);
//! gen.gen_invoke_t0(report);
//! gen.gen_exec_return();
//! assert!(gen.gen_end());
//!
//! let mut regs = VirtualRegisters::default();
//! unsafe { gen.execute(entry, &mut regs as *mut _ as *mut _)? };
//! ```
//!
//! # Architecture
//!
//! - [`core`] - cache, data pool, memory, window, context, config, errors
//! - [`catalog`] - micro-ops, templates and fixups
//! - [`x86`] - IA-32 and x86-64 template sources
//! - [`ppc`] - PowerPC template source
//! - [`codegen`] - the generator, chaining and execution
//! - [`dump`] - catalog listing, disassembly and ELF export

pub mod catalog;
pub mod codegen;
pub mod core;
pub mod dump;
pub mod ppc;
pub mod x86;

pub use catalog::{
    AddrMode, Arch, BinOp, Catalog, Extension, Form, Helper, LogicOp, MicroOp, ShiftOp, Template,
    VReg, Width,
};
pub use codegen::{
    initialize, Addr, BlockEntry, ChainSlot, CodeGenerator, CpuPtr, GeneratorOptions, JumpSite,
};
pub use crate::core::{
    AddressWindow, ContextLayout, GenStats, JitConfig, JitError, JitResult, VirtualRegisters,
};
