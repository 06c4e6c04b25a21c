//! Trampoline placement and execution.

use super::{emit, BlockEntry, CodeGenerator, CpuPtr, BLOCK_ALIGN};
use crate::catalog::Arch;
use crate::core::error::{JitError, JitResult};

/// Signature of the trampoline entry: `execute(entry, context)`.
type ExecuteFn = unsafe extern "C" fn(*const u8, CpuPtr);

impl CodeGenerator {
    /// Place the trampoline at the cursor and make it permanent.
    pub(crate) fn emit_trampoline(&mut self) {
        let trampoline = self.catalog.trampoline();
        let operands = emit::Operands::new(&self.window, &self.layout, &[]);
        let Some(at) = emit::instantiate(&mut self.cache, &trampoline.template, &operands) else {
            log::warn!("no room for the {} trampoline", self.arch);
            return;
        };

        self.execute_offset = at;
        self.epilogue = at + trampoline.epilogue;
        let len = trampoline.template.len();
        self.stats.code_bytes += len;

        let end = self.cache.align(BLOCK_ALIGN, self.arch.fill_byte());
        self.cache.set_code_start(end);
        self.block_start = end;
        self.cache.flush(at, end - at);
        log::debug!(
            "{} trampoline: {} bytes, epilogue at +{}",
            self.arch,
            len,
            trampoline.epilogue
        );
    }

    /// Host address of the trampoline entry.
    pub fn execute_address(&self) -> usize {
        self.cache.address(self.execute_offset)
    }

    /// Host address of the trampoline exit sequence.
    pub fn epilogue_address(&self) -> usize {
        self.cache.address(self.epilogue)
    }

    /// End the block by returning to the caller of [`execute`](Self::execute).
    pub fn gen_exec_return(&mut self) {
        self.gen_jmp(self.epilogue_address());
    }

    /// Run generated code starting at `entry` until it returns through the epilogue.
    ///
    /// The virtual registers are loaded from `context` on entry and written
    /// back on exit, at the offsets of the generator's layout.
    ///
    /// # Safety
    ///
    /// `context` must point to memory laid out as the generator's
    /// [`ContextLayout`](crate::core::context::ContextLayout) describes, every
    /// helper the code calls must have the signature it was emitted with, and
    /// every emulated address the code touches must resolve to mapped host
    /// memory through the address window.
    pub unsafe fn execute(&self, entry: BlockEntry, context: CpuPtr) -> JitResult<()> {
        if Arch::host() != Some(self.arch) {
            return Err(JitError::ForeignArch { target: self.arch });
        }
        let target = self.entry_address(entry)?;

        // SAFETY: the trampoline was assembled for the host and sits at the
        // start of the live cache.
        let trampoline: ExecuteFn = std::mem::transmute::<usize, ExecuteFn>(self.execute_address());
        trampoline(target as *const u8, context);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::catalog::VReg;
    use crate::core::test_utils::test::small_generator;

    #[test]
    fn epilogue_lies_inside_the_trampoline() {
        for arch in Arch::ALL {
            let gen = small_generator(arch);
            let trampoline = gen.catalog().trampoline();
            assert!(trampoline.epilogue > 0);
            assert!(trampoline.epilogue < trampoline.template.len());
            assert_eq!(gen.epilogue_address() - gen.execute_address(), trampoline.epilogue);
            assert!(gen.code_start() >= trampoline.template.len());
        }
    }

    #[test]
    fn foreign_code_does_not_run() {
        let foreign = if Arch::host() == Some(Arch::PowerPc) {
            Arch::X86
        } else {
            Arch::PowerPc
        };
        let mut gen = small_generator(foreign);
        let entry = gen.gen_start();
        gen.gen_mov_32_im(VReg::T0, 1);
        gen.gen_exec_return();
        assert!(gen.gen_end());

        let result = unsafe { gen.execute(entry, std::ptr::null_mut()) };
        assert!(matches!(result, Err(JitError::ForeignArch { .. })));
    }

    #[test]
    fn resize_places_a_fresh_trampoline() {
        let mut gen = small_generator(Arch::X86_64);
        let entry = gen.gen_start();
        gen.gen_exec_return();
        assert!(gen.gen_end());
        gen.copy_data(&[1, 2, 3]);

        gen.set_cache_size(0).unwrap();
        gen.set_cache_size(32).unwrap();
        assert_eq!(gen.code_offset(), gen.code_start());
        assert!(gen.data_pool().is_empty());
        assert!(gen.entry_address(entry).is_err());
        assert_eq!(
            gen.cache().bytes(gen.execute_offset, 1),
            gen.catalog().trampoline().template.bytes()[..1].to_vec()
        );
    }
}
