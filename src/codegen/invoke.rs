// This module emits calls to native helpers and jumps to fixed addresses. Each of these
// micro-ops comes in a short form, a relative call or branch whose reach is limited by
// the displacement field, and a long form that loads the absolute target into a scratch
// register first. The generator computes where the short form's relative field would land
// if emitted at the cursor and picks the short form exactly when the displacement fits;
// the caller never chooses. Virtual registers live in callee-saved host registers, so a
// helper cannot disturb them except through its declared return value.

//! Helper invocation and jumps.

use super::CodeGenerator;
use crate::catalog::{displacement, Form, Helper, MicroOp};
use std::ffi::c_void;

/// The CPU context pointer passed to `execute` and handed to `*_CPU_*` helpers.
pub type CpuPtr = *mut c_void;

impl CodeGenerator {
    /// Whether the short form of `op` emitted at the cursor reaches `target`.
    pub fn direct_reach(&self, op: MicroOp, target: usize) -> bool {
        let Some(fixup) = self.catalog.get(op).and_then(|t| t.relative_fixup()) else {
            return false;
        };
        let site = self.cache.address(self.cache.cursor() + fixup.offset) as u64;
        fixup
            .field
            .reaches(self.arch, displacement(fixup.field, site, target as u64))
    }

    /// Whether a helper at `target` can be called with the short form right now.
    pub fn direct_call_possible(&self, target: usize) -> bool {
        self.direct_reach(MicroOp::Invoke(Helper::Void, Form::Short), target)
    }

    /// Whether `target` can be jumped to with the short form right now.
    pub fn direct_jump_possible(&self, target: usize) -> bool {
        self.direct_reach(MicroOp::Jump(Form::Short), target)
    }

    /// Call the helper at `target` with signature `helper`.
    ///
    /// `imm` feeds the immediate arguments of the `Imm`, `CpuImm` and
    /// `CpuImmImm` signatures and is ignored otherwise.
    pub fn gen_invoke_helper(&mut self, helper: Helper, target: usize, imm: [u32; 2]) {
        let short = MicroOp::Invoke(helper, Form::Short);
        let params = [target as u64, imm[0] as u64, imm[1] as u64];
        if self.direct_reach(short, target) {
            self.stats.direct_calls += 1;
            self.gen_op(short, &params);
        } else {
            self.stats.indirect_calls += 1;
            self.gen_op(MicroOp::Invoke(helper, Form::Long), &params);
        }
    }

    pub fn gen_invoke(&mut self, func: extern "C" fn()) {
        self.gen_invoke_helper(Helper::Void, func as usize, [0; 2]);
    }

    pub fn gen_invoke_t0(&mut self, func: extern "C" fn(u32)) {
        self.gen_invoke_helper(Helper::T0, func as usize, [0; 2]);
    }

    pub fn gen_invoke_t0_t1(&mut self, func: extern "C" fn(u32, u32)) {
        self.gen_invoke_helper(Helper::T0T1, func as usize, [0; 2]);
    }

    pub fn gen_invoke_t0_t1_t2(&mut self, func: extern "C" fn(u32, u32, u32)) {
        self.gen_invoke_helper(Helper::T0T1T2, func as usize, [0; 2]);
    }

    /// `T0 = func(T0)`
    pub fn gen_invoke_t0_ret_t0(&mut self, func: extern "C" fn(u32) -> u32) {
        self.gen_invoke_helper(Helper::T0RetT0, func as usize, [0; 2]);
    }

    pub fn gen_invoke_im(&mut self, func: extern "C" fn(u32), value: u32) {
        self.gen_invoke_helper(Helper::Imm, func as usize, [value, 0]);
    }

    pub fn gen_invoke_cpu(&mut self, func: extern "C" fn(CpuPtr)) {
        self.gen_invoke_helper(Helper::Cpu, func as usize, [0; 2]);
    }

    pub fn gen_invoke_cpu_t0(&mut self, func: extern "C" fn(CpuPtr, u32)) {
        self.gen_invoke_helper(Helper::CpuT0, func as usize, [0; 2]);
    }

    pub fn gen_invoke_cpu_im(&mut self, func: extern "C" fn(CpuPtr, u32), value: u32) {
        self.gen_invoke_helper(Helper::CpuImm, func as usize, [value, 0]);
    }

    pub fn gen_invoke_cpu_im_im(
        &mut self,
        func: extern "C" fn(CpuPtr, u32, u32),
        param1: u32,
        param2: u32,
    ) {
        self.gen_invoke_helper(Helper::CpuImmImm, func as usize, [param1, param2]);
    }

    /// `A0 = func(cpu, A0)`, typically followed by [`gen_jmp_a0`](Self::gen_jmp_a0)
    /// to continue at a block the helper looked up or compiled.
    pub fn gen_invoke_cpu_a0_ret_a0(&mut self, func: extern "C" fn(CpuPtr, *mut c_void) -> *mut c_void) {
        self.gen_invoke_helper(Helper::CpuA0RetA0, func as usize, [0; 2]);
    }

    /// Jump to host address `target`.
    pub fn gen_jmp(&mut self, target: usize) {
        let short = MicroOp::Jump(Form::Short);
        if self.direct_reach(short, target) {
            self.stats.direct_jumps += 1;
            self.gen_op(short, &[target as u64]);
        } else {
            self.stats.indirect_jumps += 1;
            self.gen_op(MicroOp::Jump(Form::Long), &[target as u64]);
        }
    }

    /// Jump to the host address held in A0.
    pub fn gen_jmp_a0(&mut self) {
        self.gen_op(MicroOp::JumpA0, &[]);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::catalog::Arch;
    use crate::core::test_utils::test::small_generator;

    extern "C" fn nop() {}

    #[test]
    fn nearby_helpers_use_the_short_form() {
        let mut gen = small_generator(Arch::X86_64);
        gen.gen_start();
        let target = gen.cache().address(0);
        assert!(gen.direct_call_possible(target));
        gen.gen_invoke_helper(Helper::Void, target, [0; 2]);
        assert_eq!(gen.stats().direct_calls, 1);
        assert_eq!(gen.stats().op_count("invoke_direct"), 1);
    }

    #[test]
    fn far_targets_use_the_long_form() {
        let mut gen = small_generator(Arch::X86_64);
        gen.gen_start();
        let far = gen.cache().address(0).wrapping_add(1 << 40);
        assert!(!gen.direct_jump_possible(far));
        gen.gen_jmp(far);
        assert_eq!(gen.stats().indirect_jumps, 1);
        assert_eq!(gen.stats().op_count("jmp_slow"), 1);
    }

    #[test]
    fn ia32_always_reaches() {
        let mut gen = small_generator(Arch::X86);
        gen.gen_start();
        gen.gen_invoke(nop);
        gen.gen_jmp(usize::MAX & !0xf);
        assert_eq!(gen.stats().direct_calls, 1);
        assert_eq!(gen.stats().direct_jumps, 1);
    }

    #[test]
    fn powerpc_branch_needs_word_alignment() {
        let gen = small_generator(Arch::PowerPc);
        let base = gen.cache().address(gen.code_offset());
        assert!(gen.direct_jump_possible(base + 64));
        assert!(!gen.direct_jump_possible(base + 66));
        assert!(!gen.direct_jump_possible(base + (64 << 20)));
    }
}
