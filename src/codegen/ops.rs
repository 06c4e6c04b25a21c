//! Register, arithmetic and memory micro-ops.
//!
//! Every method appends one template (or none, when the operation folds
//! away) at the cursor. None of them report failure; a template that does not
//! fit shows up as a full cache at [`gen_end`](CodeGenerator::gen_end).

use super::CodeGenerator;
use crate::catalog::{AddrMode, BinOp, Extension, LogicOp, MicroOp, ShiftOp, Step, VReg, Width};

/// Emulated address of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addr {
    /// `[T1]`
    Base,
    /// `[T1 + T2]`
    Indexed,
    /// `[T1 + offset]`
    Displaced(i32),
}

impl Addr {
    fn lower(self) -> (AddrMode, u64) {
        match self {
            Addr::Base | Addr::Displaced(0) => (AddrMode::Base, 0),
            Addr::Indexed => (AddrMode::Indexed, 0),
            Addr::Displaced(offset) => (AddrMode::Displaced, offset as u32 as u64),
        }
    }
}

impl CodeGenerator {
    /// `r = value`
    pub fn gen_mov_32_im(&mut self, r: VReg, value: u32) {
        if value == 0 {
            self.gen_op(MicroOp::MovZero(r), &[]);
        } else {
            self.gen_op(MicroOp::MovImm(r), &[value as u64]);
        }
    }

    /// `dst = src`
    pub fn gen_mov_32(&mut self, dst: VReg, src: VReg) {
        if dst != src {
            self.gen_op(MicroOp::Mov(dst, src), &[]);
        }
    }

    /// `A0 = addr`
    pub fn gen_mov_ad_a0_im(&mut self, addr: usize) {
        self.gen_op(MicroOp::MovA0Imm, &[addr as u64]);
    }

    /// `dst += src`; the registers must differ.
    pub fn gen_add_32(&mut self, dst: VReg, src: VReg) {
        debug_assert_ne!(dst, src);
        self.gen_op(MicroOp::AddReg(dst, src), &[]);
    }

    /// `dst -= src`; the registers must differ.
    pub fn gen_sub_32(&mut self, dst: VReg, src: VReg) {
        debug_assert_ne!(dst, src);
        self.gen_op(MicroOp::SubReg(dst, src), &[]);
    }

    /// `r += value`, folded for 0, 1, 2, 4 and 8.
    pub fn gen_add_32_im(&mut self, r: VReg, value: u32) {
        if value == 0 {
            return;
        }
        match Step::from_value(value as i32) {
            Some(step) => self.gen_op(MicroOp::AddConst(r, step), &[]),
            None => self.gen_op(MicroOp::AddImm(r), &[value as u64]),
        };
    }

    /// `r -= value`, folded for 0, 1, 2, 4 and 8.
    pub fn gen_sub_32_im(&mut self, r: VReg, value: u32) {
        if value == 0 {
            return;
        }
        match Step::from_value(value as i32) {
            Some(step) => self.gen_op(MicroOp::SubConst(r, step), &[]),
            None => self.gen_op(MicroOp::SubImm(r), &[value as u64]),
        };
    }

    /// `T0 = T0 <op> T1`
    pub fn gen_binop(&mut self, op: BinOp) {
        self.gen_op(MicroOp::Binary(op), &[]);
    }

    pub fn gen_umul_32(&mut self) {
        self.gen_binop(BinOp::UMul);
    }

    pub fn gen_smul_32(&mut self) {
        self.gen_binop(BinOp::SMul);
    }

    /// `T0 = T0 / T1`, unsigned; a zero divisor yields 0.
    pub fn gen_udiv_32(&mut self) {
        self.gen_binop(BinOp::UDiv);
    }

    /// `T0 = T0 / T1`, signed; a zero divisor yields 0.
    pub fn gen_sdiv_32(&mut self) {
        self.gen_binop(BinOp::SDiv);
    }

    /// `T0 = T0 <op> value`
    pub fn gen_logic_32_im(&mut self, op: LogicOp, value: u32) {
        self.gen_op(MicroOp::LogicImm(op), &[value as u64]);
    }

    pub fn gen_neg_32(&mut self) {
        self.gen_op(MicroOp::Neg, &[]);
    }

    /// Bitwise complement of `r`.
    pub fn gen_not_32(&mut self, r: VReg) {
        self.gen_op(MicroOp::Not(r), &[]);
    }

    pub fn gen_xchg_32(&mut self) {
        self.gen_op(MicroOp::Xchg, &[]);
    }

    /// Swap the two low bytes of T0 and clear the upper half.
    pub fn gen_bswap_16(&mut self) {
        self.gen_op(MicroOp::Bswap16, &[]);
    }

    pub fn gen_bswap_32(&mut self) {
        self.gen_op(MicroOp::Bswap32, &[]);
    }

    /// `T0 = T0 <op> (T1 & 31)`
    pub fn gen_shift_32(&mut self, op: ShiftOp) {
        self.gen_op(MicroOp::Shift(op), &[]);
    }

    /// `T0 = T0 <op> (count & 31)`
    pub fn gen_shift_32_im(&mut self, op: ShiftOp, count: u32) {
        self.gen_op(MicroOp::ShiftImm(op), &[(count & 31) as u64]);
    }

    /// Sign or zero extend the low bits of `r` to 32 bits.
    pub fn gen_extend(&mut self, ext: Extension, r: VReg) {
        self.gen_op(MicroOp::Extend(ext, r), &[]);
    }

    /// Load a big-endian value of `width` into T0.
    pub fn gen_load(&mut self, width: Width, signed: bool, addr: Addr) {
        let (addr, offset) = addr.lower();
        self.gen_op(
            MicroOp::Load {
                width,
                signed,
                addr,
            },
            &[offset],
        );
    }

    /// Store the low `width` bits of T0, big-endian.
    pub fn gen_store(&mut self, width: Width, addr: Addr) {
        let (addr, offset) = addr.lower();
        self.gen_op(MicroOp::Store { width, addr }, &[offset]);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::catalog::Arch;
    use crate::core::test_utils::test::{small_generator, with_block};

    fn emitted(arch: Arch, f: impl FnOnce(&mut CodeGenerator)) -> Vec<String> {
        let mut gen = small_generator(arch);
        gen.gen_start();
        f(&mut gen);
        let mut names: Vec<_> = gen.stats().op_counts.keys().map(|op| op.to_string()).collect();
        names.sort();
        names
    }

    #[test]
    fn zero_immediate_uses_zeroing_form() {
        let names = emitted(Arch::X86_64, |gen| gen.gen_mov_32_im(VReg::T1, 0));
        assert_eq!(names, ["mov_32_T1_0"]);
    }

    #[test]
    fn small_adjustments_fold() {
        for arch in Arch::ALL {
            let mut gen = small_generator(arch);
            gen.gen_start();
            let before = gen.code_offset();
            gen.gen_add_32_im(VReg::T0, 0);
            gen.gen_sub_32_im(VReg::T1, 0);
            assert_eq!(gen.code_offset(), before);

            gen.gen_add_32_im(VReg::T0, 4);
            gen.gen_sub_32_im(VReg::T1, 8);
            gen.gen_add_32_im(VReg::T2, 3);
            let stats = gen.stats();
            assert_eq!(stats.op_count("add_32_T0_4"), 1);
            assert_eq!(stats.op_count("sub_32_T1_8"), 1);
            assert_eq!(stats.op_count("add_32_T2_im"), 1);
        }
    }

    #[test]
    fn zero_displacement_uses_base_form() {
        let names = emitted(Arch::X86_64, |gen| {
            gen.gen_load(Width::W16, true, Addr::Displaced(0));
            gen.gen_store(Width::W8, Addr::Displaced(-4));
        });
        assert_eq!(names, ["load_s16_T0_T1_0", "store_8_T0_T1_im"]);
    }

    #[test]
    fn cursor_advances_by_template_lengths() {
        let mut gen = small_generator(Arch::X86);
        gen.gen_start();
        let before = gen.code_offset();
        gen.gen_mov_32_im(VReg::T0, 0x1234);
        gen.gen_binop(BinOp::Xor);
        gen.gen_shift_32_im(ShiftOp::Ror, 3);

        let catalog = gen.catalog();
        let expected = catalog.template(MicroOp::MovImm(VReg::T0)).len()
            + catalog.template(MicroOp::Binary(BinOp::Xor)).len()
            + catalog.template(MicroOp::ShiftImm(ShiftOp::Ror)).len();
        assert_eq!(gen.code_offset() - before, expected);
        assert!(gen.gen_end());
    }

    #[test]
    fn self_moves_emit_nothing() {
        for arch in Arch::ALL {
            let len = with_block(arch, |gen| {
                gen.gen_mov_32(VReg::T2, VReg::T2);
                gen.gen_shift_32_im(ShiftOp::Lsl, 32);
            });
            let shift = small_generator(arch)
                .catalog()
                .template(MicroOp::ShiftImm(ShiftOp::Lsl))
                .len();
            assert_eq!(len, shift, "{arch}");
        }
    }
}
