// This module provides the 32-bit PowerPC template catalog. T0..T2 live in r24..r26, A0
// in r27 and the CPU context pointer in r28, all callee-saved in the System V ABI. r29
// holds the RAM base for the whole run so loads and stores are single indexed
// instructions; emulated memory is big-endian like the host, so nothing is swapped.
// r0, r11 and the argument registers are scratch. Short calls and jumps use bl/b with a
// signed 26-bit byte displacement.

//! PowerPC templates.

use super::encoder::*;
use crate::catalog::{
    AddrMode, Arch, BinOp, Extension, Field, FixupKind, Form, Helper, LogicOp, MicroOp, ShiftOp,
    Source, Template, TemplateSource, Trampoline, VReg, Width,
};
use crate::core::context::ContextField;
use crate::core::error::CatalogError;
use crate::core::window::WindowField;

const T0: Gpr = 24;
const T1: Gpr = 25;
const T2: Gpr = 26;
const A0: Gpr = 27;
const CPU: Gpr = 28;
const MEMBASE: Gpr = 29;

/// Trampoline frame: back chain, LR save word for callees, six saved registers.
const FRAME: i16 = 64;
const SAVED: [Gpr; 6] = [T0, T1, T2, A0, CPU, MEMBASE];

fn reg(r: VReg) -> Gpr {
    match r {
        VReg::T0 => T0,
        VReg::T1 => T1,
        VReg::T2 => T2,
    }
}

/// Template source for 32-bit PowerPC hosts.
pub struct PpcTemplates;

impl TemplateSource for PpcTemplates {
    fn arch(&self) -> Arch {
        Arch::PowerPc
    }

    fn template(&self, op: MicroOp) -> Result<Template, CatalogError> {
        let mut a = WordAsm::new();
        emit(&mut a, op);
        Ok(a.finish().0)
    }

    fn trampoline(&self) -> Result<Trampoline, CatalogError> {
        let mut a = WordAsm::new();
        let context = [
            (ContextField::T0, T0),
            (ContextField::T1, T1),
            (ContextField::T2, T2),
            (ContextField::A0, A0),
        ];

        // execute(entry: r3, context: r4)
        a.emit(stwu(R1, -FRAME, R1));
        a.emit(mflr(R0));
        a.emit(stw(R0, FRAME + 4, R1));
        for (i, &r) in SAVED.iter().enumerate() {
            a.emit(stw(r, 8 + 4 * i as i16, R1));
        }
        a.emit(mr(CPU, R4));
        for (field, r) in context {
            a.emit_fixup(lwz(r, 0, CPU), Field::Lo16, FixupKind::Immediate, Source::Context(field));
        }
        a.load_imm(MEMBASE, FixupKind::Absolute, Source::Window(WindowField::RamBase));
        a.emit(mtctr(R3));
        a.emit(BCTR);

        a.mark();
        for (field, r) in context {
            a.emit_fixup(stw(r, 0, CPU), Field::Lo16, FixupKind::Immediate, Source::Context(field));
        }
        a.emit(lwz(R0, FRAME + 4, R1));
        a.emit(mtlr(R0));
        for (i, &r) in SAVED.iter().enumerate() {
            a.emit(lwz(r, 8 + 4 * i as i16, R1));
        }
        a.emit(addi(R1, R1, FRAME));
        a.emit(BLR);

        let (template, epilogue) = a.finish();
        Ok(Trampoline {
            epilogue: epilogue.unwrap_or(0),
            template,
        })
    }
}

fn imm(a: &mut WordAsm, rd: Gpr, param: u8) {
    a.load_imm(rd, FixupKind::Immediate, Source::Param(param));
}

fn emit(a: &mut WordAsm, op: MicroOp) {
    match op {
        MicroOp::MovImm(r) => imm(a, reg(r), 0),
        MicroOp::MovZero(r) => a.emit(li(reg(r), 0)),
        MicroOp::Mov(d, s) => a.emit(mr(reg(d), reg(s))),
        MicroOp::MovA0Imm => a.load_imm(A0, FixupKind::Absolute, Source::Param(0)),
        MicroOp::AddReg(d, s) => a.emit(add(reg(d), reg(d), reg(s))),
        MicroOp::AddImm(r) => {
            imm(a, R0, 0);
            a.emit(add(reg(r), reg(r), R0));
        }
        MicroOp::AddConst(r, n) => a.emit(addi(reg(r), reg(r), n.value() as i16)),
        MicroOp::SubReg(d, s) => a.emit(subf(reg(d), reg(s), reg(d))),
        MicroOp::SubImm(r) => {
            imm(a, R0, 0);
            a.emit(subf(reg(r), R0, reg(r)));
        }
        MicroOp::SubConst(r, n) => a.emit(addi(reg(r), reg(r), -(n.value() as i16))),
        MicroOp::Binary(op) => binary(a, op),
        MicroOp::LogicImm(op) => {
            imm(a, R0, 0);
            a.emit(match op {
                LogicOp::And => and(T0, T0, R0),
                LogicOp::Or => or(T0, T0, R0),
                LogicOp::Xor => xor(T0, T0, R0),
            });
        }
        MicroOp::Neg => a.emit(neg(T0, T0)),
        MicroOp::Not(r) => a.emit(nor(reg(r), reg(r), reg(r))),
        MicroOp::Xchg => {
            a.emit(mr(R0, T0));
            a.emit(mr(T0, T1));
            a.emit(mr(T1, R0));
        }
        MicroOp::Bswap16 => {
            a.emit(rlwinm(R0, T0, 24, 24, 31));
            a.emit(rlwimi(R0, T0, 8, 16, 23));
            a.emit(mr(T0, R0));
        }
        MicroOp::Bswap32 => {
            a.emit(rlwinm(R0, T0, 8, 0, 31));
            a.emit(rlwimi(R0, T0, 24, 0, 7));
            a.emit(rlwimi(R0, T0, 24, 16, 23));
            a.emit(mr(T0, R0));
        }
        MicroOp::Shift(op) => {
            // Counts are taken modulo 32.
            a.emit(rlwinm(R0, T1, 0, 27, 31));
            shift(a, op);
        }
        MicroOp::ShiftImm(op) => {
            a.emit_fixup(li(R0, 0), Field::Lo16, FixupKind::Immediate, Source::Param(0));
            shift(a, op);
        }
        MicroOp::Extend(ext, r) => a.emit(match ext {
            Extension::Se16 => extsh(reg(r), reg(r)),
            Extension::Ze16 => rlwinm(reg(r), reg(r), 0, 16, 31),
            Extension::Se8 => extsb(reg(r), reg(r)),
            Extension::Ze8 => rlwinm(reg(r), reg(r), 0, 24, 31),
        }),
        MicroOp::Load {
            width,
            signed,
            addr,
        } => {
            let index = effective_address(a, addr);
            match (width, signed) {
                (Width::W32, _) => a.emit(lwzx(T0, MEMBASE, index)),
                (Width::W16, false) => a.emit(lhzx(T0, MEMBASE, index)),
                (Width::W16, true) => a.emit(lhax(T0, MEMBASE, index)),
                (Width::W8, false) => a.emit(lbzx(T0, MEMBASE, index)),
                (Width::W8, true) => {
                    a.emit(lbzx(T0, MEMBASE, index));
                    a.emit(extsb(T0, T0));
                }
            }
        }
        MicroOp::Store { width, addr } => {
            let index = effective_address(a, addr);
            a.emit(match width {
                Width::W32 => stwx(T0, MEMBASE, index),
                Width::W16 => sthx(T0, MEMBASE, index),
                Width::W8 => stbx(T0, MEMBASE, index),
            });
        }
        MicroOp::Invoke(helper, form) => invoke(a, helper, form),
        MicroOp::Jump(Form::Short) | MicroOp::ChainJump => {
            a.emit_fixup(B, Field::Li24, FixupKind::PcRelative, Source::Param(0));
        }
        MicroOp::Jump(Form::Long) => {
            a.load_imm(R0, FixupKind::Absolute, Source::Param(0));
            a.emit(mtctr(R0));
            a.emit(BCTR);
        }
        MicroOp::JumpA0 => {
            a.emit(mtctr(A0));
            a.emit(BCTR);
        }
        MicroOp::ChainJumpIfT0 => {
            a.emit(cmpwi(T0, 0));
            a.emit(beq(8));
            a.emit_fixup(B, Field::Li24, FixupKind::PcRelative, Source::Param(0));
        }
    }
}

/// `T0 = T0 <op> r0`
fn shift(a: &mut WordAsm, op: ShiftOp) {
    match op {
        ShiftOp::Lsl => a.emit(slw(T0, T0, R0)),
        ShiftOp::Lsr => a.emit(srw(T0, T0, R0)),
        ShiftOp::Asr => a.emit(sraw(T0, T0, R0)),
        ShiftOp::Rol => a.emit(rlwnm(T0, T0, R0, 0, 31)),
        ShiftOp::Ror => {
            a.emit(subfic(R0, R0, 32));
            a.emit(rlwnm(T0, T0, R0, 0, 31));
        }
    }
}

fn binary(a: &mut WordAsm, op: BinOp) {
    let word = match op {
        BinOp::UMul | BinOp::SMul => mullw(T0, T0, T1),
        BinOp::UDiv | BinOp::SDiv => {
            // A zero divisor yields 0.
            a.emit(li(R0, 0));
            a.emit(cmpwi(T1, 0));
            a.emit(beq(8));
            a.emit(if op == BinOp::SDiv {
                divw(R0, T0, T1)
            } else {
                divwu(R0, T0, T1)
            });
            mr(T0, R0)
        }
        BinOp::And => and(T0, T0, T1),
        BinOp::Or => or(T0, T0, T1),
        BinOp::Xor => xor(T0, T0, T1),
        BinOp::AndC => andc(T0, T0, T1),
        BinOp::OrC => orc(T0, T0, T1),
        BinOp::Nand => nand(T0, T0, T1),
        BinOp::Nor => nor(T0, T0, T1),
        BinOp::Eqv => eqv(T0, T0, T1),
    };
    a.emit(word);
}

/// Emit the index computation; returns the register holding the emulated address.
fn effective_address(a: &mut WordAsm, addr: AddrMode) -> Gpr {
    match addr {
        AddrMode::Base => T1,
        AddrMode::Indexed => {
            a.emit(add(R11, T1, T2));
            R11
        }
        AddrMode::Displaced => {
            imm(a, R11, 0);
            a.emit(add(R11, T1, R11));
            R11
        }
    }
}

fn invoke(a: &mut WordAsm, helper: Helper, form: Form) {
    if form == Form::Long {
        a.load_imm(R0, FixupKind::Absolute, Source::Param(0));
        a.emit(mtctr(R0));
    }

    match helper {
        Helper::Void => {}
        Helper::T0 | Helper::T0RetT0 => a.emit(mr(R3, T0)),
        Helper::T0T1 => {
            a.emit(mr(R3, T0));
            a.emit(mr(R4, T1));
        }
        Helper::T0T1T2 => {
            a.emit(mr(R3, T0));
            a.emit(mr(R4, T1));
            a.emit(mr(R5, T2));
        }
        Helper::Imm => imm(a, R3, 1),
        Helper::Cpu => a.emit(mr(R3, CPU)),
        Helper::CpuT0 => {
            a.emit(mr(R3, CPU));
            a.emit(mr(R4, T0));
        }
        Helper::CpuImm => {
            a.emit(mr(R3, CPU));
            imm(a, R4, 1);
        }
        Helper::CpuImmImm => {
            a.emit(mr(R3, CPU));
            imm(a, R4, 1);
            imm(a, R5, 2);
        }
        Helper::CpuA0RetA0 => {
            a.emit(mr(R3, CPU));
            a.emit(mr(R4, A0));
        }
    }

    match form {
        Form::Short => a.emit_fixup(BL, Field::Li24, FixupKind::PcRelative, Source::Param(0)),
        Form::Long => a.emit(BCTRL),
    }

    match helper {
        Helper::T0RetT0 => a.emit(mr(T0, R3)),
        Helper::CpuA0RetA0 => a.emit(mr(A0, R3)),
        _ => {}
    }
}
