//! IA-32 templates.
//!
//! T0..T2 live in ebx, esi and edi, the CPU pointer in ebp. There is no
//! callee-saved register left for A0, so it lives in a stack slot of the
//! trampoline frame at `[esp+12]`; the three slots below it carry outgoing
//! cdecl arguments. Memory is addressed linearly as `ram_base + addr`.

use super::encoder::{TemplateAsm, IMM32, IMM8, TARGET};
use crate::catalog::{
    AddrMode, Arch, BinOp, Extension, Field, FixupKind, Form, Helper, LogicOp, MicroOp, ShiftOp,
    Source, Template, TemplateSource, Trampoline, VReg, Width,
};
use crate::core::context::ContextField;
use crate::core::error::CatalogError;
use crate::core::window::WindowField;
use iced_x86::code_asm::{registers::cl, *};

const T0: AsmRegister32 = ebx;
const T1: AsmRegister32 = esi;
const T2: AsmRegister32 = edi;
const CPU: AsmRegister32 = ebp;

/// Frame size below the saved registers: three argument slots, A0, padding.
const FRAME: i32 = 28;
const A0_SLOT: i32 = 12;

fn reg(r: VReg) -> AsmRegister32 {
    match r {
        VReg::T0 => T0,
        VReg::T1 => T1,
        VReg::T2 => T2,
    }
}

fn reg16(r: VReg) -> AsmRegister16 {
    match r {
        VReg::T0 => bx,
        VReg::T1 => si,
        VReg::T2 => di,
    }
}

fn a0() -> AsmMemoryOperand {
    dword_ptr(esp + A0_SLOT)
}

fn arg(n: i32) -> AsmMemoryOperand {
    dword_ptr(esp + 4 * n)
}

/// Template source for IA-32 hosts.
pub struct I386Templates;

impl TemplateSource for I386Templates {
    fn arch(&self) -> Arch {
        Arch::X86
    }

    fn template(&self, op: MicroOp) -> Result<Template, CatalogError> {
        let mut a = TemplateAsm::new(32, op.to_string())?;
        emit(&mut a, op)?;
        Ok(a.finish()?.0)
    }

    fn trampoline(&self) -> Result<Trampoline, CatalogError> {
        let mut a = TemplateAsm::new(32, "execute")?;
        let saved = [(ContextField::T0, T0), (ContextField::T1, T1), (ContextField::T2, T2)];

        a.push(ebp)?;
        a.push(ebx)?;
        a.push(esi)?;
        a.push(edi)?;
        a.sub(esp, FRAME)?;
        // Return address at [esp+44], then entry and context.
        a.mov(CPU, dword_ptr(esp + (FRAME + 24)))?;
        for (field, r) in saved {
            a.mov(r, dword_ptr(CPU + IMM32))?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Context(field));
        }
        a.mov(eax, dword_ptr(CPU + IMM32))?;
        a.tag(Field::Le32, FixupKind::Immediate, Source::Context(ContextField::A0));
        a.mov(a0(), eax)?;
        a.mov(ecx, dword_ptr(esp + (FRAME + 20)))?;
        a.jmp(ecx)?;

        a.mark();
        for (field, r) in saved {
            a.mov(dword_ptr(CPU + IMM32), r)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Context(field));
        }
        a.mov(eax, a0())?;
        a.mov(dword_ptr(CPU + IMM32), eax)?;
        a.tag(Field::Le32, FixupKind::Immediate, Source::Context(ContextField::A0));
        a.add(esp, FRAME)?;
        a.pop(edi)?;
        a.pop(esi)?;
        a.pop(ebx)?;
        a.pop(ebp)?;
        a.ret()?;

        let (template, epilogue) = a.finish()?;
        Ok(Trampoline {
            epilogue: epilogue.unwrap_or(0),
            template,
        })
    }
}

fn imm(a: &mut TemplateAsm, param: u8) {
    a.tag(Field::Le32, FixupKind::Immediate, Source::Param(param));
}

fn ram(a: &mut TemplateAsm) {
    a.tag(Field::Le32, FixupKind::Absolute, Source::Window(WindowField::RamBase));
}

fn emit(a: &mut TemplateAsm, op: MicroOp) -> Result<(), CatalogError> {
    match op {
        MicroOp::MovImm(r) => {
            a.mov(reg(r), IMM32)?;
            imm(a, 0);
        }
        MicroOp::MovZero(r) => a.xor(reg(r), reg(r))?,
        MicroOp::Mov(d, s) => a.mov(reg(d), reg(s))?,
        MicroOp::MovA0Imm => {
            a.mov(a0(), IMM32)?;
            a.tag(Field::Le32, FixupKind::Absolute, Source::Param(0));
        }
        MicroOp::AddReg(d, s) => a.add(reg(d), reg(s))?,
        MicroOp::AddImm(r) => {
            a.add(reg(r), IMM32)?;
            imm(a, 0);
        }
        MicroOp::AddConst(r, n) => a.add(reg(r), n.value())?,
        MicroOp::SubReg(d, s) => a.sub(reg(d), reg(s))?,
        MicroOp::SubImm(r) => {
            a.sub(reg(r), IMM32)?;
            imm(a, 0);
        }
        MicroOp::SubConst(r, n) => a.sub(reg(r), n.value())?,
        MicroOp::Binary(op) => binary(a, op)?,
        MicroOp::LogicImm(op) => {
            match op {
                LogicOp::And => a.and(T0, IMM32)?,
                LogicOp::Or => a.or(T0, IMM32)?,
                LogicOp::Xor => a.xor(T0, IMM32)?,
            }
            imm(a, 0);
        }
        MicroOp::Neg => a.neg(T0)?,
        MicroOp::Not(r) => a.not(reg(r))?,
        MicroOp::Xchg => a.xchg(T0, T1)?,
        MicroOp::Bswap16 => {
            a.rol(bx, 8i32)?;
            a.movzx(T0, bx)?;
        }
        MicroOp::Bswap32 => a.bswap(T0)?,
        MicroOp::Shift(op) => {
            a.mov(ecx, T1)?;
            match op {
                ShiftOp::Lsl => a.shl(T0, cl)?,
                ShiftOp::Lsr => a.shr(T0, cl)?,
                ShiftOp::Asr => a.sar(T0, cl)?,
                ShiftOp::Rol => a.rol(T0, cl)?,
                ShiftOp::Ror => a.ror(T0, cl)?,
            }
        }
        MicroOp::ShiftImm(op) => {
            match op {
                ShiftOp::Lsl => a.shl(T0, IMM8)?,
                ShiftOp::Lsr => a.shr(T0, IMM8)?,
                ShiftOp::Asr => a.sar(T0, IMM8)?,
                ShiftOp::Rol => a.rol(T0, IMM8)?,
                ShiftOp::Ror => a.ror(T0, IMM8)?,
            }
            a.tag(Field::U8, FixupKind::Immediate, Source::Param(0));
        }
        MicroOp::Extend(ext, r) => extend(a, ext, r)?,
        MicroOp::Load {
            width,
            signed,
            addr,
        } => {
            effective_address(a, addr)?;
            let host = eax + IMM32;
            match (width, signed) {
                (Width::W32, _) => {
                    a.mov(T0, dword_ptr(host))?;
                    ram(a);
                    a.bswap(T0)?;
                }
                (Width::W16, false) => {
                    a.movzx(T0, word_ptr(host))?;
                    ram(a);
                    a.rol(bx, 8i32)?;
                }
                (Width::W16, true) => {
                    a.movzx(eax, word_ptr(host))?;
                    ram(a);
                    a.rol(ax, 8i32)?;
                    a.movsx(T0, ax)?;
                }
                (Width::W8, false) => {
                    a.movzx(T0, byte_ptr(host))?;
                    ram(a);
                }
                (Width::W8, true) => {
                    a.movsx(T0, byte_ptr(host))?;
                    ram(a);
                }
            }
        }
        MicroOp::Store { width, addr } => {
            effective_address(a, addr)?;
            let host = eax + IMM32;
            match width {
                Width::W32 => {
                    a.mov(ecx, T0)?;
                    a.bswap(ecx)?;
                    a.mov(dword_ptr(host), ecx)?;
                }
                Width::W16 => {
                    a.mov(ecx, T0)?;
                    a.rol(cx, 8i32)?;
                    a.mov(word_ptr(host), cx)?;
                }
                Width::W8 => a.mov(byte_ptr(host), bl)?,
            }
            ram(a);
        }
        MicroOp::Invoke(helper, form) => invoke(a, helper, form)?,
        MicroOp::Jump(Form::Short) | MicroOp::ChainJump => {
            a.jmp(TARGET)?;
            a.tag(Field::Le32, FixupKind::PcRelative, Source::Param(0));
        }
        MicroOp::Jump(Form::Long) => {
            a.mov(eax, IMM32)?;
            a.tag(Field::Le32, FixupKind::Absolute, Source::Param(0));
            a.jmp(eax)?;
        }
        MicroOp::JumpA0 => a.jmp(a0())?,
        MicroOp::ChainJumpIfT0 => {
            a.test(T0, T0)?;
            a.jne(TARGET)?;
            a.tag(Field::Le32, FixupKind::PcRelative, Source::Param(0));
        }
    }
    Ok(())
}

fn extend(a: &mut TemplateAsm, ext: Extension, r: VReg) -> Result<(), CatalogError> {
    match (ext, r) {
        (Extension::Se16, _) => a.movsx(reg(r), reg16(r))?,
        (Extension::Ze16, _) => a.movzx(reg(r), reg16(r))?,
        (Extension::Se8, VReg::T0) => a.movsx(T0, bl)?,
        (Extension::Ze8, VReg::T0) => a.movzx(T0, bl)?,
        // esi and edi have no byte form in 32-bit mode.
        (Extension::Se8, _) => {
            a.mov(eax, reg(r))?;
            a.movsx(reg(r), al)?;
        }
        (Extension::Ze8, _) => {
            a.mov(eax, reg(r))?;
            a.movzx(reg(r), al)?;
        }
    }
    Ok(())
}

fn binary(a: &mut TemplateAsm, op: BinOp) -> Result<(), CatalogError> {
    match op {
        BinOp::UMul | BinOp::SMul => a.imul_2(T0, T1)?,
        BinOp::UDiv | BinOp::SDiv => {
            let mut store = a.create_label();
            a.xor(eax, eax)?;
            a.test(T1, T1)?;
            a.je(store)?;
            a.mov(eax, T0)?;
            if op == BinOp::SDiv {
                let mut negate = a.create_label();
                a.cmp(T1, -1i32)?;
                a.je(negate)?;
                a.cdq()?;
                a.idiv(T1)?;
                a.jmp(store)?;
                a.set_label(&mut negate)?;
                a.neg(eax)?;
            } else {
                a.xor(edx, edx)?;
                a.div(T1)?;
            }
            a.set_label(&mut store)?;
            a.mov(T0, eax)?;
        }
        BinOp::And => a.and(T0, T1)?,
        BinOp::Or => a.or(T0, T1)?,
        BinOp::Xor => a.xor(T0, T1)?,
        BinOp::AndC | BinOp::OrC => {
            a.mov(eax, T1)?;
            a.not(eax)?;
            if op == BinOp::AndC {
                a.and(T0, eax)?;
            } else {
                a.or(T0, eax)?;
            }
        }
        BinOp::Nand | BinOp::Nor | BinOp::Eqv => {
            match op {
                BinOp::Nand => a.and(T0, T1)?,
                BinOp::Nor => a.or(T0, T1)?,
                _ => a.xor(T0, T1)?,
            }
            a.not(T0)?;
        }
    }
    Ok(())
}

fn effective_address(a: &mut TemplateAsm, addr: AddrMode) -> Result<(), CatalogError> {
    a.mov(eax, T1)?;
    match addr {
        AddrMode::Base => {}
        AddrMode::Indexed => a.add(eax, T2)?,
        AddrMode::Displaced => {
            a.add(eax, IMM32)?;
            imm(a, 0);
        }
    }
    Ok(())
}

fn invoke(a: &mut TemplateAsm, helper: Helper, form: Form) -> Result<(), CatalogError> {
    if form == Form::Long {
        a.mov(eax, IMM32)?;
        a.tag(Field::Le32, FixupKind::Absolute, Source::Param(0));
    }

    match helper {
        Helper::Void => {}
        Helper::T0 | Helper::T0RetT0 => a.mov(arg(0), T0)?,
        Helper::T0T1 => {
            a.mov(arg(0), T0)?;
            a.mov(arg(1), T1)?;
        }
        Helper::T0T1T2 => {
            a.mov(arg(0), T0)?;
            a.mov(arg(1), T1)?;
            a.mov(arg(2), T2)?;
        }
        Helper::Imm => {
            a.mov(arg(0), IMM32)?;
            imm(a, 1);
        }
        Helper::Cpu => a.mov(arg(0), CPU)?,
        Helper::CpuT0 => {
            a.mov(arg(0), CPU)?;
            a.mov(arg(1), T0)?;
        }
        Helper::CpuImm => {
            a.mov(arg(0), CPU)?;
            a.mov(arg(1), IMM32)?;
            imm(a, 1);
        }
        Helper::CpuImmImm => {
            a.mov(arg(0), CPU)?;
            a.mov(arg(1), IMM32)?;
            imm(a, 1);
            a.mov(arg(2), IMM32)?;
            imm(a, 2);
        }
        Helper::CpuA0RetA0 => {
            a.mov(arg(0), CPU)?;
            a.mov(ecx, a0())?;
            a.mov(arg(1), ecx)?;
        }
    }

    match form {
        Form::Short => {
            a.call(TARGET)?;
            a.tag(Field::Le32, FixupKind::PcRelative, Source::Param(0));
        }
        Form::Long => a.call(eax)?,
    }

    match helper {
        Helper::T0RetT0 => a.mov(T0, eax)?,
        Helper::CpuA0RetA0 => a.mov(a0(), eax)?,
        _ => {}
    }
    Ok(())
}
