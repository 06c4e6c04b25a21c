// This module provides the x86-64 template catalog. Virtual registers live in callee-saved
// host registers for the whole time generated code runs: T0..T2 in r12d..r14d, A0 in rbx
// and the CPU context pointer in rbp, so helpers called through the System V ABI never
// clobber them. rax, rcx, rdx, rsi and rdi are scratch. Every memory access runs the
// emulated 32-bit address through the address window before touching host memory, and
// emulated memory is big-endian, so loads and stores byte-swap.

//! x86-64 templates.

use super::encoder::{TemplateAsm, IMM32, IMM64, IMM8, TARGET};
use crate::catalog::{
    AddrMode, Arch, BinOp, Extension, Field, FixupKind, Form, Helper, LogicOp, MicroOp, ShiftOp,
    Source, Template, TemplateSource, Trampoline, VReg, Width,
};
use crate::core::context::ContextField;
use crate::core::error::CatalogError;
use crate::core::window::WindowField;
use iced_x86::code_asm::{registers::cl, *};

const T0: AsmRegister32 = r12d;
const T1: AsmRegister32 = r13d;
const T2: AsmRegister32 = r14d;
const A0: AsmRegister64 = rbx;
const CPU: AsmRegister64 = rbp;

fn reg(r: VReg) -> AsmRegister32 {
    match r {
        VReg::T0 => T0,
        VReg::T1 => T1,
        VReg::T2 => T2,
    }
}

fn reg16(r: VReg) -> AsmRegister16 {
    match r {
        VReg::T0 => r12w,
        VReg::T1 => r13w,
        VReg::T2 => r14w,
    }
}

fn reg8(r: VReg) -> AsmRegister8 {
    match r {
        VReg::T0 => r12b,
        VReg::T1 => r13b,
        VReg::T2 => r14b,
    }
}

/// Template source for x86-64 System V hosts.
pub struct Amd64Templates;

impl TemplateSource for Amd64Templates {
    fn arch(&self) -> Arch {
        Arch::X86_64
    }

    fn template(&self, op: MicroOp) -> Result<Template, CatalogError> {
        let mut a = TemplateAsm::new(64, op.to_string())?;
        emit(&mut a, op)?;
        Ok(a.finish()?.0)
    }

    fn trampoline(&self) -> Result<Trampoline, CatalogError> {
        let mut a = TemplateAsm::new(64, "execute")?;

        // execute(entry: rdi, context: rsi); five pushes keep rsp 16-byte aligned.
        a.push(rbp)?;
        a.push(rbx)?;
        a.push(r12)?;
        a.push(r13)?;
        a.push(r14)?;
        a.mov(CPU, rsi)?;
        for (field, r) in [(ContextField::T0, T0), (ContextField::T1, T1), (ContextField::T2, T2)] {
            a.mov(r, dword_ptr(CPU + IMM32))?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Context(field));
        }
        a.mov(A0, qword_ptr(CPU + IMM32))?;
        a.tag(Field::Le32, FixupKind::Immediate, Source::Context(ContextField::A0));
        a.jmp(rdi)?;

        a.mark();
        for (field, r) in [(ContextField::T0, T0), (ContextField::T1, T1), (ContextField::T2, T2)] {
            a.mov(dword_ptr(CPU + IMM32), r)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Context(field));
        }
        a.mov(qword_ptr(CPU + IMM32), A0)?;
        a.tag(Field::Le32, FixupKind::Immediate, Source::Context(ContextField::A0));
        a.pop(r14)?;
        a.pop(r13)?;
        a.pop(r12)?;
        a.pop(rbx)?;
        a.pop(rbp)?;
        a.ret()?;

        let (template, epilogue) = a.finish()?;
        Ok(Trampoline {
            epilogue: epilogue.unwrap_or(0),
            template,
        })
    }
}

fn emit(a: &mut TemplateAsm, op: MicroOp) -> Result<(), CatalogError> {
    match op {
        MicroOp::MovImm(r) => {
            a.mov(reg(r), IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(0));
        }
        MicroOp::MovZero(r) => a.xor(reg(r), reg(r))?,
        MicroOp::Mov(d, s) => a.mov(reg(d), reg(s))?,
        MicroOp::MovA0Imm => {
            a.mov(A0, IMM64)?;
            a.tag(Field::Le64, FixupKind::Absolute, Source::Param(0));
        }
        MicroOp::AddReg(d, s) => a.add(reg(d), reg(s))?,
        MicroOp::AddImm(r) => {
            a.add(reg(r), IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(0));
        }
        MicroOp::AddConst(r, n) => a.add(reg(r), n.value())?,
        MicroOp::SubReg(d, s) => a.sub(reg(d), reg(s))?,
        MicroOp::SubImm(r) => {
            a.sub(reg(r), IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(0));
        }
        MicroOp::SubConst(r, n) => a.sub(reg(r), n.value())?,
        MicroOp::Binary(op) => binary(a, op)?,
        MicroOp::LogicImm(op) => {
            match op {
                LogicOp::And => a.and(T0, IMM32)?,
                LogicOp::Or => a.or(T0, IMM32)?,
                LogicOp::Xor => a.xor(T0, IMM32)?,
            }
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(0));
        }
        MicroOp::Neg => a.neg(T0)?,
        MicroOp::Not(r) => a.not(reg(r))?,
        MicroOp::Xchg => a.xchg(T0, T1)?,
        MicroOp::Bswap16 => {
            a.rol(r12w, 8i32)?;
            a.movzx(T0, r12w)?;
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
        MicroOp::Extend(ext, r) => match ext {
            Extension::Se16 => a.movsx(reg(r), reg16(r))?,
            Extension::Ze16 => a.movzx(reg(r), reg16(r))?,
            Extension::Se8 => a.movsx(reg(r), reg8(r))?,
            Extension::Ze8 => a.movzx(reg(r), reg8(r))?,
        },
        MicroOp::Load {
            width,
            signed,
            addr,
        } => {
            effective_address(a, addr)?;
            window(a)?;
            match (width, signed) {
                (Width::W32, _) => {
                    a.mov(T0, dword_ptr(rax))?;
                    a.bswap(T0)?;
                }
                (Width::W16, false) => {
                    a.movzx(T0, word_ptr(rax))?;
                    a.rol(r12w, 8i32)?;
                }
                (Width::W16, true) => {
                    a.movzx(eax, word_ptr(rax))?;
                    a.rol(ax, 8i32)?;
                    a.movsx(T0, ax)?;
                }
                (Width::W8, false) => a.movzx(T0, byte_ptr(rax))?,
                (Width::W8, true) => a.movsx(T0, byte_ptr(rax))?,
            }
        }
        MicroOp::Store { width, addr } => {
            effective_address(a, addr)?;
            window(a)?;
            match width {
                Width::W32 => {
                    a.mov(ecx, T0)?;
                    a.bswap(ecx)?;
                    a.mov(dword_ptr(rax), ecx)?;
                }
                Width::W16 => {
                    a.mov(ecx, T0)?;
                    a.rol(cx, 8i32)?;
                    a.mov(word_ptr(rax), cx)?;
                }
                Width::W8 => a.mov(byte_ptr(rax), r12b)?,
            }
        }
        MicroOp::Invoke(helper, form) => invoke(a, helper, form)?,
        MicroOp::Jump(Form::Short) | MicroOp::ChainJump => {
            a.jmp(TARGET)?;
            a.tag(Field::Le32, FixupKind::PcRelative, Source::Param(0));
        }
        MicroOp::Jump(Form::Long) => {
            a.mov(rax, IMM64)?;
            a.tag(Field::Le64, FixupKind::Absolute, Source::Param(0));
            a.jmp(rax)?;
        }
        MicroOp::JumpA0 => a.jmp(A0)?,
        MicroOp::ChainJumpIfT0 => {
            a.test(T0, T0)?;
            a.jne(TARGET)?;
            a.tag(Field::Le32, FixupKind::PcRelative, Source::Param(0));
        }
    }
    Ok(())
}

fn binary(a: &mut TemplateAsm, op: BinOp) -> Result<(), CatalogError> {
    match op {
        BinOp::UMul | BinOp::SMul => a.imul_2(T0, T1)?,
        BinOp::UDiv | BinOp::SDiv => divide(a, op == BinOp::SDiv)?,
        BinOp::And => a.and(T0, T1)?,
        BinOp::Or => a.or(T0, T1)?,
        BinOp::Xor => a.xor(T0, T1)?,
        BinOp::AndC => {
            a.mov(eax, T1)?;
            a.not(eax)?;
            a.and(T0, eax)?;
        }
        BinOp::OrC => {
            a.mov(eax, T1)?;
            a.not(eax)?;
            a.or(T0, eax)?;
        }
        BinOp::Nand => {
            a.and(T0, T1)?;
            a.not(T0)?;
        }
        BinOp::Nor => {
            a.or(T0, T1)?;
            a.not(T0)?;
        }
        BinOp::Eqv => {
            a.xor(T0, T1)?;
            a.not(T0)?;
        }
    }
    Ok(())
}

/// `T0 = T0 / T1`; a zero divisor yields 0 and `INT_MIN / -1` wraps.
fn divide(a: &mut TemplateAsm, signed: bool) -> Result<(), CatalogError> {
    let mut store = a.create_label();

    a.xor(eax, eax)?;
    a.test(T1, T1)?;
    a.je(store)?;
    a.mov(eax, T0)?;
    if signed {
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
    Ok(())
}

/// Emulated address of a load or store into eax.
fn effective_address(a: &mut TemplateAsm, addr: AddrMode) -> Result<(), CatalogError> {
    a.mov(eax, T1)?;
    match addr {
        AddrMode::Base => {}
        AddrMode::Indexed => a.add(eax, T2)?,
        AddrMode::Displaced => {
            a.add(eax, IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(0));
        }
    }
    Ok(())
}

/// Turn the emulated address in eax into a host address in rax. Clobbers rcx.
fn window(a: &mut TemplateAsm) -> Result<(), CatalogError> {
    let mut zero_page = a.create_label();
    let mut ram = a.create_label();
    let mut add = a.create_label();

    a.cmp(eax, IMM32)?;
    a.tag(Field::Le32, FixupKind::Immediate, Source::Window(WindowField::ZeroPageLimit));
    a.jb(zero_page)?;
    a.cmp(eax, IMM32)?;
    a.tag(Field::Le32, FixupKind::Immediate, Source::Window(WindowField::RamLimit));
    a.jb(ram)?;
    a.and(eax, IMM32)?;
    a.tag(Field::Le32, FixupKind::Immediate, Source::Window(WindowField::FallbackMask));
    a.mov(rcx, IMM64)?;
    a.tag(Field::Le64, FixupKind::Absolute, Source::Window(WindowField::FallbackBase));
    a.jmp(add)?;

    a.set_label(&mut zero_page)?;
    a.mov(rcx, IMM64)?;
    a.tag(Field::Le64, FixupKind::Absolute, Source::Window(WindowField::ZeroPageBase));
    a.jmp(add)?;

    a.set_label(&mut ram)?;
    a.mov(rcx, IMM64)?;
    a.tag(Field::Le64, FixupKind::Absolute, Source::Window(WindowField::RamBase));

    a.set_label(&mut add)?;
    a.add(rax, rcx)?;
    Ok(())
}

fn invoke(a: &mut TemplateAsm, helper: Helper, form: Form) -> Result<(), CatalogError> {
    if form == Form::Long {
        a.mov(rax, IMM64)?;
        a.tag(Field::Le64, FixupKind::Absolute, Source::Param(0));
    }

    match helper {
        Helper::Void => {}
        Helper::T0 | Helper::T0RetT0 => a.mov(edi, T0)?,
        Helper::T0T1 => {
            a.mov(edi, T0)?;
            a.mov(esi, T1)?;
        }
        Helper::T0T1T2 => {
            a.mov(edi, T0)?;
            a.mov(esi, T1)?;
            a.mov(edx, T2)?;
        }
        Helper::Imm => {
            a.mov(edi, IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(1));
        }
        Helper::Cpu => a.mov(rdi, CPU)?,
        Helper::CpuT0 => {
            a.mov(rdi, CPU)?;
            a.mov(esi, T0)?;
        }
        Helper::CpuImm => {
            a.mov(rdi, CPU)?;
            a.mov(esi, IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(1));
        }
        Helper::CpuImmImm => {
            a.mov(rdi, CPU)?;
            a.mov(esi, IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(1));
            a.mov(edx, IMM32)?;
            a.tag(Field::Le32, FixupKind::Immediate, Source::Param(2));
        }
        Helper::CpuA0RetA0 => {
            a.mov(rdi, CPU)?;
            a.mov(rsi, A0)?;
        }
    }

    match form {
        Form::Short => {
            a.call(TARGET)?;
            a.tag(Field::Le32, FixupKind::PcRelative, Source::Param(0));
        }
        Form::Long => a.call(rax)?,
    }

    match helper {
        Helper::T0RetT0 => a.mov(T0, eax)?,
        Helper::CpuA0RetA0 => a.mov(A0, rax)?,
        _ => {}
    }
    Ok(())
}
