//! Micro-operation vocabulary.
//!
//! Every operation the interpreter can ask for is one `MicroOp` value. The
//! names produced by `Display` follow the traditional dyngen spelling
//! (`add_32_T0_T1`, `load_u16_T0_T1_im`, `invoke_direct_CPU_T0`), which is
//! also what the dump tool and ELF export use as symbol names.

use std::fmt;

/// A 32-bit virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VReg {
    T0,
    T1,
    T2,
}

impl VReg {
    pub const ALL: [VReg; 3] = [VReg::T0, VReg::T1, VReg::T2];

    pub fn name(self) -> &'static str {
        match self {
            VReg::T0 => "T0",
            VReg::T1 => "T1",
            VReg::T2 => "T2",
        }
    }
}

/// Small constants with a dedicated short encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::One, Step::Two, Step::Four, Step::Eight];

    pub fn from_value(value: i32) -> Option<Step> {
        match value {
            1 => Some(Step::One),
            2 => Some(Step::Two),
            4 => Some(Step::Four),
            8 => Some(Step::Eight),
            _ => None,
        }
    }

    pub fn value(self) -> i32 {
        self as i32
    }
}

/// `T0 = T0 op T1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    UMul,
    SMul,
    UDiv,
    SDiv,
    And,
    Or,
    Xor,
    AndC,
    OrC,
    Nand,
    Nor,
    Eqv,
}

impl BinOp {
    pub const ALL: [BinOp; 12] = [
        BinOp::UMul,
        BinOp::SMul,
        BinOp::UDiv,
        BinOp::SDiv,
        BinOp::And,
        BinOp::Or,
        BinOp::Xor,
        BinOp::AndC,
        BinOp::OrC,
        BinOp::Nand,
        BinOp::Nor,
        BinOp::Eqv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinOp::UMul => "umul",
            BinOp::SMul => "smul",
            BinOp::UDiv => "udiv",
            BinOp::SDiv => "sdiv",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::AndC => "andc",
            BinOp::OrC => "orc",
            BinOp::Nand => "nand",
            BinOp::Nor => "nor",
            BinOp::Eqv => "eqv",
        }
    }

    /// Reference semantics. Division by zero yields zero, `INT_MIN / -1` wraps.
    pub fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            BinOp::UMul => a.wrapping_mul(b),
            BinOp::SMul => (a as i32).wrapping_mul(b as i32) as u32,
            BinOp::UDiv => a.checked_div(b).unwrap_or(0),
            BinOp::SDiv if b == 0 => 0,
            BinOp::SDiv => (a as i32).wrapping_div(b as i32) as u32,
            BinOp::And => a & b,
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::AndC => a & !b,
            BinOp::OrC => a | !b,
            BinOp::Nand => !(a & b),
            BinOp::Nor => !(a | b),
            BinOp::Eqv => !(a ^ b),
        }
    }
}

/// `T0 = T0 op imm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

impl LogicOp {
    pub const ALL: [LogicOp; 3] = [LogicOp::And, LogicOp::Or, LogicOp::Xor];

    pub fn name(self) -> &'static str {
        match self {
            LogicOp::And => "and",
            LogicOp::Or => "or",
            LogicOp::Xor => "xor",
        }
    }
}

/// Shifts and rotates of T0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Lsl,
    Lsr,
    Asr,
    Rol,
    Ror,
}

impl ShiftOp {
    pub const ALL: [ShiftOp; 5] = [
        ShiftOp::Lsl,
        ShiftOp::Lsr,
        ShiftOp::Asr,
        ShiftOp::Rol,
        ShiftOp::Ror,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShiftOp::Lsl => "lsl",
            ShiftOp::Lsr => "lsr",
            ShiftOp::Asr => "asr",
            ShiftOp::Rol => "rol",
            ShiftOp::Ror => "ror",
        }
    }

    /// Reference semantics for counts below 32.
    pub fn apply(self, value: u32, count: u32) -> u32 {
        let count = count & 31;
        match self {
            ShiftOp::Lsl => value << count,
            ShiftOp::Lsr => value >> count,
            ShiftOp::Asr => ((value as i32) >> count) as u32,
            ShiftOp::Rol => value.rotate_left(count),
            ShiftOp::Ror => value.rotate_right(count),
        }
    }
}

/// Sign or zero extension to 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    Se16,
    Ze16,
    Se8,
    Ze8,
}

impl Extension {
    pub const ALL: [Extension; 4] = [
        Extension::Se16,
        Extension::Ze16,
        Extension::Se8,
        Extension::Ze8,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Extension::Se16 => "se_16_32",
            Extension::Ze16 => "ze_16_32",
            Extension::Se8 => "se_8_32",
            Extension::Ze8 => "ze_8_32",
        }
    }

    pub fn width(self) -> Width {
        match self {
            Extension::Se16 | Extension::Ze16 => Width::W16,
            Extension::Se8 | Extension::Ze8 => Width::W8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Extension::Se16 | Extension::Se8)
    }
}

/// Memory access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
}

impl Width {
    pub const ALL: [Width; 3] = [Width::W8, Width::W16, Width::W32];

    pub fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
        }
    }
}

/// Effective address of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddrMode {
    /// `[T1]`
    Base,
    /// `[T1 + T2]`
    Indexed,
    /// `[T1 + imm]`
    Displaced,
}

impl AddrMode {
    pub const ALL: [AddrMode; 3] = [AddrMode::Base, AddrMode::Indexed, AddrMode::Displaced];

    fn suffix(self) -> &'static str {
        match self {
            AddrMode::Base => "T1_0",
            AddrMode::Indexed => "T1_T2",
            AddrMode::Displaced => "T1_im",
        }
    }
}

/// Signature of a helper called from generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Helper {
    /// `fn()`
    Void,
    /// `fn(T0)`
    T0,
    /// `fn(T0, T1)`
    T0T1,
    /// `fn(T0, T1, T2)`
    T0T1T2,
    /// `T0 = fn(T0)`
    T0RetT0,
    /// `fn(imm)`
    Imm,
    /// `fn(cpu)`
    Cpu,
    /// `fn(cpu, T0)`
    CpuT0,
    /// `fn(cpu, imm)`
    CpuImm,
    /// `fn(cpu, imm, imm)`
    CpuImmImm,
    /// `A0 = fn(cpu, A0)`
    CpuA0RetA0,
}

impl Helper {
    pub const ALL: [Helper; 11] = [
        Helper::Void,
        Helper::T0,
        Helper::T0T1,
        Helper::T0T1T2,
        Helper::T0RetT0,
        Helper::Imm,
        Helper::Cpu,
        Helper::CpuT0,
        Helper::CpuImm,
        Helper::CpuImmImm,
        Helper::CpuA0RetA0,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Helper::Void => "",
            Helper::T0 => "_T0",
            Helper::T0T1 => "_T0_T1",
            Helper::T0T1T2 => "_T0_T1_T2",
            Helper::T0RetT0 => "_T0_ret_T0",
            Helper::Imm => "_im",
            Helper::Cpu => "_CPU",
            Helper::CpuT0 => "_CPU_T0",
            Helper::CpuImm => "_CPU_im",
            Helper::CpuImmImm => "_CPU_im_im",
            Helper::CpuA0RetA0 => "_CPU_A0_ret_A0",
        }
    }
}

/// Encoding of a call or jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    /// Relative displacement, limited reach.
    Short,
    /// Absolute target through a scratch register.
    Long,
}

/// One abstract operation with a template per architecture.
///
/// Parameter conventions for [`CodeGenerator::gen_op`](crate::codegen::CodeGenerator::gen_op):
/// immediates, displacements, shift counts and pointer operands are parameter 0;
/// for invocations parameter 0 is the helper address and parameters 1 and 2 the
/// immediates; jumps take their target as parameter 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MicroOp {
    MovImm(VReg),
    MovZero(VReg),
    Mov(VReg, VReg),
    MovA0Imm,
    AddReg(VReg, VReg),
    AddImm(VReg),
    AddConst(VReg, Step),
    SubReg(VReg, VReg),
    SubImm(VReg),
    SubConst(VReg, Step),
    Binary(BinOp),
    LogicImm(LogicOp),
    Neg,
    Not(VReg),
    Xchg,
    Bswap16,
    Bswap32,
    Shift(ShiftOp),
    ShiftImm(ShiftOp),
    Extend(Extension, VReg),
    Load {
        width: Width,
        signed: bool,
        addr: AddrMode,
    },
    Store {
        width: Width,
        addr: AddrMode,
    },
    Invoke(Helper, Form),
    Jump(Form),
    JumpA0,
    ChainJump,
    ChainJumpIfT0,
}

impl MicroOp {
    /// Every micro-op, in catalog order.
    pub fn all() -> Vec<MicroOp> {
        let mut ops = Vec::new();

        for reg in VReg::ALL {
            ops.push(MicroOp::MovImm(reg));
            ops.push(MicroOp::MovZero(reg));
        }
        for dst in VReg::ALL {
            for src in VReg::ALL.into_iter().filter(|&src| src != dst) {
                ops.push(MicroOp::Mov(dst, src));
            }
        }
        ops.push(MicroOp::MovA0Imm);

        for dst in VReg::ALL {
            for src in VReg::ALL.into_iter().filter(|&src| src != dst) {
                ops.push(MicroOp::AddReg(dst, src));
                ops.push(MicroOp::SubReg(dst, src));
            }
            ops.push(MicroOp::AddImm(dst));
            ops.push(MicroOp::SubImm(dst));
            for step in Step::ALL {
                ops.push(MicroOp::AddConst(dst, step));
                ops.push(MicroOp::SubConst(dst, step));
            }
        }

        ops.extend(BinOp::ALL.map(MicroOp::Binary));
        ops.extend(LogicOp::ALL.map(MicroOp::LogicImm));
        ops.push(MicroOp::Neg);
        ops.extend(VReg::ALL.map(MicroOp::Not));
        ops.push(MicroOp::Xchg);
        ops.push(MicroOp::Bswap16);
        ops.push(MicroOp::Bswap32);
        ops.extend(ShiftOp::ALL.map(MicroOp::Shift));
        ops.extend(ShiftOp::ALL.map(MicroOp::ShiftImm));
        for ext in Extension::ALL {
            ops.extend(VReg::ALL.map(|reg| MicroOp::Extend(ext, reg)));
        }

        for addr in AddrMode::ALL {
            for width in Width::ALL {
                ops.push(MicroOp::Load { width, signed: false, addr });
                ops.push(MicroOp::Load { width, signed: true, addr });
                ops.push(MicroOp::Store { width, addr });
            }
        }

        for helper in Helper::ALL {
            ops.push(MicroOp::Invoke(helper, Form::Short));
            ops.push(MicroOp::Invoke(helper, Form::Long));
        }
        ops.push(MicroOp::Jump(Form::Short));
        ops.push(MicroOp::Jump(Form::Long));
        ops.push(MicroOp::JumpA0);
        ops.push(MicroOp::ChainJump);
        ops.push(MicroOp::ChainJumpIfT0);

        ops
    }

    /// Look a micro-op up by its canonical name.
    pub fn from_name(name: &str) -> Option<MicroOp> {
        Self::all().into_iter().find(|op| op.to_string() == name)
    }
}

impl fmt::Display for MicroOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MicroOp::MovImm(r) => write!(f, "mov_32_{}_im", r.name()),
            MicroOp::MovZero(r) => write!(f, "mov_32_{}_0", r.name()),
            MicroOp::Mov(d, s) => write!(f, "mov_32_{}_{}", d.name(), s.name()),
            MicroOp::MovA0Imm => f.write_str("mov_ad_A0_im"),
            MicroOp::AddReg(d, s) => write!(f, "add_32_{}_{}", d.name(), s.name()),
            MicroOp::AddImm(r) => write!(f, "add_32_{}_im", r.name()),
            MicroOp::AddConst(r, n) => write!(f, "add_32_{}_{}", r.name(), n.value()),
            MicroOp::SubReg(d, s) => write!(f, "sub_32_{}_{}", d.name(), s.name()),
            MicroOp::SubImm(r) => write!(f, "sub_32_{}_im", r.name()),
            MicroOp::SubConst(r, n) => write!(f, "sub_32_{}_{}", r.name(), n.value()),
            MicroOp::Binary(op) => write!(f, "{}_32_T0_T1", op.name()),
            MicroOp::LogicImm(op) => write!(f, "{}_32_T0_im", op.name()),
            MicroOp::Neg => f.write_str("neg_32_T0"),
            MicroOp::Not(r) => write!(f, "not_32_{}", r.name()),
            MicroOp::Xchg => f.write_str("xchg_32_T0_T1"),
            MicroOp::Bswap16 => f.write_str("bswap_16_T0"),
            MicroOp::Bswap32 => f.write_str("bswap_32_T0"),
            MicroOp::Shift(op) => write!(f, "{}_32_T0_T1", op.name()),
            MicroOp::ShiftImm(op) => write!(f, "{}_32_T0_im", op.name()),
            MicroOp::Extend(ext, r) => write!(f, "{}_{}", ext.name(), r.name()),
            MicroOp::Load { width, signed, addr } => write!(
                f,
                "load_{}{}_T0_{}",
                if signed { 's' } else { 'u' },
                width.bits(),
                addr.suffix()
            ),
            MicroOp::Store { width, addr } => {
                write!(f, "store_{}_T0_{}", width.bits(), addr.suffix())
            }
            MicroOp::Invoke(helper, Form::Short) => write!(f, "invoke_direct{}", helper.suffix()),
            MicroOp::Invoke(helper, Form::Long) => write!(f, "invoke{}", helper.suffix()),
            MicroOp::Jump(Form::Short) => f.write_str("jmp_fast"),
            MicroOp::Jump(Form::Long) => f.write_str("jmp_slow"),
            MicroOp::JumpA0 => f.write_str("jmp_A0"),
            MicroOp::ChainJump => f.write_str("jmp_chain"),
            MicroOp::ChainJumpIfT0 => f.write_str("jmp_chain_if_T0"),
        }
    }
}
