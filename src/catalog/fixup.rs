//! Template fixups.
//!
//! A fixup names a byte range inside a template that is rewritten after the
//! template has been copied into the translation cache. The field encoding
//! says how many bytes are touched and in which layout; the kind says how the
//! value is derived; the source says where the value comes from.

use super::Arch;
use crate::core::context::ContextField;
use crate::core::window::WindowField;

/// Encoding of a patched field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// One byte.
    U8,
    /// Little-endian 32-bit word.
    Le32,
    /// Little-endian 64-bit word.
    Le64,
    /// Upper halfword of a big-endian PowerPC D-form immediate.
    Hi16,
    /// Lower halfword of a big-endian PowerPC D-form immediate.
    Lo16,
    /// The 24-bit word displacement of a PowerPC `b`/`bl`, patched in place.
    Li24,
}

/// PowerPC I-form displacement bits.
const LI_MASK: u32 = 0x03ff_fffc;

impl Field {
    /// Number of bytes touched.
    pub const fn width(self) -> usize {
        match self {
            Field::U8 => 1,
            Field::Hi16 | Field::Lo16 => 2,
            Field::Le32 | Field::Li24 => 4,
            Field::Le64 => 8,
        }
    }

    /// Distance from the field start to the address a relative value is measured from.
    ///
    /// x86 measures from the end of the displacement (the next instruction),
    /// PowerPC from the branch instruction itself.
    pub const fn pc_bias(self) -> u64 {
        match self {
            Field::Le32 => 4,
            Field::U8 => 1,
            _ => 0,
        }
    }

    /// Write `value` into `buf`, which is exactly `width()` bytes long.
    pub fn write(self, buf: &mut [u8], value: u64) {
        match self {
            Field::U8 => buf[0] = value as u8,
            Field::Le32 => buf.copy_from_slice(&(value as u32).to_le_bytes()),
            Field::Le64 => buf.copy_from_slice(&value.to_le_bytes()),
            Field::Hi16 => buf.copy_from_slice(&((value >> 16) as u16).to_be_bytes()),
            Field::Lo16 => buf.copy_from_slice(&(value as u16).to_be_bytes()),
            Field::Li24 => {
                let word = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
                let word = (word & !LI_MASK) | (value as u32 & LI_MASK);
                buf.copy_from_slice(&word.to_be_bytes());
            }
        }
    }

    /// Read the field back.
    ///
    /// `Hi16` comes back shifted into the upper half, `Li24` as a sign-extended
    /// displacement.
    pub fn read(self, buf: &[u8]) -> u64 {
        match self {
            Field::U8 => buf[0] as u64,
            Field::Le32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64,
            Field::Le64 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&buf[..8]);
                u64::from_le_bytes(bytes)
            }
            Field::Hi16 => (u16::from_be_bytes([buf[0], buf[1]]) as u64) << 16,
            Field::Lo16 => u16::from_be_bytes([buf[0], buf[1]]) as u64,
            Field::Li24 => {
                let word = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) & LI_MASK;
                (((word << 6) as i32) >> 6) as i64 as u64
            }
        }
    }

    /// Whether a relative displacement can be encoded in this field on `arch`.
    pub fn reaches(self, arch: Arch, disp: i64) -> bool {
        match self {
            // A 32-bit address space wraps, so every target is in range.
            Field::Le32 if arch.pointer_width() == 4 => true,
            Field::Le32 => i32::try_from(disp).is_ok(),
            Field::U8 => i8::try_from(disp).is_ok(),
            Field::Li24 => (-(1i64 << 25)..(1i64 << 25)).contains(&disp) && disp & 3 == 0,
            Field::Le64 | Field::Hi16 | Field::Lo16 => true,
        }
    }
}

/// How the patched value is derived from the source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixupKind {
    /// Operand value, truncated to the field.
    Immediate,
    /// Absolute host address, truncated to the field.
    Absolute,
    /// Target address minus the field's reference PC.
    PcRelative,
}

/// Where a fixup value comes from at emission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// The n-th parameter of the emission request.
    Param(u8),
    /// A constant of the generator's address window.
    Window(WindowField),
    /// The offset of a virtual register in the CPU context.
    Context(ContextField),
}

/// One patch site inside a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup {
    pub offset: usize,
    pub field: Field,
    pub kind: FixupKind,
    pub source: Source,
}

impl Fixup {
    /// Value to store for `raw` when the field sits at host address `site`.
    pub fn encode(&self, site: u64, raw: u64) -> u64 {
        match self.kind {
            FixupKind::Immediate | FixupKind::Absolute => raw,
            FixupKind::PcRelative => raw.wrapping_sub(site.wrapping_add(self.field.pc_bias())),
        }
    }
}

/// Displacement from a relative `field` at host address `site` to `target`.
pub fn displacement(field: Field, site: u64, target: u64) -> i64 {
    target.wrapping_sub(site.wrapping_add(field.pc_bias())) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn li24_keeps_opcode_bits() {
        // bl +0
        let mut word = 0x4800_0001u32.to_be_bytes();
        Field::Li24.write(&mut word, (-8i64) as u64);
        assert_eq!(u32::from_be_bytes(word), 0x4bff_fff9);
        assert_eq!(Field::Li24.read(&word) as i64, -8);
    }

    #[test]
    fn hi_lo_split() {
        let mut hi = [0u8; 2];
        let mut lo = [0u8; 2];
        Field::Hi16.write(&mut hi, 0x1234_5678);
        Field::Lo16.write(&mut lo, 0x1234_5678);
        assert_eq!(hi, [0x12, 0x34]);
        assert_eq!(lo, [0x56, 0x78]);
    }

    #[test]
    fn rel32_reach() {
        assert!(Field::Le32.reaches(Arch::X86_64, i32::MAX as i64));
        assert!(!Field::Le32.reaches(Arch::X86_64, i32::MAX as i64 + 1));
        assert!(Field::Le32.reaches(Arch::X86, i64::MAX));
    }

    #[test]
    fn branch24_reach() {
        assert!(Field::Li24.reaches(Arch::PowerPc, (1 << 25) - 4));
        assert!(!Field::Li24.reaches(Arch::PowerPc, 1 << 25));
        assert!(Field::Li24.reaches(Arch::PowerPc, -(1 << 25)));
        assert!(!Field::Li24.reaches(Arch::PowerPc, 6));
    }

    #[test]
    fn relative_encoding() {
        let fixup = Fixup {
            offset: 1,
            field: Field::Le32,
            kind: FixupKind::PcRelative,
            source: Source::Param(0),
        };
        assert_eq!(fixup.encode(0x1001, 0x2000) as u32, 0x2000 - 0x1005);
    }
}
