// This module encodes 32-bit PowerPC instruction words. There is no assembler crate for
// PowerPC in the stack, and the handful of forms the templates need (D-form immediates,
// X/XO-form register operations, M-form rotates, I-form and B-form branches, and the
// special-purpose register moves) are plain bit packing. WordAsm collects words for one
// template, places fixups on the immediate halfword or the branch displacement of the
// word just added, and emits the template bytes in big-endian order.

//! PowerPC instruction encoding.

use crate::catalog::{Field, Fixup, FixupKind, Source, Template};

/// A general purpose register number.
pub type Gpr = u32;

pub const R0: Gpr = 0;
pub const R1: Gpr = 1;
pub const R3: Gpr = 3;
pub const R4: Gpr = 4;
pub const R5: Gpr = 5;
pub const R11: Gpr = 11;

fn d_form(opcd: u32, rt: Gpr, ra: Gpr, imm: u16) -> u32 {
    (opcd << 26) | (rt << 21) | (ra << 16) | imm as u32
}

fn x_form(rt: Gpr, ra: Gpr, rb: Gpr, xo: u32) -> u32 {
    (31 << 26) | (rt << 21) | (ra << 16) | (rb << 11) | (xo << 1)
}

fn spr_move(xo: u32, reg: Gpr, spr: u32) -> u32 {
    x_form(reg, spr & 0x1f, spr >> 5, xo)
}

pub fn addi(rt: Gpr, ra: Gpr, simm: i16) -> u32 {
    d_form(14, rt, ra, simm as u16)
}

pub fn li(rt: Gpr, simm: i16) -> u32 {
    addi(rt, 0, simm)
}

pub fn lis(rt: Gpr, imm: u16) -> u32 {
    d_form(15, rt, 0, imm)
}

pub fn ori(ra: Gpr, rs: Gpr, uimm: u16) -> u32 {
    d_form(24, rs, ra, uimm)
}

pub fn subfic(rt: Gpr, ra: Gpr, simm: i16) -> u32 {
    d_form(8, rt, ra, simm as u16)
}

/// `cmpwi cr0, ra, simm`
pub fn cmpwi(ra: Gpr, simm: i16) -> u32 {
    d_form(11, 0, ra, simm as u16)
}

pub fn lwz(rt: Gpr, d: i16, ra: Gpr) -> u32 {
    d_form(32, rt, ra, d as u16)
}

pub fn stw(rs: Gpr, d: i16, ra: Gpr) -> u32 {
    d_form(36, rs, ra, d as u16)
}

pub fn stwu(rs: Gpr, d: i16, ra: Gpr) -> u32 {
    d_form(37, rs, ra, d as u16)
}

pub fn add(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 266)
}

/// `rt = rb - ra`
pub fn subf(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 40)
}

pub fn neg(rt: Gpr, ra: Gpr) -> u32 {
    x_form(rt, ra, 0, 104)
}

pub fn mullw(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 235)
}

pub fn divw(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 491)
}

pub fn divwu(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 459)
}

pub fn and(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 28)
}

pub fn or(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 444)
}

pub fn xor(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 316)
}

pub fn nand(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 476)
}

pub fn nor(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 124)
}

pub fn eqv(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 284)
}

/// `ra = rs & !rb`
pub fn andc(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 60)
}

/// `ra = rs | !rb`
pub fn orc(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 412)
}

pub fn mr(ra: Gpr, rs: Gpr) -> u32 {
    or(ra, rs, rs)
}

pub fn slw(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 24)
}

pub fn srw(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 536)
}

pub fn sraw(ra: Gpr, rs: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 792)
}

pub fn extsh(ra: Gpr, rs: Gpr) -> u32 {
    x_form(rs, ra, 0, 922)
}

pub fn extsb(ra: Gpr, rs: Gpr) -> u32 {
    x_form(rs, ra, 0, 954)
}

pub fn lwzx(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 23)
}

pub fn lhzx(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 279)
}

pub fn lhax(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 343)
}

pub fn lbzx(rt: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rt, ra, rb, 87)
}

pub fn stwx(rs: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 151)
}

pub fn sthx(rs: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 407)
}

pub fn stbx(rs: Gpr, ra: Gpr, rb: Gpr) -> u32 {
    x_form(rs, ra, rb, 215)
}

pub fn rlwinm(ra: Gpr, rs: Gpr, sh: u32, mb: u32, me: u32) -> u32 {
    (21 << 26) | (rs << 21) | (ra << 16) | (sh << 11) | (mb << 6) | (me << 1)
}

pub fn rlwimi(ra: Gpr, rs: Gpr, sh: u32, mb: u32, me: u32) -> u32 {
    (20 << 26) | (rs << 21) | (ra << 16) | (sh << 11) | (mb << 6) | (me << 1)
}

pub fn rlwnm(ra: Gpr, rs: Gpr, rb: Gpr, mb: u32, me: u32) -> u32 {
    (23 << 26) | (rs << 21) | (ra << 16) | (rb << 11) | (mb << 6) | (me << 1)
}

pub fn mflr(rt: Gpr) -> u32 {
    spr_move(339, rt, 8)
}

pub fn mtlr(rs: Gpr) -> u32 {
    spr_move(467, rs, 8)
}

pub fn mtctr(rs: Gpr) -> u32 {
    spr_move(467, rs, 9)
}

pub const BCTR: u32 = 0x4e80_0420;
pub const BCTRL: u32 = 0x4e80_0421;
pub const BLR: u32 = 0x4e80_0020;

/// `b` with a zero displacement, patched later.
pub const B: u32 = 18 << 26;

/// `bl` with a zero displacement, patched later.
pub const BL: u32 = (18 << 26) | 1;

/// `beq cr0, disp`
pub fn beq(disp: i16) -> u32 {
    (16 << 26) | (12 << 21) | (2 << 16) | (disp as u16 as u32 & 0xfffc)
}

/// Word-level template builder.
#[derive(Default)]
pub(crate) struct WordAsm {
    words: Vec<u32>,
    fixups: Vec<Fixup>,
    mark: Option<usize>,
}

impl WordAsm {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn emit(&mut self, word: u32) {
        self.words.push(word);
    }

    /// Emit `word` with a fixup on its immediate halfword or branch displacement.
    pub(crate) fn emit_fixup(&mut self, word: u32, field: Field, kind: FixupKind, source: Source) {
        let base = self.words.len() * 4;
        let offset = match field {
            Field::Hi16 | Field::Lo16 => base + 2,
            _ => base,
        };
        self.words.push(word);
        self.fixups.push(Fixup {
            offset,
            field,
            kind,
            source,
        });
    }

    /// `lis rd, hi(value); ori rd, rd, lo(value)`
    pub(crate) fn load_imm(&mut self, rd: Gpr, kind: FixupKind, source: Source) {
        self.emit_fixup(lis(rd, 0), Field::Hi16, kind, source);
        self.emit_fixup(ori(rd, rd, 0), Field::Lo16, kind, source);
    }

    /// Remember the offset of the next word.
    pub(crate) fn mark(&mut self) {
        self.mark = Some(self.words.len() * 4);
    }

    pub(crate) fn finish(self) -> (Template, Option<usize>) {
        let bytes = self.words.iter().flat_map(|w| w.to_be_bytes()).collect();
        (Template::new(bytes, self.fixups), self.mark)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings() {
        assert_eq!(mflr(R0), 0x7c08_02a6);
        assert_eq!(mtlr(R0), 0x7c08_03a6);
        assert_eq!(mtctr(R0), 0x7c09_03a6);
        assert_eq!(stwu(R1, -64, R1), 0x9421_ffc0);
        assert_eq!(mr(R3, 24), 0x7f03_c378);
        assert_eq!(cmpwi(R3, 0), 0x2c03_0000);
        assert_eq!(beq(8), 0x4182_0008);
        assert_eq!(addi(R1, R1, 64), 0x3821_0040);
        assert_eq!(add(R3, R4, R5), 0x7c64_2a14);
        assert_eq!(lwzx(R3, R4, R5), 0x7c64_282e);
    }

    #[test]
    fn immediate_fixups_land_on_low_halfword() {
        let mut asm = WordAsm::new();
        asm.emit(BLR);
        asm.load_imm(R3, FixupKind::Immediate, Source::Param(0));
        let (template, _) = asm.finish();
        assert_eq!(template.len(), 12);
        assert_eq!(template.fixups()[0].offset, 6);
        assert_eq!(template.fixups()[1].offset, 10);
    }
}
