// This module wraps the iced-x86 code assembler for building instruction templates. A
// template is assembled once with placeholder operands (recognisable immediates and a
// fixed branch target), and every operand that must be patched at emission time is
// tagged right after the instruction that carries it. Tagged operands are always the
// trailing bytes of their instruction, which is how x86 lays out displacements and
// immediates, so the fixup offset is the instruction end minus the field width. After
// assembly the recorded offsets are checked against the placeholder bytes so a wrong
// tag or an unexpected encoding choice is caught when the catalog is built.

//! Template assembly using iced-x86.

use crate::catalog::{Field, Fixup, FixupKind, Source, Template};
use crate::core::error::CatalogError;
use iced_x86::code_asm::CodeAssembler;
use iced_x86::BlockEncoderOptions;
use std::ops::{Deref, DerefMut};

/// Placeholder for 32-bit immediates, displacements and absolute addresses.
pub(crate) const IMM32: i32 = 0x7f3f_1f0f;

/// Placeholder for 64-bit immediates and absolute addresses.
pub(crate) const IMM64: u64 = 0x7f3f_1f0f_0f1f_3f7f;

/// Placeholder for 8-bit immediates.
pub(crate) const IMM8: i32 = 0x1f;

/// Placeholder branch target. Templates are assembled at address 0.
pub(crate) const TARGET: u64 = 0x4000_0000;

struct PendingFixup {
    index: usize,
    field: Field,
    kind: FixupKind,
    source: Source,
}

/// Code assembler that records patch sites.
pub(crate) struct TemplateAsm {
    name: String,
    asm: CodeAssembler,
    fixups: Vec<PendingFixup>,
    mark: Option<usize>,
}

impl TemplateAsm {
    pub(crate) fn new(bitness: u32, name: impl Into<String>) -> Result<Self, CatalogError> {
        Ok(Self {
            name: name.into(),
            asm: CodeAssembler::new(bitness)?,
            fixups: Vec::new(),
            mark: None,
        })
    }

    /// Tag the trailing `field` of the instruction just added.
    pub(crate) fn tag(&mut self, field: Field, kind: FixupKind, source: Source) {
        let index = self.asm.instructions().len().saturating_sub(1);
        self.fixups.push(PendingFixup {
            index,
            field,
            kind,
            source,
        });
    }

    /// Remember the offset of the next instruction.
    pub(crate) fn mark(&mut self) {
        self.mark = Some(self.asm.instructions().len());
    }

    /// Assemble and resolve fixup offsets. Returns the template and the marked offset.
    pub(crate) fn finish(mut self) -> Result<(Template, Option<usize>), CatalogError> {
        let result = self
            .asm
            .assemble_options(0, BlockEncoderOptions::RETURN_NEW_INSTRUCTION_OFFSETS)?;
        let code = result.inner.code_buffer;
        let offsets = result.inner.new_instruction_offsets;

        let start_of = |index: usize| offsets.get(index).map_or(code.len(), |&o| o as usize);

        let mut fixups = Vec::with_capacity(self.fixups.len());
        for pending in &self.fixups {
            let end = start_of(pending.index + 1);
            let offset = end
                .checked_sub(pending.field.width())
                .ok_or_else(|| self.mismatch(end))?;
            let expected = placeholder(pending.field, pending.kind, end);
            if code.get(offset..end) != Some(&expected[..]) {
                return Err(self.mismatch(offset));
            }
            fixups.push(Fixup {
                offset,
                field: pending.field,
                kind: pending.kind,
                source: pending.source,
            });
        }

        let mark = self.mark.map(start_of);
        log::trace!("template {}: {} bytes, {} fixups", self.name, code.len(), fixups.len());
        Ok((Template::new(code, fixups), mark))
    }

    fn mismatch(&self, offset: usize) -> CatalogError {
        CatalogError::FixupMismatch {
            op: self.name.clone(),
            offset,
        }
    }
}

impl Deref for TemplateAsm {
    type Target = CodeAssembler;

    fn deref(&self) -> &CodeAssembler {
        &self.asm
    }
}

impl DerefMut for TemplateAsm {
    fn deref_mut(&mut self) -> &mut CodeAssembler {
        &mut self.asm
    }
}

/// Bytes the assembler produced for a tagged field ending at `end`.
fn placeholder(field: Field, kind: FixupKind, end: usize) -> Vec<u8> {
    match (field, kind) {
        (Field::Le32, FixupKind::PcRelative) => (TARGET as u32)
            .wrapping_sub(end as u32)
            .to_le_bytes()
            .to_vec(),
        (Field::Le32, _) => IMM32.to_le_bytes().to_vec(),
        (Field::Le64, _) => IMM64.to_le_bytes().to_vec(),
        (Field::U8, _) => vec![IMM8 as u8],
        // PowerPC encodings never go through the x86 assembler.
        (Field::Hi16 | Field::Lo16 | Field::Li24, _) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::code_asm::*;

    #[test]
    fn immediate_is_trailing() {
        let mut a = TemplateAsm::new(64, "test").unwrap();
        a.mov(r12d, IMM32).unwrap();
        a.tag(Field::Le32, FixupKind::Immediate, Source::Param(0));
        a.ret().unwrap();
        let (template, _) = a.finish().unwrap();
        // mov r12d, imm32 is 41 BC id
        assert_eq!(&template.bytes()[..2], &[0x41, 0xbc]);
        assert_eq!(template.fixups()[0].offset, 2);
        assert_eq!(template.len(), 7);
    }

    #[test]
    fn relative_call() {
        let mut a = TemplateAsm::new(64, "test").unwrap();
        a.mov(edi, r12d).unwrap();
        a.call(TARGET).unwrap();
        a.tag(Field::Le32, FixupKind::PcRelative, Source::Param(0));
        let (template, _) = a.finish().unwrap();
        assert_eq!(template.bytes()[3], 0xe8);
        assert_eq!(template.fixups()[0].offset, 4);
        assert_eq!(template.len(), 8);
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let mut a = TemplateAsm::new(64, "bad").unwrap();
        a.mov(r12d, r13d).unwrap();
        a.tag(Field::Le32, FixupKind::Immediate, Source::Param(0));
        assert!(matches!(a.finish(), Err(CatalogError::FixupMismatch { .. })));
    }

    #[test]
    fn mark_points_at_next_instruction() {
        let mut a = TemplateAsm::new(64, "test").unwrap();
        a.push(rbp).unwrap();
        a.mark();
        a.pop(rbp).unwrap();
        a.ret().unwrap();
        let (_, mark) = a.finish().unwrap();
        assert_eq!(mark, Some(1));
    }
}
