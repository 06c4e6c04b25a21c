// This module renders template catalogs for inspection: a one-line-per-op listing with
// template lengths and fixup counts, per-template disassembly (iced-x86 Intel syntax for the
// x86 flavours, raw big-endian words for PowerPC) annotated with the fixups, and a
// relocatable ELF object holding every template as a text symbol so the catalog can be
// examined with standard binutils. The trampoline is exported as op_execute with its exit
// sequence as op_exec_return.

//! Catalog inspection.

use crate::catalog::{Arch, Catalog, FixupKind, MicroOp, Source, Template};
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter};
use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};
use std::fmt::Write;

/// Symbol prefix of exported templates.
pub const SYMBOL_PREFIX: &str = "op_";

/// One line per template: name, length and number of fixups.
pub fn listing(catalog: &Catalog) -> String {
    let mut out = String::new();
    let width = catalog
        .iter()
        .map(|(op, _)| op.to_string().len())
        .max()
        .unwrap_or(0);

    let _ = writeln!(out, "{} catalog, {} templates", catalog.arch(), catalog.len());
    for (op, template) in catalog.iter() {
        let _ = writeln!(
            out,
            "  {:<width$}  {:>3} bytes  {} fixups",
            op.to_string(),
            template.len(),
            template.fixups().len()
        );
    }
    let trampoline = catalog.trampoline();
    let _ = writeln!(
        out,
        "  {:<width$}  {:>3} bytes  epilogue at +{}",
        "execute",
        trampoline.template.len(),
        trampoline.epilogue
    );
    out
}

/// Disassemble `bytes` as code for `arch` placed at `ip`.
pub fn disassemble(arch: Arch, bytes: &[u8], ip: u64) -> Vec<String> {
    match arch {
        Arch::X86 => disassemble_x86(32, bytes, ip),
        Arch::X86_64 => disassemble_x86(64, bytes, ip),
        Arch::PowerPc => bytes
            .chunks(4)
            .enumerate()
            .map(|(i, word)| {
                let hex: String = word.iter().map(|b| format!("{b:02x}")).collect();
                format!("{:08x}  {hex}", ip + 4 * i as u64)
            })
            .collect(),
    }
}

fn disassemble_x86(bitness: u32, bytes: &[u8], ip: u64) -> Vec<String> {
    let mut decoder = Decoder::with_ip(bitness, bytes, ip, DecoderOptions::NONE);
    let mut formatter = IntelFormatter::new();
    let mut instruction = Instruction::default();
    let mut lines = Vec::new();

    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        let start = (instruction.ip() - ip) as usize;
        let raw: String = bytes[start..start + instruction.len()]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        let mut text = String::new();
        formatter.format(&instruction, &mut text);
        lines.push(format!("{:08x}  {raw:<24}  {text}", instruction.ip()));
    }
    lines
}

/// Disassembly of one template followed by its fixups.
pub fn describe(catalog: &Catalog, op: MicroOp) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{op}:");
    if let Some(template) = catalog.get(op) {
        describe_template(&mut out, catalog.arch(), template);
    }
    out
}

/// Disassembly of the trampoline.
pub fn describe_trampoline(catalog: &Catalog) -> String {
    let trampoline = catalog.trampoline();
    let mut out = String::new();
    let _ = writeln!(out, "execute (epilogue at +{}):", trampoline.epilogue);
    describe_template(&mut out, catalog.arch(), &trampoline.template);
    out
}

fn describe_template(out: &mut String, arch: Arch, template: &Template) {
    for line in disassemble(arch, template.bytes(), 0) {
        let _ = writeln!(out, "  {line}");
    }
    for fixup in template.fixups() {
        let kind = match fixup.kind {
            FixupKind::Immediate => "imm",
            FixupKind::Absolute => "abs",
            FixupKind::PcRelative => "rel",
        };
        let source = match fixup.source {
            Source::Param(n) => format!("param{n}"),
            Source::Window(field) => format!("{field:?}"),
            Source::Context(field) => format!("context.{}", field.name()),
        };
        let _ = writeln!(out, "  +{:<3} {:?} {kind} {source}", fixup.offset, fixup.field);
    }
}

/// Relocatable ELF object with one text symbol per template.
pub fn elf_object(catalog: &Catalog) -> Result<Vec<u8>, object::write::Error> {
    let (architecture, endian) = match catalog.arch() {
        Arch::X86 => (Architecture::I386, Endianness::Little),
        Arch::X86_64 => (Architecture::X86_64, Endianness::Little),
        Arch::PowerPc => (Architecture::PowerPc, Endianness::Big),
    };
    let mut obj = Object::new(BinaryFormat::Elf, architecture, endian);
    let text = obj.section_id(StandardSection::Text);

    let define = |obj: &mut Object<'_>, name: String, bytes: &[u8]| {
        let offset = obj.append_section_data(text, bytes, 16);
        add_text_symbol(obj, text, name, offset, bytes.len() as u64);
        offset
    };

    let trampoline = catalog.trampoline();
    let execute = define(&mut obj, format!("{SYMBOL_PREFIX}execute"), trampoline.template.bytes());
    add_text_symbol(
        &mut obj,
        text,
        format!("{SYMBOL_PREFIX}exec_return"),
        execute + trampoline.epilogue as u64,
        (trampoline.template.len() - trampoline.epilogue) as u64,
    );

    for (op, template) in catalog.iter() {
        define(&mut obj, format!("{SYMBOL_PREFIX}{op}"), template.bytes());
    }

    obj.write()
}

fn add_text_symbol(
    obj: &mut Object<'_>,
    section: object::write::SectionId,
    name: String,
    value: u64,
    size: u64,
) {
    obj.add_symbol(Symbol {
        name: name.into_bytes(),
        value,
        size,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(section),
        flags: SymbolFlags::None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::VReg;

    #[test]
    fn x86_disassembly_covers_the_template() {
        let catalog = Catalog::build(Arch::X86_64).unwrap();
        let text = describe(&catalog, MicroOp::MovImm(VReg::T0));
        assert!(text.contains("mov r12d"), "{text}");
        assert!(text.contains("Le32 imm param0"), "{text}");
    }

    #[test]
    fn powerpc_disassembly_is_word_wise() {
        let lines = disassemble(Arch::PowerPc, &[0x4e, 0x80, 0x00, 0x20], 0x100);
        assert_eq!(lines, ["00000100  4e800020"]);
    }

    #[test]
    fn listing_names_every_template() {
        let catalog = Catalog::build(Arch::X86).unwrap();
        let text = listing(&catalog);
        assert_eq!(text.lines().count(), catalog.len() + 2);
        assert!(text.contains("jmp_chain_if_T0"));
    }
}
