//! Structural checks of every template catalog and random emission through the generator.

use dyngen::catalog::{Field, FixupKind, Source};
use dyngen::{Arch, Catalog, MicroOp, Template};
use hashbrown::HashSet;
use iced_x86::{Decoder, DecoderOptions};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn bitness(arch: Arch) -> u32 {
    if arch == Arch::X86_64 {
        64
    } else {
        32
    }
}

/// Start offsets of the instructions in `bytes`, asserting they decode cleanly.
fn instruction_starts(arch: Arch, bytes: &[u8], what: &str) -> Vec<usize> {
    let mut decoder = Decoder::with_ip(bitness(arch), bytes, 0, DecoderOptions::NONE);
    let mut starts = Vec::new();
    while decoder.can_decode() {
        let start = decoder.position();
        let instruction = decoder.decode();
        assert!(!instruction.is_invalid(), "{arch} {what}: invalid instruction at +{start}");
        starts.push(start);
    }
    assert_eq!(decoder.position(), bytes.len(), "{arch} {what}: trailing bytes");
    starts
}

fn check_fixups(arch: Arch, template: &Template, what: &str) {
    for fixup in template.fixups() {
        assert!(
            fixup.offset + fixup.field.width() <= template.len(),
            "{arch} {what}: fixup past the end"
        );
        if fixup.kind == FixupKind::PcRelative {
            assert!(matches!(fixup.source, Source::Param(0)), "{arch} {what}");
        }
    }
}

#[test]
fn catalogs_cover_every_micro_op() {
    let ops = MicroOp::all();
    let unique: HashSet<_> = ops.iter().collect();
    assert_eq!(unique.len(), ops.len());

    for arch in Arch::ALL {
        let catalog = Catalog::build(arch).unwrap();
        assert_eq!(catalog.arch(), arch);
        assert_eq!(catalog.len(), ops.len());
        for &op in &ops {
            let template = catalog.get(op).unwrap_or_else(|| panic!("{arch}: no {op}"));
            assert!(!template.is_empty(), "{arch} {op}: empty template");
            assert_eq!(MicroOp::from_name(&op.to_string()), Some(op));
        }
    }
}

#[test]
fn x86_templates_decode_exactly() {
    for arch in [Arch::X86, Arch::X86_64] {
        let catalog = Catalog::build(arch).unwrap();
        for (op, template) in catalog.iter() {
            let what = op.to_string();
            let starts = instruction_starts(arch, template.bytes(), &what);
            check_fixups(arch, template, &what);

            // A patched field never straddles two instructions.
            for fixup in template.fixups() {
                let owner = starts.iter().rev().find(|&&s| s <= fixup.offset).unwrap();
                let next = starts
                    .iter()
                    .find(|&&s| s > *owner)
                    .copied()
                    .unwrap_or(template.len());
                assert!(fixup.offset + fixup.field.width() <= next, "{arch} {what}");
            }
        }

        let trampoline = catalog.trampoline();
        let starts = instruction_starts(arch, trampoline.template.bytes(), "execute");
        assert!(starts.contains(&trampoline.epilogue));
        check_fixups(arch, &trampoline.template, "execute");
    }
}

#[test]
fn powerpc_templates_are_word_sized() {
    let catalog = Catalog::build(Arch::PowerPc).unwrap();
    let templates = catalog
        .iter()
        .map(|(op, t)| (op.to_string(), t))
        .chain([("execute".to_string(), &catalog.trampoline().template)]);

    for (what, template) in templates {
        assert_eq!(template.len() % 4, 0, "{what}");
        check_fixups(Arch::PowerPc, template, &what);
        for fixup in template.fixups() {
            match fixup.field {
                Field::Li24 => assert_eq!(fixup.offset % 4, 0, "{what}"),
                Field::Hi16 | Field::Lo16 => assert_eq!(fixup.offset % 4, 2, "{what}"),
                other => panic!("{what}: {other:?} field on PowerPC"),
            }
        }
    }
    assert_eq!(catalog.trampoline().epilogue % 4, 0);
}

#[cfg(unix)]
#[test]
fn random_streams_tile_the_cache() {
    use dyngen::{CodeGenerator, GeneratorOptions};

    let mut rng = StdRng::seed_from_u64(0xd1_6e_4e);
    let ops = MicroOp::all();

    for arch in Arch::ALL {
        let mut gen =
            CodeGenerator::new(GeneratorOptions::for_arch(arch).with_cache_size(256)).unwrap();

        for _ in 0..50 {
            let entry = gen.gen_start();
            let mut expected = 0;
            for _ in 0..rng.gen_range(1..40) {
                let op = *ops.choose(&mut rng).unwrap();
                let params = [rng.gen::<u32>() as u64 & !3, rng.gen(), rng.gen()];
                let at = gen.gen_op(op, &params).unwrap();
                assert_eq!(at, entry.offset() + expected);
                expected += gen.catalog().template(op).len();
            }
            assert_eq!(gen.block_len(), expected);
            assert!(gen.gen_end());

            if arch != Arch::PowerPc {
                let bytes = gen.cache().bytes(entry.offset(), expected);
                instruction_starts(arch, bytes, "random block");
            }
        }
        assert_eq!(gen.stats().blocks, 50);
    }
}
