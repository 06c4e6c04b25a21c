//! Short and long form selection for calls and jumps.

#![cfg(unix)]

use dyngen::catalog::{Form, Helper};
use dyngen::{Arch, CodeGenerator, GeneratorOptions, MicroOp};

fn generator(arch: Arch) -> CodeGenerator {
    CodeGenerator::new(GeneratorOptions::for_arch(arch).with_cache_size(64)).unwrap()
}

fn emitted_len(gen: &mut CodeGenerator, f: impl FnOnce(&mut CodeGenerator)) -> usize {
    let before = gen.code_offset();
    f(gen);
    gen.code_offset() - before
}

fn form_lengths(gen: &CodeGenerator, short: MicroOp, long: MicroOp) -> (usize, usize) {
    let catalog = gen.catalog();
    (catalog.template(short).len(), catalog.template(long).len())
}

#[test]
fn every_helper_signature_picks_by_distance() {
    for arch in Arch::ALL {
        let mut gen = generator(arch);
        gen.gen_start();
        let near = gen.cache().address(0);
        let far = near.wrapping_add(3 << 30) & !0xf;

        for helper in Helper::ALL {
            let (short, long) = form_lengths(
                &gen,
                MicroOp::Invoke(helper, Form::Short),
                MicroOp::Invoke(helper, Form::Long),
            );

            let len = emitted_len(&mut gen, |gen| gen.gen_invoke_helper(helper, near, [1, 2]));
            assert_eq!(len, short, "{arch} {helper:?} near");

            let len = emitted_len(&mut gen, |gen| gen.gen_invoke_helper(helper, far, [1, 2]));
            let expected = if arch == Arch::X86 { short } else { long };
            assert_eq!(len, expected, "{arch} {helper:?} far");
        }
        assert!(gen.gen_end());
    }
}

#[test]
fn jumps_pick_by_distance() {
    for arch in Arch::ALL {
        let mut gen = generator(arch);
        gen.gen_start();
        let (short, long) = form_lengths(
            &gen,
            MicroOp::Jump(Form::Short),
            MicroOp::Jump(Form::Long),
        );

        let near = gen.cache().address(gen.code_offset() + 1024);
        assert_eq!(emitted_len(&mut gen, |gen| gen.gen_jmp(near)), short, "{arch}");

        let far = near.wrapping_add(1 << 31);
        let expected = if arch == Arch::X86 { short } else { long };
        assert_eq!(emitted_len(&mut gen, |gen| gen.gen_jmp(far)), expected, "{arch}");

        let stats = gen.stats();
        assert_eq!(stats.direct_jumps + stats.indirect_jumps, 2);
    }
}

#[test]
fn powerpc_reach_is_32_mib() {
    let gen = generator(Arch::PowerPc);
    let call = MicroOp::Invoke(Helper::Void, Form::Short);
    let fixup = *gen.catalog().template(call).relative_fixup().unwrap();
    let site = gen.cache().address(gen.code_offset() + fixup.offset);
    let limit = 32 << 20;

    assert!(gen.direct_reach(call, site + limit - 4));
    assert!(!gen.direct_reach(call, site + limit));
    assert!(!gen.direct_reach(call, site + 2));
    assert!(gen.direct_reach(call, site.wrapping_sub(limit)));
    assert!(!gen.direct_reach(call, site.wrapping_sub(limit + 4)));
}

#[test]
fn x86_64_reach_is_2_gib() {
    let gen = generator(Arch::X86_64);
    let cursor = gen.cache().address(gen.code_offset());
    let call = MicroOp::Invoke(Helper::Void, Form::Short);
    let fixup = *gen.catalog().template(call).relative_fixup().unwrap();
    let next = (cursor + fixup.offset + 4) as i64;

    let reachable = next + i32::MAX as i64;
    assert!(gen.direct_reach(call, reachable as usize));
    assert!(!gen.direct_reach(call, (reachable + 1) as usize));
}
