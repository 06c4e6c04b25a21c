//! PowerPC templates against hand-assembled words.

use dyngen::catalog::{Catalog, Form};
use dyngen::{Arch, MicroOp, VReg};

fn words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
        .collect()
}

fn template_words(op: MicroOp) -> Vec<u32> {
    let catalog = Catalog::build(Arch::PowerPc).unwrap();
    words(catalog.template(op).bytes())
}

#[test]
fn register_moves() {
    // li r24, 0
    assert_eq!(template_words(MicroOp::MovZero(VReg::T0)), [0x3b00_0000]);
    // mr r24, r25
    assert_eq!(template_words(MicroOp::Mov(VReg::T0, VReg::T1)), [0x7f38_cb78]);
    // add r24, r24, r25
    assert_eq!(template_words(MicroOp::AddReg(VReg::T0, VReg::T1)), [0x7f18_ca14]);
    // neg r24, r24
    assert_eq!(template_words(MicroOp::Neg), [0x7f18_00d0]);
}

#[test]
fn control_flow() {
    // mtctr r27; bctr
    assert_eq!(template_words(MicroOp::JumpA0), [0x7f69_03a6, 0x4e80_0420]);
    // cmpwi r24, 0; beq +8; b 0
    assert_eq!(
        template_words(MicroOp::ChainJumpIfT0),
        [0x2c18_0000, 0x4182_0008, 0x4800_0000]
    );
    // lis r0, 0; ori r0, r0, 0; mtctr r0; bctr
    assert_eq!(
        template_words(MicroOp::Jump(Form::Long)),
        [0x3c00_0000, 0x6000_0000, 0x7c09_03a6, 0x4e80_0420]
    );
}

#[test]
fn trampoline_frame() {
    let catalog = Catalog::build(Arch::PowerPc).unwrap();
    let trampoline = catalog.trampoline();
    let code = words(trampoline.template.bytes());

    // stwu r1, -64(r1); mflr r0; stw r0, 68(r1)
    assert_eq!(&code[..3], &[0x9421_ffc0, 0x7c08_02a6, 0x9001_0044]);
    // addi r1, r1, 64; blr
    assert_eq!(&code[code.len() - 2..], &[0x3821_0040, 0x4e80_0020]);
    assert!(trampoline.epilogue < trampoline.template.len());
}

#[cfg(unix)]
#[test]
fn patched_words_in_the_cache() {
    use dyngen::{CodeGenerator, GeneratorOptions};

    let options = GeneratorOptions::for_arch(Arch::PowerPc).with_cache_size(16);
    let mut gen = CodeGenerator::new(options).unwrap();
    let entry = gen.gen_start();
    gen.gen_mov_32_im(VReg::T0, 0x1234_5678);
    let target = gen.cache().address(gen.code_offset() + 0x100);
    gen.gen_jmp(target);
    assert!(gen.gen_end());

    let code = words(gen.cache().bytes(entry.offset(), gen.block_len()));
    // lis r24, 0x1234; ori r24, r24, 0x5678; b +0x100
    assert_eq!(code, [0x3f00_1234, 0x6318_5678, 0x4800_0100]);
}
