// This module implements block handles and direct chaining. A compiled block normally
// leaves through a jump to the trampoline epilogue, which returns to the interpreter. A
// block may reserve up to two such exits as chain sites; once the interpreter knows the
// successor block it repoints the site straight at that block's entry, so control stays in
// generated code. Handles are offsets tagged with the cache epoch they were created in;
// any invalidation or resize makes every older handle stale and patching through one is
// refused.

//! Block handles and direct chaining.

use super::CodeGenerator;
use crate::catalog::{displacement, Field, MicroOp};
use crate::core::error::{JitError, JitResult};

/// Entry point of a generated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockEntry {
    offset: usize,
    epoch: u64,
}

impl BlockEntry {
    pub(crate) fn new(offset: usize, epoch: u64) -> Self {
        Self { offset, epoch }
    }

    /// Offset from the cache base.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// One of the two chain slots of the block being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainSlot {
    First,
    Second,
}

impl ChainSlot {
    pub const ALL: [ChainSlot; 2] = [ChainSlot::First, ChainSlot::Second];

    fn index(self) -> usize {
        match self {
            ChainSlot::First => 0,
            ChainSlot::Second => 1,
        }
    }
}

/// The relative field of an emitted chain jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpSite {
    offset: usize,
    field: Field,
    epoch: u64,
}

impl JumpSite {
    /// Offset of the displacement field from the cache base.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

impl CodeGenerator {
    /// Leave the block through `slot`, initially to the epilogue.
    pub fn gen_jmp_chain(&mut self, slot: ChainSlot) {
        self.gen_chain_site(MicroOp::ChainJump, slot);
    }

    /// Leave the block through `slot` when T0 is non-zero; fall through otherwise.
    pub fn gen_jmp_chain_if_t0(&mut self, slot: ChainSlot) {
        self.gen_chain_site(MicroOp::ChainJumpIfT0, slot);
    }

    fn gen_chain_site(&mut self, op: MicroOp, slot: ChainSlot) {
        let epilogue = self.epilogue_address();
        let Some(fixup) = self.catalog.get(op).and_then(|t| t.relative_fixup()).copied() else {
            return;
        };
        if let Some(at) = self.gen_op(op, &[epilogue as u64]) {
            self.jumps[slot.index()] = Some(JumpSite {
                offset: at + fixup.offset,
                field: fixup.field,
                epoch: self.cache.epoch(),
            });
        }
    }

    /// The chain site recorded in `slot` since the last `gen_start`.
    pub fn pending_jump(&self, slot: ChainSlot) -> Option<JumpSite> {
        self.jumps[slot.index()]
    }

    /// Point `site` at the block starting at `entry`.
    pub fn chain(&mut self, site: JumpSite, entry: BlockEntry) -> JitResult<()> {
        let target = self.entry_address(entry)?;
        self.retarget_jump(site, target)?;
        self.stats.chained += 1;
        Ok(())
    }

    /// Point `site` back at the epilogue.
    pub fn unchain(&mut self, site: JumpSite) -> JitResult<()> {
        self.retarget_jump(site, self.epilogue_address())
    }

    /// Point `site` at host address `target`.
    pub fn retarget_jump(&mut self, site: JumpSite, target: usize) -> JitResult<()> {
        self.check_epoch(site.epoch)?;
        if !self.cache.is_allocated() {
            return Err(JitError::NoCache);
        }

        let address = self.cache.address(site.offset);
        let disp = displacement(site.field, address as u64, target as u64);
        if !site.field.reaches(self.arch, disp) {
            return Err(JitError::ChainOutOfRange {
                site: address,
                target,
            });
        }

        self.cache.patch(site.offset, site.field, disp as u64);
        self.cache.flush(site.offset, site.field.width());
        log::trace!("jump at {address:#x} now targets {target:#x}");
        Ok(())
    }

    /// Host address the jump at `site` currently branches to.
    pub fn jump_target(&self, site: JumpSite) -> JitResult<usize> {
        self.check_epoch(site.epoch)?;
        let bytes = self.cache.bytes(site.offset, site.field.width());
        if bytes.len() != site.field.width() {
            return Err(JitError::NoCache);
        }
        let raw = site.field.read(bytes);
        let disp = match site.field {
            Field::Le32 => raw as u32 as i32 as i64,
            Field::U8 => raw as u8 as i8 as i64,
            _ => raw as i64,
        };
        let base = self.cache.address(site.offset) as u64 + site.field.pc_bias();
        Ok(base.wrapping_add(disp as u64) as usize)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::catalog::{Arch, VReg};
    use crate::core::test_utils::test::small_generator;

    #[test]
    fn gen_start_clears_slots() {
        let mut gen = small_generator(Arch::X86_64);
        gen.gen_start();
        gen.gen_jmp_chain_if_t0(ChainSlot::First);
        gen.gen_jmp_chain(ChainSlot::Second);
        assert!(gen.pending_jump(ChainSlot::First).is_some());
        assert!(gen.pending_jump(ChainSlot::Second).is_some());

        gen.gen_start();
        for slot in ChainSlot::ALL {
            assert_eq!(gen.pending_jump(slot), None);
        }
    }

    #[test]
    fn chain_sites_start_at_the_epilogue() {
        for arch in Arch::ALL {
            let mut gen = small_generator(arch);
            gen.gen_start();
            gen.gen_jmp_chain(ChainSlot::First);
            let site = gen.pending_jump(ChainSlot::First).unwrap();
            assert_eq!(gen.jump_target(site).unwrap(), gen.epilogue_address());
        }
    }

    #[test]
    fn chain_and_unchain() {
        for arch in Arch::ALL {
            let mut gen = small_generator(arch);
            gen.gen_start();
            gen.gen_jmp_chain(ChainSlot::First);
            let site = gen.pending_jump(ChainSlot::First).unwrap();
            assert!(gen.gen_end());

            let next = gen.gen_start();
            gen.gen_mov_32_im(VReg::T0, 1);
            gen.gen_exec_return();
            assert!(gen.gen_end());

            gen.chain(site, next).unwrap();
            assert_eq!(gen.jump_target(site).unwrap(), gen.entry_address(next).unwrap());
            gen.unchain(site).unwrap();
            assert_eq!(gen.jump_target(site).unwrap(), gen.epilogue_address());
            assert_eq!(gen.stats().chained, 1);
        }
    }

    #[test]
    fn stale_sites_are_refused() {
        let mut gen = small_generator(Arch::X86_64);
        let entry = gen.gen_start();
        gen.gen_jmp_chain(ChainSlot::First);
        let site = gen.pending_jump(ChainSlot::First).unwrap();
        gen.invalidate_cache();

        assert!(matches!(gen.chain(site, entry), Err(JitError::StaleBlock { .. })));
        assert!(matches!(gen.unchain(site), Err(JitError::StaleBlock { .. })));
    }

    #[test]
    fn entries_past_the_end_are_refused() {
        let mut gen = small_generator(Arch::X86_64);
        gen.gen_start();
        gen.gen_jmp_chain(ChainSlot::First);
        let site = gen.pending_jump(ChainSlot::First).unwrap();
        assert!(gen.gen_end());

        while !gen.full_translation_cache() {
            gen.gen_start();
            gen.gen_mov_32_im(VReg::T0, 0x1234_5678);
            gen.gen_end();
        }
        let past_end = gen.gen_start();
        assert_eq!(past_end.offset(), gen.cache().size());
        assert!(matches!(
            gen.chain(site, past_end),
            Err(JitError::EntryPastEnd { .. })
        ));
        assert_eq!(gen.jump_target(site).unwrap(), gen.epilogue_address());
        assert_eq!(gen.stats().chained, 0);
    }

    #[test]
    fn out_of_range_targets_are_refused() {
        let mut gen = small_generator(Arch::PowerPc);
        gen.gen_start();
        gen.gen_jmp_chain(ChainSlot::First);
        let site = gen.pending_jump(ChainSlot::First).unwrap();
        let far = gen.cache().address(site.offset()) + (64 << 20);
        assert!(matches!(
            gen.retarget_jump(site, far),
            Err(JitError::ChainOutOfRange { .. })
        ));
    }
}
