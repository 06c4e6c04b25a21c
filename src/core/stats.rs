// This module tracks code generation statistics for a generator: how many blocks were
// closed, how many bytes and micro-ops went into the cache, how often call and jump
// sites got the short or the long encoding, how often blocks were chained, and how
// often the cache filled up or was invalidated. The emulator prints these on request
// to tune the cache size preference.

//! Code generation statistics.

use crate::catalog::MicroOp;
use hashbrown::HashMap;
use std::fmt;

/// Counters kept by a [`CodeGenerator`](crate::codegen::CodeGenerator).
#[derive(Debug, Default, Clone)]
pub struct GenStats {
    /// Blocks closed with `gen_end`.
    pub blocks: usize,

    /// Bytes of code emitted, trampoline included.
    pub code_bytes: usize,

    /// Micro-ops emitted.
    pub ops: usize,

    /// Per micro-op emission counts.
    pub op_counts: HashMap<MicroOp, usize>,

    /// Calls emitted in the short (relative) form.
    pub direct_calls: usize,

    /// Calls emitted in the long (absolute) form.
    pub indirect_calls: usize,

    /// Jumps emitted in the short form.
    pub direct_jumps: usize,

    /// Jumps emitted in the long form.
    pub indirect_jumps: usize,

    /// Chain sites repointed at another block.
    pub chained: usize,

    /// Blocks that did not fit.
    pub cache_full: usize,

    /// Cache invalidations and resizes.
    pub invalidations: usize,
}

impl GenStats {
    pub(crate) fn record_op(&mut self, op: MicroOp, len: usize) {
        self.ops += 1;
        self.code_bytes += len;
        *self.op_counts.entry(op).or_insert(0) += 1;
    }

    /// Emissions of the micro-op named `name`.
    pub fn op_count(&self, name: &str) -> usize {
        self.op_counts
            .iter()
            .filter(|(op, _)| op.to_string() == name)
            .map(|(_, count)| count)
            .sum()
    }
}

impl fmt::Display for GenStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Code Generation Statistics:")?;
        writeln!(f, "  Blocks: {}", self.blocks)?;
        writeln!(f, "  Micro-ops: {}", self.ops)?;
        writeln!(f, "  Code size: {} bytes", self.code_bytes)?;
        writeln!(
            f,
            "  Calls: {} direct, {} indirect",
            self.direct_calls, self.indirect_calls
        )?;
        writeln!(
            f,
            "  Jumps: {} direct, {} indirect",
            self.direct_jumps, self.indirect_jumps
        )?;
        writeln!(f, "  Chained jumps: {}", self.chained)?;
        writeln!(f, "  Cache full: {}", self.cache_full)?;
        writeln!(f, "  Invalidations: {}", self.invalidations)?;

        if !self.op_counts.is_empty() {
            writeln!(f, "  Micro-op breakdown:")?;
            let mut sorted: Vec<_> = self
                .op_counts
                .iter()
                .map(|(op, count)| (op.to_string(), *count))
                .collect();
            sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

            for (name, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", name, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ops_are_counted_by_kind() {
        let mut stats = GenStats::default();
        stats.record_op(MicroOp::MovA0Imm, 10);
        stats.record_op(MicroOp::MovA0Imm, 10);
        assert_eq!(stats.op_counts.get(&MicroOp::MovA0Imm), Some(&2));
        assert_eq!(stats.op_count("mov_ad_A0_im"), 2);
        assert_eq!(stats.op_count("jmp_slow"), 0);
        assert_eq!((stats.ops, stats.code_bytes), (2, 20));
        assert!(stats.to_string().contains("mov_ad_A0_im: 2"));
    }
}
