//! Test utilities for generator-based tests.
//!
//! Unit tests across the crate build small generators for every architecture
//! and fill blocks without caring about execution.

#[cfg(test)]
pub mod test {
    use crate::catalog::Arch;
    use crate::codegen::{CodeGenerator, GeneratorOptions};

    /// Cache size used by unit tests, in KB.
    pub const SMALL_CACHE_KB: u32 = 64;

    /// A generator for `arch` with a small cache.
    pub fn small_generator(arch: Arch) -> CodeGenerator {
        let options = GeneratorOptions::for_arch(arch).with_cache_size(SMALL_CACHE_KB);
        CodeGenerator::new(options).expect("failed to create test generator")
    }

    /// Run `f` against an open block and close it, returning the block length.
    pub fn with_block<F>(arch: Arch, f: F) -> usize
    where
        F: FnOnce(&mut CodeGenerator),
    {
        let mut gen = small_generator(arch);
        gen.gen_start();
        f(&mut gen);
        let len = gen.block_len();
        assert!(gen.gen_end(), "test block overflowed the cache");
        len
    }
}
