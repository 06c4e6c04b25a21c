// This module defines error types for the dyngen code generator using the thiserror crate.
// JitError covers the recoverable failures of the generator: reserving or protecting the
// translation cache, using a generator whose cache is not allocated, stale block handles
// after an invalidation or resize, executing code generated for a foreign architecture,
// and chain targets outside the short branch range. CatalogError covers failures while
// building the template tables, and ConfigError covers preference parsing. Cache
// exhaustion is deliberately not an error: it is reported by gen_end as a boolean.

//! Error types for dyngen.

use crate::catalog::Arch;
use thiserror::Error;

/// Main error type for the code generator.
#[derive(Error, Debug)]
pub enum JitError {
    #[error("failed to reserve {size} bytes of memory: {source}")]
    Reserve {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to make {size} bytes executable: {source}")]
    Protect {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("translation cache of {size_kb} KB does not fit the address space")]
    CacheSize { size_kb: u32 },

    #[error("translation cache is not allocated")]
    NoCache,

    #[error("block at offset {offset:#x} lies past the end of the {size:#x}-byte cache")]
    EntryPastEnd { offset: usize, size: usize },

    #[error("block handle from epoch {handle} is stale (cache epoch is {current})")]
    StaleBlock { handle: u64, current: u64 },

    #[error("code generated for {target} cannot run on this host")]
    ForeignArch { target: Arch },

    #[error("chain target {target:#x} is out of range of the jump at {site:#x}")]
    ChainOutOfRange { site: usize, target: usize },

    #[error("context offset {offset} for {register} does not fit the {arch} displacement field")]
    Layout {
        register: &'static str,
        offset: i32,
        arch: Arch,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors raised while building a template catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("assembler rejected template: {0}")]
    Iced(#[from] iced_x86::IcedError),

    #[error("fixup of {op} at offset {offset} does not cover its placeholder")]
    FixupMismatch { op: String, offset: usize },

    #[error("template for {op} has no relative field")]
    MissingRelative { op: String },
}

/// Errors raised while parsing JIT preferences.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for preference {key}")]
    InvalidValue { key: String, value: String },

    #[error("unknown preference {0}")]
    UnknownKey(String),
}

/// Result type alias for generator operations.
pub type JitResult<T> = Result<T, JitError>;
