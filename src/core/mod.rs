// This module gathers the infrastructure shared by every code generator flavour: page
// regions and icache maintenance, the translation cache and the constant data pool built on
// them, the emulated address window and CPU context layout that templates embed, JIT
// preferences, generation statistics and the error types. Nothing here knows about
// particular micro-ops or host instruction sets.

//! Core dyngen infrastructure.
//!
//! # Key Components
//!
//! ## Memory (`memory`, `cache`, `data_pool`)
//! - Anonymous page regions, optionally below 4 GiB
//! - Bump-allocated read-write-execute translation cache
//! - Append-only constant pool for data referenced by generated code
//!
//! ## Machine model (`window`, `context`)
//! - Emulated-to-host address mapping
//! - Offsets of the virtual registers in the CPU context
//!
//! ## Ambient (`config`, `stats`, `error`)
//! - JIT preferences from key/value pairs or the environment
//! - Code generation counters
//! - `thiserror` error types

pub mod cache;
pub mod config;
pub mod context;
pub mod data_pool;
pub mod error;
pub mod memory;
pub mod stats;
pub mod test_utils;
pub mod window;

pub use cache::TranslationCache;
pub use config::JitConfig;
pub use context::{ContextField, ContextLayout, VirtualRegisters};
pub use data_pool::DataPool;
pub use error::{CatalogError, ConfigError, JitError, JitResult};
pub use memory::{PageRegion, Placement, Protection};
pub use stats::GenStats;
pub use window::{AddressWindow, WindowField};
