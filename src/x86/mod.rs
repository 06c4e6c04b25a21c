//! x86 template catalogs.
//!
//! - [`encoder`] - iced-x86 assembler wrapper that records fixups
//! - [`amd64`] - x86-64 System V templates
//! - [`i386`] - IA-32 cdecl templates

pub(crate) mod encoder;
pub mod amd64;
pub mod i386;

pub use amd64::Amd64Templates;
pub use i386::I386Templates;
