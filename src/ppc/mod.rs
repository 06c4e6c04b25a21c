//! PowerPC template catalog.

pub mod encoder;
pub mod templates;

pub use templates::PpcTemplates;
