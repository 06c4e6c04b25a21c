// This module holds the instruction template catalog. For each supported host
// architecture a TemplateSource turns every micro-op into a literal byte sequence plus
// the list of fixups that must be patched when the bytes are copied into the cache, and
// produces the execution trampoline. Catalog::build runs the right source once, checks
// that every micro-op is covered and that short call/jump templates carry a relative
// field, and from then on serves templates by lookup.

//! Instruction template catalog.
//!
//! - [`micro_op`] - the micro-op vocabulary
//! - [`fixup`] - patch sites and field encodings

pub mod fixup;
pub mod micro_op;

pub use fixup::{displacement, Field, Fixup, FixupKind, Source};
pub use micro_op::{
    AddrMode, BinOp, Extension, Form, Helper, LogicOp, MicroOp, ShiftOp, Step, VReg, Width,
};

use crate::core::error::CatalogError;
use hashbrown::HashMap;
use std::fmt;

/// Host architectures with a template catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    /// IA-32, cdecl.
    X86,
    /// x86-64, System V.
    X86_64,
    /// 32-bit PowerPC, System V.
    PowerPc,
}

impl Arch {
    pub const ALL: [Arch; 3] = [Arch::X86, Arch::X86_64, Arch::PowerPc];

    /// The architecture generated code can execute on in this process.
    pub fn host() -> Option<Arch> {
        if cfg!(all(target_arch = "x86_64", unix)) {
            Some(Arch::X86_64)
        } else if cfg!(all(target_arch = "x86", unix)) {
            Some(Arch::X86)
        } else if cfg!(all(target_arch = "powerpc", unix)) {
            Some(Arch::PowerPc)
        } else {
            None
        }
    }

    pub fn pointer_width(self) -> usize {
        match self {
            Arch::X86 | Arch::PowerPc => 4,
            Arch::X86_64 => 8,
        }
    }

    pub fn is_big_endian(self) -> bool {
        self == Arch::PowerPc
    }

    /// Byte used to pad alignment gaps.
    pub fn fill_byte(self) -> u8 {
        match self {
            Arch::X86 | Arch::X86_64 => 0xcc,
            Arch::PowerPc => 0x00,
        }
    }

    /// Largest cache whose every block reaches the epilogue with a short branch.
    pub fn max_cache_bytes(self) -> Option<usize> {
        match self {
            Arch::X86 => None,
            Arch::X86_64 => Some(1 << 30),
            Arch::PowerPc => Some(32 << 20),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86-64",
            Arch::PowerPc => "ppc",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Literal machine code for one micro-op with its patch sites.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    bytes: Vec<u8>,
    fixups: Vec<Fixup>,
}

impl Template {
    pub fn new(bytes: Vec<u8>, fixups: Vec<Fixup>) -> Self {
        Self { bytes, fixups }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn fixups(&self) -> &[Fixup] {
        &self.fixups
    }

    /// The relative field holding parameter 0, for short calls and jumps.
    pub fn relative_fixup(&self) -> Option<&Fixup> {
        self.fixups
            .iter()
            .find(|f| f.kind == FixupKind::PcRelative && f.source == Source::Param(0))
    }
}

/// Shared entry/exit code placed at the cache base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trampoline {
    pub template: Template,
    /// Offset of the exit sequence from the trampoline start.
    pub epilogue: usize,
}

/// Produces templates for one architecture.
pub trait TemplateSource {
    fn arch(&self) -> Arch;

    fn template(&self, op: MicroOp) -> Result<Template, CatalogError>;

    fn trampoline(&self) -> Result<Trampoline, CatalogError>;
}

/// Templates for every micro-op of one architecture.
#[derive(Debug, Clone)]
pub struct Catalog {
    arch: Arch,
    order: Vec<MicroOp>,
    templates: HashMap<MicroOp, Template>,
    trampoline: Trampoline,
}

impl Catalog {
    /// Build the catalog for `arch`.
    pub fn build(arch: Arch) -> Result<Self, CatalogError> {
        match arch {
            Arch::X86 => Self::from_source(&crate::x86::I386Templates),
            Arch::X86_64 => Self::from_source(&crate::x86::Amd64Templates),
            Arch::PowerPc => Self::from_source(&crate::ppc::PpcTemplates),
        }
    }

    pub fn from_source(source: &dyn TemplateSource) -> Result<Self, CatalogError> {
        let order = MicroOp::all();
        let mut templates = HashMap::with_capacity(order.len());

        for &op in &order {
            let template = source.template(op)?;
            if needs_relative(op) && template.relative_fixup().is_none() {
                return Err(CatalogError::MissingRelative { op: op.to_string() });
            }
            templates.insert(op, template);
        }

        let trampoline = source.trampoline()?;
        log::debug!(
            "{} catalog: {} templates, trampoline {} bytes",
            source.arch(),
            templates.len(),
            trampoline.template.len()
        );

        Ok(Self {
            arch: source.arch(),
            order,
            templates,
            trampoline,
        })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Template of `op`. Every micro-op is present once the catalog is built.
    pub fn template(&self, op: MicroOp) -> &Template {
        &self.templates[&op]
    }

    pub fn get(&self, op: MicroOp) -> Option<&Template> {
        self.templates.get(&op)
    }

    pub fn trampoline(&self) -> &Trampoline {
        &self.trampoline
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Templates in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (MicroOp, &Template)> + '_ {
        self.order.iter().map(move |&op| (op, &self.templates[&op]))
    }
}

fn needs_relative(op: MicroOp) -> bool {
    matches!(
        op,
        MicroOp::Invoke(_, Form::Short)
            | MicroOp::Jump(Form::Short)
            | MicroOp::ChainJump
            | MicroOp::ChainJumpIfT0
    )
}
