//! Template catalog inspector.
//!
//! Lists, disassembles or exports the templates of one architecture.

use clap::{Parser, ValueEnum};
use dyngen::catalog::{Arch, Catalog, MicroOp};
use dyngen::dump;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArchArg {
    X86,
    #[value(name = "x86-64")]
    X86_64,
    Ppc,
}

impl From<ArchArg> for Arch {
    fn from(arch: ArchArg) -> Self {
        match arch {
            ArchArg::X86 => Arch::X86,
            ArchArg::X86_64 => Arch::X86_64,
            ArchArg::Ppc => Arch::PowerPc,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "dyngen-dump", about = "Inspect dyngen instruction templates")]
struct Args {
    /// Target architecture; defaults to the host.
    #[arg(long, value_enum)]
    arch: Option<ArchArg>,

    /// List every template with its length and fixup count.
    #[arg(long)]
    list: bool,

    /// Disassemble every template and the trampoline.
    #[arg(long)]
    disasm: bool,

    /// Disassemble one template by name, e.g. `add_32_T0_im`.
    #[arg(long, value_name = "NAME")]
    op: Option<String>,

    /// Write the catalog as an ELF relocatable object.
    #[arg(long, value_name = "PATH")]
    elf: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let arch = args
        .arch
        .map(Arch::from)
        .or_else(Arch::host)
        .unwrap_or(Arch::X86_64);
    let catalog = Catalog::build(arch)?;

    if let Some(name) = &args.op {
        let Some(op) = MicroOp::from_name(name) else {
            eprintln!("Error: unknown micro-op {name}");
            std::process::exit(1);
        };
        print!("{}", dump::describe(&catalog, op));
    }

    if args.disasm {
        print!("{}", dump::describe_trampoline(&catalog));
        for (op, _) in catalog.iter() {
            print!("{}", dump::describe(&catalog, op));
        }
    }

    if let Some(path) = &args.elf {
        let object = dump::elf_object(&catalog)?;
        fs::write(path, &object)?;
        log::info!("wrote {} bytes to {}", object.len(), path.display());
    }

    if args.list || (args.op.is_none() && !args.disasm && args.elf.is_none()) {
        print!("{}", dump::listing(&catalog));
    }
    Ok(())
}
