use dyngen::dump::{self, SYMBOL_PREFIX};
use dyngen::{Arch, Catalog};
use object::{Architecture, File, Object, ObjectSection, ObjectSymbol};

#[test]
fn every_template_is_a_symbol() {
    for arch in Arch::ALL {
        let catalog = Catalog::build(arch).unwrap();
        let elf = dump::elf_object(&catalog).unwrap();
        let file = File::parse(&*elf).unwrap();

        let expected = match arch {
            Arch::X86 => Architecture::I386,
            Arch::X86_64 => Architecture::X86_64,
            Arch::PowerPc => Architecture::PowerPc,
        };
        assert_eq!(file.architecture(), expected);
        assert_eq!(file.is_little_endian(), !arch.is_big_endian());

        let text = file.section_by_name(".text").unwrap();
        let data = text.data().unwrap();

        for (op, template) in catalog.iter() {
            let name = format!("{SYMBOL_PREFIX}{op}");
            let symbol = file
                .symbol_by_name(&name)
                .unwrap_or_else(|| panic!("{arch}: missing {name}"));
            assert_eq!(symbol.size() as usize, template.len(), "{name}");
            let at = symbol.address() as usize;
            assert_eq!(&data[at..at + template.len()], template.bytes(), "{name}");
        }

        let trampoline = catalog.trampoline();
        let execute = file.symbol_by_name("op_execute").unwrap();
        let exit = file.symbol_by_name("op_exec_return").unwrap();
        assert_eq!(execute.size() as usize, trampoline.template.len());
        assert_eq!(exit.address(), execute.address() + trampoline.epilogue as u64);
    }
}

#[test]
fn listing_and_disassembly_agree_with_the_catalog() {
    let catalog = Catalog::build(Arch::X86_64).unwrap();
    let listing = dump::listing(&catalog);
    for (op, _) in catalog.iter() {
        assert!(listing.contains(&format!(" {op} ")), "{op}");
    }

    let text = dump::describe_trampoline(&catalog);
    assert!(text.contains("ret"), "{text}");
    assert!(text.contains("context.T0"), "{text}");
}
