//! The ELF symbol database: defined and undefined function/variable
//! maps, alias chains, address maps (with ppc64 ELFv1 descriptor
//! indirection), name lookup through the hash sections, and the Linux
//! kernel `__ksymtab` export sets.

use std::collections::{BTreeMap, HashMap, HashSet};

use elf;
use elf::{Class, ElfFile, Section, VersymStatus};
use endianity::Endianity;
use parse::{Error, Result};
use parse::parse_u32;

/// Handle of a symbol in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// The type of an ELF symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    /// `STT_NOTYPE`.
    NoType,
    /// `STT_OBJECT`.
    Object,
    /// `STT_FUNC`.
    Func,
    /// `STT_SECTION`.
    Section,
    /// `STT_FILE`.
    File,
    /// `STT_COMMON`.
    Common,
    /// `STT_TLS`.
    Tls,
    /// `STT_GNU_IFUNC`.
    GnuIfunc,
}

impl SymbolType {
    fn from_raw(value: u8) -> SymbolType {
        match value {
            elf::STT_NOTYPE => SymbolType::NoType,
            elf::STT_OBJECT => SymbolType::Object,
            elf::STT_FUNC => SymbolType::Func,
            elf::STT_SECTION => SymbolType::Section,
            elf::STT_FILE => SymbolType::File,
            elf::STT_COMMON => SymbolType::Common,
            elf::STT_TLS => SymbolType::Tls,
            elf::STT_GNU_IFUNC => SymbolType::GnuIfunc,
            otherwise => {
                unreachable!("ELF symbol type {} outside the documented enumeration",
                             otherwise)
            }
        }
    }

    /// Whether symbols of this type describe code.
    pub fn is_function(self) -> bool {
        match self {
            SymbolType::Func | SymbolType::GnuIfunc => true,
            _ => false,
        }
    }

    /// Whether symbols of this type describe data.
    pub fn is_variable(self) -> bool {
        match self {
            SymbolType::Object | SymbolType::Common | SymbolType::Tls => true,
            _ => false,
        }
    }
}

/// The binding of an ELF symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    /// `STB_LOCAL`.
    Local,
    /// `STB_GLOBAL`.
    Global,
    /// `STB_WEAK`.
    Weak,
    /// `STB_GNU_UNIQUE`.
    GnuUnique,
}

impl SymbolBinding {
    fn from_raw(value: u8) -> SymbolBinding {
        match value {
            elf::STB_LOCAL => SymbolBinding::Local,
            elf::STB_GLOBAL => SymbolBinding::Global,
            elf::STB_WEAK => SymbolBinding::Weak,
            elf::STB_GNU_UNIQUE => SymbolBinding::GnuUnique,
            otherwise => {
                unreachable!("ELF symbol binding {} outside the documented enumeration",
                             otherwise)
            }
        }
    }
}

/// The visibility of an ELF symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolVisibility {
    /// `STV_DEFAULT`.
    Default,
    /// `STV_INTERNAL`.
    Internal,
    /// `STV_HIDDEN`.
    Hidden,
    /// `STV_PROTECTED`.
    Protected,
}

impl SymbolVisibility {
    fn from_raw(value: u8) -> SymbolVisibility {
        match value & 0x3 {
            0 => SymbolVisibility::Default,
            1 => SymbolVisibility::Internal,
            2 => SymbolVisibility::Hidden,
            _ => SymbolVisibility::Protected,
        }
    }
}

/// A symbol's version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolVersion {
    /// The version name.
    pub name: String,
    /// Whether this is the default version of the symbol.
    pub is_default: bool,
}

/// One symbol of the binary.
#[derive(Debug, Clone)]
pub struct ElfSymbol {
    /// The symbol's name.
    pub name: String,
    /// The symbol's type.
    pub sym_type: SymbolType,
    /// The symbol's binding.
    pub binding: SymbolBinding,
    /// The symbol's visibility.
    pub visibility: SymbolVisibility,
    /// Whether the symbol is defined in this binary.
    pub is_defined: bool,
    /// The symbol's version, when versioned.
    pub version: Option<SymbolVersion>,
    /// The entry-point address. On ppc64 ELFv1 function symbols this
    /// is the code address chased through `.opd`, not `st_value`.
    pub address: u64,
    /// The raw `st_value` when it designates an `.opd` descriptor.
    pub descriptor_address: Option<u64>,
    /// The symbol's size.
    pub size: u64,
    main: Option<SymbolId>,
    aliases: Vec<SymbolId>,
}

impl ElfSymbol {
    /// Whether this symbol should appear in the exported views:
    /// defined, non-local, with external visibility.
    fn is_export_candidate(&self) -> bool {
        self.is_defined && self.binding != SymbolBinding::Local &&
        match self.visibility {
            SymbolVisibility::Default | SymbolVisibility::Protected => true,
            _ => false,
        }
    }
}

/// The layout of a Linux kernel `__ksymtab` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KsymtabFormat {
    /// Two native-word-sized absolute addresses per entry (< 4.19).
    Pre419,
    /// Two 4-byte place-relative offsets per entry (>= 4.19).
    V419,
}

/// The symbol database of one binary.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<ElfSymbol>,
    symtab_section_index: usize,
    name_to_syms: HashMap<String, Vec<SymbolId>>,
    addr_to_sym: HashMap<u64, SymbolId>,
    desc_to_sym: HashMap<u64, SymbolId>,
    index_to_id: HashMap<usize, SymbolId>,
    defined_function_symbols: BTreeMap<String, SymbolId>,
    defined_variable_symbols: BTreeMap<String, SymbolId>,
    undefined_function_symbols: BTreeMap<String, SymbolId>,
    undefined_variable_symbols: BTreeMap<String, SymbolId>,
    ksymtab_format: Option<KsymtabFormat>,
    ksymtab_exported: Option<HashSet<u64>>,
}

impl SymbolTable {
    /// Load the symbol database from the binary's richest symbol
    /// table.
    pub fn load<'input, Endian>(elf: &ElfFile<'input, Endian>) -> Result<SymbolTable>
        where Endian: Endianity
    {
        let (section, section_index) = choose_symtab(elf)?;
        let mut table = SymbolTable::default();
        table.symtab_section_index = section_index;

        // The versym section runs parallel to the dynamic symbol
        // table; its slots mean nothing against a full symtab.
        let has_versions = section.sh_type == elf::SHT_DYNSYM;
        let uses_opd = elf.uses_opd();
        let count = elf.symbol_count(&section);
        for index in 1..count {
            let sym = match elf.symbol(&section, index) {
                Ok(sym) => sym,
                Err(_) => continue,
            };
            let sym_type = SymbolType::from_raw(sym.sym_type());
            match sym_type {
                SymbolType::Section | SymbolType::File => continue,
                _ => {}
            }

            let version = if has_versions {
                match elf::symbol_version(elf, index, sym.is_defined()) {
                    VersymStatus::Discard => continue,
                    VersymStatus::Version(name, is_default) => {
                        Some(SymbolVersion {
                            name: name.to_string(),
                            is_default: is_default,
                        })
                    }
                    VersymStatus::Unversioned | VersymStatus::Unknown => None,
                }
            } else {
                None
            };

            let is_defined = sym.is_defined();
            let (address, descriptor) = if uses_opd && sym_type.is_function() &&
                                           is_defined {
                match elf.opd_entry_point(sym.value) {
                    Some(entry) => (entry, Some(sym.value)),
                    None => (sym.value, None),
                }
            } else {
                (sym.value, None)
            };

            let id = SymbolId(table.symbols.len() as u32);
            table.symbols.push(ElfSymbol {
                name: sym.name.to_string(),
                sym_type: sym_type,
                binding: SymbolBinding::from_raw(sym.binding()),
                visibility: SymbolVisibility::from_raw(sym.visibility()),
                is_defined: is_defined,
                version: version,
                address: address,
                descriptor_address: descriptor,
                size: sym.size,
                main: None,
                aliases: Vec::new(),
            });
            table.index_to_id.insert(index, id);
            table.name_to_syms
                .entry(sym.name.to_string())
                .or_insert_with(Vec::new)
                .push(id);

            if is_defined {
                table.register_at_address(address, id);
                if let Some(descriptor) = descriptor {
                    table.desc_to_sym.entry(descriptor).or_insert(id);
                }
            }

            let name = sym.name.to_string();
            if table.symbols[id.0 as usize].is_export_candidate() {
                if sym_type.is_function() {
                    table.defined_function_symbols.entry(name).or_insert(id);
                } else if sym_type.is_variable() {
                    table.defined_variable_symbols.entry(name).or_insert(id);
                }
            } else if !is_defined {
                if sym_type.is_function() {
                    table.undefined_function_symbols.entry(name).or_insert(id);
                } else if sym_type.is_variable() {
                    table.undefined_variable_symbols.entry(name).or_insert(id);
                }
            }
        }

        Ok(table)
    }

    /// Register a defined symbol in the entry-point address map,
    /// chaining aliases and preferring "foo" over ".foo" as the
    /// canonical symbol of an address.
    fn register_at_address(&mut self, address: u64, id: SymbolId) {
        let existing = match self.addr_to_sym.get(&address) {
            Some(&existing) => existing,
            None => {
                self.addr_to_sym.insert(address, id);
                return;
            }
        };
        let main = self.main_symbol(existing);

        let main_is_dotted = self.symbols[main.0 as usize].name.starts_with('.');
        let new_is_dotted = self.symbols[id.0 as usize].name.starts_with('.');
        if main_is_dotted && !new_is_dotted {
            // The dotted symbol steps down to an alias.
            let old_aliases =
                ::std::mem::replace(&mut self.symbols[main.0 as usize].aliases,
                                    Vec::new());
            self.symbols[main.0 as usize].main = Some(id);
            for alias in &old_aliases {
                self.symbols[alias.0 as usize].main = Some(id);
            }
            {
                let new_main = &mut self.symbols[id.0 as usize];
                new_main.aliases = old_aliases;
                new_main.aliases.push(main);
            }
            self.addr_to_sym.insert(address, id);
        } else {
            self.symbols[id.0 as usize].main = Some(main);
            self.symbols[main.0 as usize].aliases.push(id);
        }
    }

    /// The symbol with the given handle.
    pub fn symbol(&self, id: SymbolId) -> &ElfSymbol {
        &self.symbols[id.0 as usize]
    }

    /// The number of symbols in the database.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The canonical symbol of `id`'s alias chain.
    pub fn main_symbol(&self, id: SymbolId) -> SymbolId {
        let mut current = id;
        while let Some(main) = self.symbols[current.0 as usize].main {
            current = main;
        }
        current
    }

    /// The names of the symbol and every alias of its chain.
    pub fn alias_names(&self, id: SymbolId) -> Vec<&str> {
        let main = self.main_symbol(id);
        let mut names = vec![&self.symbols[main.0 as usize].name[..]];
        for &alias in &self.symbols[main.0 as usize].aliases {
            names.push(&self.symbols[alias.0 as usize].name[..]);
        }
        names
    }

    /// The canonical symbol defined at the given entry-point address,
    /// falling back to the descriptor-address map.
    pub fn symbol_at_address(&self, address: u64) -> Option<SymbolId> {
        self.addr_to_sym
            .get(&address)
            .or_else(|| self.desc_to_sym.get(&address))
            .map(|&id| self.main_symbol(id))
    }

    /// All symbols with the given name.
    pub fn symbols_by_name(&self, name: &str) -> &[SymbolId] {
        self.name_to_syms.get(name).map(|v| &v[..]).unwrap_or(&[])
    }

    /// The id the raw symbol-table index maps to, when it survived
    /// loading.
    pub fn id_for_index(&self, index: usize) -> Option<SymbolId> {
        self.index_to_id.get(&index).cloned()
    }

    /// The section-header index the database was built from.
    pub fn symtab_section_index(&self) -> usize {
        self.symtab_section_index
    }

    /// The defined, exported function symbols, keyed by name.
    pub fn defined_function_symbols(&self) -> &BTreeMap<String, SymbolId> {
        &self.defined_function_symbols
    }

    /// The defined, exported variable symbols, keyed by name.
    pub fn defined_variable_symbols(&self) -> &BTreeMap<String, SymbolId> {
        &self.defined_variable_symbols
    }

    /// The undefined function symbols, keyed by name.
    pub fn undefined_function_symbols(&self) -> &BTreeMap<String, SymbolId> {
        &self.undefined_function_symbols
    }

    /// The undefined variable symbols, keyed by name.
    pub fn undefined_variable_symbols(&self) -> &BTreeMap<String, SymbolId> {
        &self.undefined_variable_symbols
    }

    /// The detected ksymtab layout, when a kernel export table was
    /// loaded.
    pub fn ksymtab_format(&self) -> Option<KsymtabFormat> {
        self.ksymtab_format
    }

    /// The kernel-exported entry-point addresses, when loaded.
    pub fn ksymtab_exported(&self) -> Option<&HashSet<u64>> {
        self.ksymtab_exported.as_ref()
    }

    /// Whether the symbol belongs to the exported view of the corpus,
    /// honouring the kernel export restriction when a ksymtab was
    /// loaded.
    pub fn is_exported(&self, id: SymbolId, kernel_mode: bool) -> bool {
        let symbol = &self.symbols[id.0 as usize];
        if !symbol.is_export_candidate() {
            return false;
        }
        if kernel_mode {
            if let Some(ref exported) = self.ksymtab_exported {
                return exported.contains(&symbol.address);
            }
        }
        true
    }

    /// Load the kernel export sets from `__ksymtab`/`__ksymtab_gpl`.
    ///
    /// The layout is detected by probing the first entry: the
    /// pre-4.19 interpretation is tried first and wins when both
    /// would resolve.
    pub fn load_ksymtab<'input, Endian>(&mut self,
                                        elf: &ElfFile<'input, Endian>)
                                        -> Result<()>
        where Endian: Endianity
    {
        let main = elf.section_by_name("__ksymtab").cloned();
        let gpl = elf.section_by_name("__ksymtab_gpl").cloned();
        let probe_section = match main.as_ref().or(gpl.as_ref()) {
            Some(section) => section.clone(),
            None => return Ok(()),
        };

        let format = self.probe_ksymtab_format(elf, &probe_section)?;

        let mut exported = HashSet::new();
        if let Some(section) = main {
            self.read_ksymtab_entries(elf, &section, format, &mut exported)?;
        }
        if let Some(section) = gpl {
            self.read_ksymtab_entries(elf, &section, format, &mut exported)?;
        }

        self.ksymtab_format = Some(format);
        self.ksymtab_exported = Some(exported);
        Ok(())
    }

    fn probe_ksymtab_format<'input, Endian>(&self,
                                            elf: &ElfFile<'input, Endian>,
                                            section: &Section<'input>)
                                            -> Result<KsymtabFormat>
        where Endian: Endianity
    {
        let class = elf.header().class;
        let data = elf.section_data(section);

        // Pre-4.19: the first native word is an absolute symbol
        // address.
        if let Ok((_, address)) = elf::parse_class_word(data, class) {
            if self.symbol_at_address(address).is_some() {
                return Ok(KsymtabFormat::Pre419);
            }
        }

        // >= 4.19: the first 4 bytes are a place-relative offset.
        if let Ok((_, stored)) = parse_u32(data) {
            let address = kernel_relative_address(class, section.addr, 0, stored as i32);
            if self.symbol_at_address(address).is_some() {
                return Ok(KsymtabFormat::V419);
            }
        }

        Err(Error::UnsupportedKsymtabFormat)
    }

    fn read_ksymtab_entries<'input, Endian>(&self,
                                            elf: &ElfFile<'input, Endian>,
                                            section: &Section<'input>,
                                            format: KsymtabFormat,
                                            exported: &mut HashSet<u64>)
                                            -> Result<()>
        where Endian: Endianity
    {
        let class = elf.header().class;
        let data = elf.section_data(section);
        let entry_size = match format {
            KsymtabFormat::Pre419 => class.word_size() * 2,
            KsymtabFormat::V419 => 8,
        };

        let mut offset = 0;
        while offset + entry_size <= data.len() {
            let address = match format {
                KsymtabFormat::Pre419 => {
                    let (_, address) =
                        elf::parse_class_word(data.range_from(offset..), class)?;
                    address
                }
                KsymtabFormat::V419 => {
                    let (_, stored) = parse_u32(data.range_from(offset..))?;
                    kernel_relative_address(class,
                                            section.addr,
                                            offset as u64,
                                            stored as i32)
                }
            };
            exported.insert(address);
            offset += entry_size;
        }
        Ok(())
    }
}

/// Pick the symbol table to load: `SYMTAB` for relocatable and
/// executable files, `DYNSYM` otherwise, and the richer of the two
/// when both are present.
fn choose_symtab<'a, 'input, Endian>(elf: &'a ElfFile<'input, Endian>)
                                     -> Result<(Section<'input>, usize)>
    where Endian: Endianity
{
    let symtab = elf.sections()
        .iter()
        .position(|s| s.sh_type == elf::SHT_SYMTAB);
    let dynsym = elf.sections()
        .iter()
        .position(|s| s.sh_type == elf::SHT_DYNSYM);

    let index = match (symtab, dynsym) {
        (Some(s), Some(d)) => {
            let s_count = elf.symbol_count(&elf.sections()[s]);
            let d_count = elf.symbol_count(&elf.sections()[d]);
            if d_count > s_count { d } else { s }
        }
        (Some(s), None) => s,
        (None, Some(d)) => d,
        (None, None) => return Err(Error::NoSymbolsFound),
    };
    Ok((elf.sections()[index].clone(), index))
}

/// Resolve a >= 4.19 place-relative ksymtab offset to the address
/// kernel symbols are reported at: on 64-bit, the 32-bit sum is
/// widened with an all-ones top half.
fn kernel_relative_address(class: Class, base: u64, offset: u64, stored: i32) -> u64 {
    let address = base.wrapping_add(offset).wrapping_add(stored as i64 as u64);
    match class {
        Class::Elf32 => address & 0xffff_ffff,
        Class::Elf64 => (address & 0xffff_ffff) | 0xffff_ffff_0000_0000,
    }
}

/// Look a symbol up by name through the file's hash sections when
/// present: the GNU hash's bloom filter first, the classic SysV
/// bucket/chain otherwise, falling back to the loaded name map.
pub fn lookup_symbol_by_name<'input, Endian>(elf: &ElfFile<'input, Endian>,
                                             table: &SymbolTable,
                                             name: &str)
                                             -> Option<SymbolId>
    where Endian: Endianity
{
    let class = elf.header().class;

    if let Some(hash_section) = elf.section_by_type(elf::SHT_GNU_HASH) {
        if hash_section.link as usize == table.symtab_section_index() {
            let symtab = elf.sections()[hash_section.link as usize].clone();
            let data = elf.section_data(hash_section);
            let found = elf::gnu_hash_lookup(data, class, name, |index| {
                elf.symbol(&symtab, index)
                    .map(|sym| sym.name == name)
                    .unwrap_or(false)
            });
            if let Ok(Some(index)) = found {
                return table.id_for_index(index);
            }
            return None;
        }
    }

    if let Some(hash_section) = elf.section_by_type(elf::SHT_HASH) {
        if hash_section.link as usize == table.symtab_section_index() {
            let symtab = elf.sections()[hash_section.link as usize].clone();
            let data = elf.section_data(hash_section);
            let found = elf::sysv_hash_lookup(data, name, |index| {
                elf.symbol(&symtab, index)
                    .map(|sym| sym.name == name)
                    .unwrap_or(false)
            });
            if let Ok(Some(index)) = found {
                return table.id_for_index(index);
            }
            return None;
        }
    }

    table.symbols_by_name(name).first().cloned()
}
