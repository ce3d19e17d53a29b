//! Hand-parsed ELF: file header, section headers, symbol-table
//! entries, the dynamic section, hash tables and versioning sections.
//!
//! Only the pieces the symbol resolver needs are modelled; anything
//! else in the file is skipped over by offset arithmetic.

#![allow(missing_docs)]

use endianity::{Endianity, EndianBuf};
use parse::{Error, Result};
use parse::{parse_null_terminated_string, parse_u16, parse_u32, parse_u64,
            parse_u8, take};

pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const ELFDATA2MSB: u8 = 2;

pub const ET_REL: u16 = 1;
pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;

pub const EM_386: u16 = 3;
pub const EM_MIPS: u16 = 8;
pub const EM_PPC: u16 = 20;
pub const EM_PPC64: u16 = 21;
pub const EM_S390: u16 = 22;
pub const EM_ARM: u16 = 40;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;
pub const EM_RISCV: u16 = 243;

pub const SHT_NULL: u32 = 0;
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_SYMTAB: u32 = 2;
pub const SHT_STRTAB: u32 = 3;
pub const SHT_HASH: u32 = 5;
pub const SHT_DYNAMIC: u32 = 6;
pub const SHT_NOBITS: u32 = 8;
pub const SHT_DYNSYM: u32 = 11;
pub const SHT_GNU_HASH: u32 = 0x6fff_fff6;
pub const SHT_GNU_VERDEF: u32 = 0x6fff_fffd;
pub const SHT_GNU_VERNEED: u32 = 0x6fff_fffe;
pub const SHT_GNU_VERSYM: u32 = 0x6fff_ffff;

pub const SHN_UNDEF: u16 = 0;
pub const SHN_ABS: u16 = 0xfff1;
pub const SHN_COMMON: u16 = 0xfff2;

pub const DT_NULL: i64 = 0;
pub const DT_NEEDED: i64 = 1;
pub const DT_SONAME: i64 = 14;

pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;
pub const STT_SECTION: u8 = 3;
pub const STT_FILE: u8 = 4;
pub const STT_COMMON: u8 = 5;
pub const STT_TLS: u8 = 6;
pub const STT_GNU_IFUNC: u8 = 10;

pub const STB_LOCAL: u8 = 0;
pub const STB_GLOBAL: u8 = 1;
pub const STB_WEAK: u8 = 2;
pub const STB_GNU_UNIQUE: u8 = 10;

pub const VER_NDX_LOCAL: u16 = 0;
pub const VER_NDX_GLOBAL: u16 = 1;
pub const VER_NDX_ELIMINATE: u16 = 0x8001;
pub const VER_FLG_BASE: u16 = 0x1;

/// Whether the file is 32- or 64-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    /// The native word size in bytes.
    pub fn word_size(self) -> usize {
        match self {
            Class::Elf32 => 4,
            Class::Elf64 => 8,
        }
    }

    /// The size of one symbol-table entry.
    pub fn sym_entry_size(self) -> usize {
        match self {
            Class::Elf32 => 16,
            Class::Elf64 => 24,
        }
    }
}

/// Inspect an ELF identification header without committing to an
/// endianity, so the caller can pick the right type parameter.
pub fn elf_ident(bytes: &[u8]) -> Result<(Class, bool)> {
    if bytes.len() < 16 || bytes[0..4] != b"\x7fELF"[..] {
        return Err(Error::NotAnElfFile);
    }
    let class = match bytes[4] {
        ELFCLASS32 => Class::Elf32,
        ELFCLASS64 => Class::Elf64,
        otherwise => return Err(Error::UnsupportedElfClass(otherwise)),
    };
    let big_endian = match bytes[5] {
        ELFDATA2LSB => false,
        ELFDATA2MSB => true,
        otherwise => return Err(Error::UnsupportedElfEncoding(otherwise)),
    };
    Ok((class, big_endian))
}

/// The fields of the file header this crate reads.
#[derive(Debug, Clone, Copy)]
pub struct ElfHeader {
    pub class: Class,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_flags: u32,
    pub e_shoff: u64,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

/// One section header, with its name already resolved.
#[derive(Debug, Clone)]
pub struct Section<'input> {
    pub name: &'input str,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub entsize: u64,
}

/// One symbol-table entry, with its name already resolved.
#[derive(Debug, Clone)]
pub struct Sym<'input> {
    pub name: &'input str,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

impl<'input> Sym<'input> {
    /// The symbol's type nibble.
    pub fn sym_type(&self) -> u8 {
        self.info & 0xf
    }

    /// The symbol's binding nibble.
    pub fn binding(&self) -> u8 {
        self.info >> 4
    }

    /// The symbol's visibility.
    pub fn visibility(&self) -> u8 {
        self.other & 0x3
    }

    /// Whether this symbol is defined in the file.
    pub fn is_defined(&self) -> bool {
        self.shndx != SHN_UNDEF
    }
}

/// A parsed ELF file.
#[derive(Debug)]
pub struct ElfFile<'input, Endian>
    where Endian: Endianity
{
    data: EndianBuf<'input, Endian>,
    header: ElfHeader,
    sections: Vec<Section<'input>>,
}

impl<'input, Endian> ElfFile<'input, Endian>
    where Endian: Endianity
{
    /// Parse the file header and section-header table.
    pub fn parse(data: EndianBuf<'input, Endian>) -> Result<ElfFile<'input, Endian>> {
        let (class, big_endian) = elf_ident(&data)?;
        if big_endian != Endian::is_big_endian() {
            return Err(Error::UnsupportedElfEncoding(data[5]));
        }

        let input = data.range_from(16..);
        let (input, e_type) = parse_u16(input)?;
        let (input, e_machine) = parse_u16(input)?;
        let (input, _version) = parse_u32(input)?;
        let (input, _entry) = parse_class_word(input, class)?;
        let (input, _phoff) = parse_class_word(input, class)?;
        let (input, e_shoff) = parse_class_word(input, class)?;
        let (input, e_flags) = parse_u32(input)?;
        let (input, _ehsize) = parse_u16(input)?;
        let (input, _phentsize) = parse_u16(input)?;
        let (input, _phnum) = parse_u16(input)?;
        let (input, e_shentsize) = parse_u16(input)?;
        let (input, e_shnum) = parse_u16(input)?;
        let (_, e_shstrndx) = parse_u16(input)?;

        let header = ElfHeader {
            class: class,
            e_type: e_type,
            e_machine: e_machine,
            e_flags: e_flags,
            e_shoff: e_shoff,
            e_shentsize: e_shentsize,
            e_shnum: e_shnum,
            e_shstrndx: e_shstrndx,
        };

        let mut raw_sections = Vec::with_capacity(e_shnum as usize);
        for i in 0..e_shnum as usize {
            let offset = e_shoff as usize + i * e_shentsize as usize;
            if offset + e_shentsize as usize > data.len() {
                return Err(Error::UnexpectedEof);
            }
            raw_sections.push(parse_section_header(data.range_from(offset..), class)?);
        }

        // Resolve section names through the section-name string table.
        let shstrtab = raw_sections
            .get(header.e_shstrndx as usize)
            .map(|s| (s.1.offset as usize, s.1.size as usize));
        if let Some((offset, size)) = shstrtab {
            if offset + size > data.len() {
                return Err(Error::BadSectionName);
            }
        }
        let mut sections = Vec::with_capacity(raw_sections.len());
        for (name_offset, mut section) in raw_sections {
            section.name = match shstrtab {
                Some((offset, size)) if (name_offset as usize) < size => {
                    let table = data.range(offset..offset + size);
                    parse_null_terminated_string(table.range_from(name_offset as usize..))
                        .map(|(_, s)| s)
                        .map_err(|_| Error::BadSectionName)?
                }
                Some(_) => return Err(Error::BadSectionName),
                None => "",
            };
            sections.push(section);
        }

        Ok(ElfFile {
            data: data,
            header: header,
            sections: sections,
        })
    }

    /// The parsed file header.
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// All section headers, including the null section.
    pub fn sections(&self) -> &[Section<'input>] {
        &self.sections
    }

    /// Find a section by name.
    pub fn section_by_name(&self, name: &str) -> Option<&Section<'input>> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Find the first section with the given type.
    pub fn section_by_type(&self, sh_type: u32) -> Option<&Section<'input>> {
        self.sections.iter().find(|s| s.sh_type == sh_type)
    }

    /// The contents of a section; `SHT_NOBITS` yields an empty buffer.
    pub fn section_data(&self, section: &Section) -> EndianBuf<'input, Endian> {
        if section.sh_type == SHT_NOBITS {
            return self.data.range_to(..0);
        }
        let start = section.offset as usize;
        let end = start + section.size as usize;
        if end > self.data.len() || start > end {
            return self.data.range_to(..0);
        }
        self.data.range(start..end)
    }

    /// The number of entries in a symbol-table section.
    pub fn symbol_count(&self, section: &Section) -> usize {
        let entsize = if section.entsize != 0 {
            section.entsize as usize
        } else {
            self.header.class.sym_entry_size()
        };
        self.section_data(section).len() / entsize
    }

    /// The `index`th symbol of a symbol-table section, with its name
    /// resolved through the linked string table.
    pub fn symbol(&self, section: &Section, index: usize) -> Result<Sym<'input>> {
        let entsize = if section.entsize != 0 {
            section.entsize as usize
        } else {
            self.header.class.sym_entry_size()
        };
        let data = self.section_data(section);
        let start = index * entsize;
        if start + entsize > data.len() {
            return Err(Error::UnexpectedEof);
        }
        let (_, entry) = take(entsize, data.range_from(start..))?;

        let (name_offset, info, other, shndx, value, size) = match self.header.class {
            Class::Elf32 => {
                let (rest, name) = parse_u32(entry)?;
                let (rest, value) = parse_u32(rest)?;
                let (rest, size) = parse_u32(rest)?;
                let (rest, info) = parse_u8(rest)?;
                let (rest, other) = parse_u8(rest)?;
                let (_, shndx) = parse_u16(rest)?;
                (name, info, other, shndx, value as u64, size as u64)
            }
            Class::Elf64 => {
                let (rest, name) = parse_u32(entry)?;
                let (rest, info) = parse_u8(rest)?;
                let (rest, other) = parse_u8(rest)?;
                let (rest, shndx) = parse_u16(rest)?;
                let (rest, value) = parse_u64(rest)?;
                let (_, size) = parse_u64(rest)?;
                (name, info, other, shndx, value, size)
            }
        };

        let strtab = self.sections
            .get(section.link as usize)
            .ok_or(Error::BadSymbolName)?;
        let name = if name_offset == 0 {
            ""
        } else {
            let strtab_data = self.section_data(strtab);
            if name_offset as usize >= strtab_data.len() {
                return Err(Error::BadSymbolName);
            }
            parse_null_terminated_string(strtab_data.range_from(name_offset as usize..))
                .map(|(_, s)| s)
                .map_err(|_| Error::BadSymbolName)?
        };

        Ok(Sym {
            name: name,
            info: info,
            other: other,
            shndx: shndx,
            value: value,
            size: size,
        })
    }

    /// The `.dynamic` entries, as `(tag, value)` pairs.
    pub fn dynamic_entries(&self) -> Vec<(i64, u64)> {
        let mut entries = Vec::new();
        let section = match self.section_by_type(SHT_DYNAMIC) {
            Some(section) => section.clone(),
            None => return entries,
        };
        let mut data = self.section_data(&section);
        while !data.is_empty() {
            let parsed = (|| -> Result<_> {
                let (rest, tag) = parse_class_word(data, self.header.class)?;
                let (rest, value) = parse_class_word(rest, self.header.class)?;
                Ok((rest, tag as i64, value))
            })();
            match parsed {
                Ok((rest, tag, value)) => {
                    if tag == DT_NULL {
                        break;
                    }
                    entries.push((tag, value));
                    data = rest;
                }
                Err(_) => break,
            }
        }
        entries
    }

    fn dynstr_lookup(&self, offset: u64) -> Option<&'input str> {
        let dynstr = self.section_by_name(".dynstr")?;
        let data = self.section_data(dynstr);
        if offset as usize >= data.len() {
            return None;
        }
        parse_null_terminated_string(data.range_from(offset as usize..))
            .ok()
            .map(|(_, s)| s)
    }

    /// The file's `DT_SONAME`, when present.
    pub fn soname(&self) -> Option<&'input str> {
        self.dynamic_entries()
            .iter()
            .find(|&&(tag, _)| tag == DT_SONAME)
            .and_then(|&(_, value)| self.dynstr_lookup(value))
    }

    /// The file's `DT_NEEDED` list, in table order.
    pub fn needed(&self) -> Vec<&'input str> {
        self.dynamic_entries()
            .iter()
            .filter(|&&(tag, _)| tag == DT_NEEDED)
            .filter_map(|&(_, value)| self.dynstr_lookup(value))
            .collect()
    }

    /// A human-readable architecture name derived from `e_machine`.
    pub fn architecture(&self) -> String {
        match self.header.e_machine {
            EM_386 => "elf-i386".to_string(),
            EM_MIPS => "elf-mips".to_string(),
            EM_PPC => "elf-ppc".to_string(),
            EM_PPC64 => "elf-ppc64".to_string(),
            EM_S390 => "elf-s390".to_string(),
            EM_ARM => "elf-arm".to_string(),
            EM_X86_64 => "elf-x86_64".to_string(),
            EM_AARCH64 => "elf-aarch64".to_string(),
            EM_RISCV => "elf-riscv".to_string(),
            otherwise => format!("elf-machine-{}", otherwise),
        }
    }

    /// Whether function symbols address `.opd` descriptors instead of
    /// code (ppc64 ELFv1).
    pub fn uses_opd(&self) -> bool {
        self.header.e_machine == EM_PPC64 && self.section_by_name(".opd").is_some()
    }

    /// Chase a ppc64 ELFv1 function descriptor: the entry point is the
    /// first machine word of the `.opd` entry at `descriptor_addr`.
    pub fn opd_entry_point(&self, descriptor_addr: u64) -> Option<u64> {
        let opd = self.section_by_name(".opd")?;
        if descriptor_addr < opd.addr || descriptor_addr >= opd.addr + opd.size {
            return None;
        }
        let offset = (descriptor_addr - opd.addr) as usize;
        let data = self.section_data(opd);
        parse_class_word(data.range_from(offset..), self.header.class)
            .ok()
            .map(|(_, word)| word)
    }
}

/// Parse a class-sized word: 4 bytes for ELFCLASS32, 8 for ELFCLASS64.
pub fn parse_class_word<Endian>(input: EndianBuf<Endian>,
                                class: Class)
                                -> Result<(EndianBuf<Endian>, u64)>
    where Endian: Endianity
{
    match class {
        Class::Elf32 => {
            let (rest, value) = parse_u32(input)?;
            Ok((rest, value as u64))
        }
        Class::Elf64 => parse_u64(input),
    }
}

fn parse_section_header<'input, Endian>(input: EndianBuf<'input, Endian>,
                                        class: Class)
                                        -> Result<(u32, Section<'input>)>
    where Endian: Endianity
{
    let (input, name_offset) = parse_u32(input)?;
    let (input, sh_type) = parse_u32(input)?;
    let (input, flags) = parse_class_word(input, class)?;
    let (input, addr) = parse_class_word(input, class)?;
    let (input, offset) = parse_class_word(input, class)?;
    let (input, size) = parse_class_word(input, class)?;
    let (input, link) = parse_u32(input)?;
    let (input, info) = parse_u32(input)?;
    let (input, _addralign) = parse_class_word(input, class)?;
    let (_, entsize) = parse_class_word(input, class)?;

    Ok((name_offset,
        Section {
            name: "",
            sh_type: sh_type,
            flags: flags,
            addr: addr,
            offset: offset,
            size: size,
            link: link,
            info: info,
            entsize: entsize,
        }))
}

/// The classic SysV ELF hash function.
pub fn elf_hash(name: &str) -> u32 {
    let mut h: u32 = 0;
    for &byte in name.as_bytes() {
        h = (h << 4).wrapping_add(byte as u32);
        let g = h & 0xf000_0000;
        if g != 0 {
            h ^= g >> 24;
        }
        h &= !g;
    }
    h
}

/// The GNU (djb2-derived) ELF hash function.
pub fn gnu_hash(name: &str) -> u32 {
    let mut h: u32 = 5381;
    for &byte in name.as_bytes() {
        h = h.wrapping_mul(33).wrapping_add(byte as u32);
    }
    h
}

/// Look a symbol index up through a `SHT_GNU_HASH` section.
///
/// The bloom filter is the negative short-circuit; the bucket chain is
/// then walked comparing hashes with the low bit masked off, the low
/// bit itself terminating the chain.
pub fn gnu_hash_lookup<Endian, F>(hash_data: EndianBuf<Endian>,
                                  class: Class,
                                  name: &str,
                                  mut matches: F)
                                  -> Result<Option<usize>>
    where Endian: Endianity,
          F: FnMut(usize) -> bool
{
    let (input, nbuckets) = parse_u32(hash_data)?;
    let (input, symoffset) = parse_u32(input)?;
    let (input, bloom_size) = parse_u32(input)?;
    let (mut input, bloom_shift) = parse_u32(input)?;
    if nbuckets == 0 || bloom_size == 0 {
        return Ok(None);
    }

    let h1 = gnu_hash(name);
    let h2 = h1 >> bloom_shift;
    let c = (class.word_size() * 8) as u32;

    let bloom_index = (h1 / c) % bloom_size;
    let mut bloom_word = 0;
    for i in 0..bloom_size {
        let (rest, word) = parse_class_word(input, class)?;
        input = rest;
        if i == bloom_index {
            bloom_word = word;
        }
    }
    let mask = (1u64 << (h1 % c)) | (1u64 << (h2 % c));
    if bloom_word & mask != mask {
        return Ok(None);
    }

    let mut bucket = 0;
    for i in 0..nbuckets {
        let (rest, value) = parse_u32(input)?;
        input = rest;
        if i == h1 % nbuckets {
            bucket = value;
        }
    }
    if bucket < symoffset {
        return Ok(None);
    }

    let chains = input;
    let mut index = bucket;
    loop {
        let chain_offset = ((index - symoffset) * 4) as usize;
        if chain_offset + 4 > chains.len() {
            return Ok(None);
        }
        let (_, stop_word) = parse_u32(chains.range_from(chain_offset..))?;
        if (stop_word & !1) == (h1 & !1) && matches(index as usize) {
            return Ok(Some(index as usize));
        }
        if stop_word & 1 != 0 {
            return Ok(None);
        }
        index += 1;
    }
}

/// Look a symbol index up through a classic `SHT_HASH` section.
pub fn sysv_hash_lookup<Endian, F>(hash_data: EndianBuf<Endian>,
                                   name: &str,
                                   mut matches: F)
                                   -> Result<Option<usize>>
    where Endian: Endianity,
          F: FnMut(usize) -> bool
{
    let (input, nbucket) = parse_u32(hash_data)?;
    let (input, nchain) = parse_u32(input)?;
    if nbucket == 0 {
        return Ok(None);
    }

    let h = elf_hash(name);
    let bucket_offset = ((h % nbucket) * 4) as usize;
    if bucket_offset + 4 > input.len() {
        return Ok(None);
    }
    let (_, mut index) = parse_u32(input.range_from(bucket_offset..))?;

    let chains = input.range_from(nbucket as usize * 4..);
    while index != 0 {
        if matches(index as usize) {
            return Ok(Some(index as usize));
        }
        if index >= nchain {
            return Ok(None);
        }
        let chain_offset = (index * 4) as usize;
        if chain_offset + 4 > chains.len() {
            return Ok(None);
        }
        let (_, next) = parse_u32(chains.range_from(chain_offset..))?;
        index = next;
    }
    Ok(None)
}

/// The status of a symbol's version, per its versym slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersymStatus<'input> {
    /// Index 0 or 1: the symbol has no version.
    Unversioned,
    /// Index 0x8001: the symbol was eliminated at link time.
    Discard,
    /// A resolved version: name plus whether it is the default.
    Version(&'input str, bool),
    /// The slot names a version the verdef/verneed sections do not
    /// define.
    Unknown,
}

/// Resolve the version of the symbol at `sym_index` through the
/// versym plus verdef (defined) or verneed (undefined) sections.
pub fn symbol_version<'input, Endian>(elf: &ElfFile<'input, Endian>,
                                      sym_index: usize,
                                      is_defined: bool)
                                      -> VersymStatus<'input>
    where Endian: Endianity
{
    let versym = match elf.section_by_type(SHT_GNU_VERSYM) {
        Some(section) => elf.section_data(section),
        None => return VersymStatus::Unversioned,
    };
    let offset = sym_index * 2;
    if offset + 2 > versym.len() {
        return VersymStatus::Unversioned;
    }
    let versym_value = match parse_u16(versym.range_from(offset..)) {
        Ok((_, value)) => value,
        Err(_) => return VersymStatus::Unversioned,
    };

    if versym_value == VER_NDX_ELIMINATE {
        return VersymStatus::Discard;
    }
    let is_default = versym_value & 0x8000 == 0;
    let index = versym_value & 0x7fff;
    if index == VER_NDX_LOCAL || index == VER_NDX_GLOBAL {
        return VersymStatus::Unversioned;
    }

    let name = if is_defined {
        verdef_name(elf, index)
    } else {
        verneed_name(elf, index)
    };
    match name {
        Some(name) => VersymStatus::Version(name, is_default),
        None => VersymStatus::Unknown,
    }
}

fn verdef_name<'input, Endian>(elf: &ElfFile<'input, Endian>,
                               index: u16)
                               -> Option<&'input str>
    where Endian: Endianity
{
    let section = elf.section_by_type(SHT_GNU_VERDEF)?;
    let strtab = elf.sections().get(section.link as usize)?.clone();
    let data = elf.section_data(section);

    let mut offset = 0;
    loop {
        if offset >= data.len() {
            return None;
        }
        let entry = data.range_from(offset..);
        let (rest, _version) = parse_u16(entry).ok()?;
        let (rest, flags) = parse_u16(rest).ok()?;
        let (rest, ndx) = parse_u16(rest).ok()?;
        let (rest, _cnt) = parse_u16(rest).ok()?;
        let (rest, _hash) = parse_u32(rest).ok()?;
        let (rest, aux) = parse_u32(rest).ok()?;
        let (_, next) = parse_u32(rest).ok()?;

        if ndx == index && flags & VER_FLG_BASE == 0 {
            // First verdaux entry holds the version name.
            if offset + aux as usize >= data.len() {
                return None;
            }
            let aux_entry = data.range_from(offset + aux as usize..);
            let (_, name_offset) = parse_u32(aux_entry).ok()?;
            return strtab_string(elf, &strtab, name_offset);
        }

        if next == 0 {
            return None;
        }
        offset += next as usize;
    }
}

fn verneed_name<'input, Endian>(elf: &ElfFile<'input, Endian>,
                                index: u16)
                                -> Option<&'input str>
    where Endian: Endianity
{
    let section = elf.section_by_type(SHT_GNU_VERNEED)?;
    let strtab = elf.sections().get(section.link as usize)?.clone();
    let data = elf.section_data(section);

    let mut offset = 0;
    loop {
        if offset >= data.len() {
            return None;
        }
        let entry = data.range_from(offset..);
        let (rest, _version) = parse_u16(entry).ok()?;
        let (rest, _cnt) = parse_u16(rest).ok()?;
        let (rest, _file) = parse_u32(rest).ok()?;
        let (rest, aux) = parse_u32(rest).ok()?;
        let (_, next) = parse_u32(rest).ok()?;

        let mut aux_offset = offset + aux as usize;
        loop {
            if aux_offset >= data.len() {
                return None;
            }
            let aux_entry = data.range_from(aux_offset..);
            let (rest, _hash) = parse_u32(aux_entry).ok()?;
            let (rest, _flags) = parse_u16(rest).ok()?;
            let (rest, other) = parse_u16(rest).ok()?;
            let (rest, name_offset) = parse_u32(rest).ok()?;
            let (_, aux_next) = parse_u32(rest).ok()?;

            if other & 0x7fff == index {
                return strtab_string(elf, &strtab, name_offset);
            }
            if aux_next == 0 {
                break;
            }
            aux_offset += aux_next as usize;
        }

        if next == 0 {
            return None;
        }
        offset += next as usize;
    }
}

fn strtab_string<'input, Endian>(elf: &ElfFile<'input, Endian>,
                                 strtab: &Section<'input>,
                                 offset: u32)
                                 -> Option<&'input str>
    where Endian: Endianity
{
    let data = elf.section_data(strtab);
    if offset as usize >= data.len() {
        return None;
    }
    parse_null_terminated_string(data.range_from(offset as usize..))
        .ok()
        .map(|(_, s)| s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use endianity::{EndianBuf, LittleEndian};
    use test_util::{TestElf, TestSection, emit_sym64};

    fn strtab(names: &[&str]) -> (Vec<u8>, Vec<u32>) {
        let mut table = vec![0u8];
        let mut offsets = Vec::new();
        for name in names {
            offsets.push(table.len() as u32);
            table.extend_from_slice(name.as_bytes());
            table.push(0);
        }
        (table, offsets)
    }

    #[test]
    fn test_elf_ident() {
        let image = TestElf::new().build();
        assert_eq!(elf_ident(&image).unwrap(), (Class::Elf64, false));

        assert_eq!(elf_ident(b"not an elf file!"),
                   Err(::parse::Error::NotAnElfFile));
    }

    #[test]
    fn test_parse_sections() {
        let mut elf = TestElf::new();
        elf.section(TestSection::new(".text", SHT_PROGBITS, vec![0x90; 16]).addr(0x1000));
        let image = elf.build();

        let file = ElfFile::<LittleEndian>::parse(EndianBuf::new(&image)).unwrap();
        assert_eq!(file.header().e_type, ET_DYN);
        let text = file.section_by_name(".text").expect(".text");
        assert_eq!(text.addr, 0x1000);
        assert_eq!(file.section_data(text).len(), 16);
        assert!(file.section_by_name(".data").is_none());
    }

    #[test]
    fn test_parse_symbols() {
        let (table, offsets) = strtab(&["f", "g"]);
        let mut syms = Vec::new();
        emit_sym64(&mut syms, 0, 0, 0, 0, 0, 0);
        emit_sym64(&mut syms,
                   offsets[0],
                   (STB_GLOBAL << 4) | STT_FUNC,
                   0,
                   1,
                   0x1000,
                   0x20);
        emit_sym64(&mut syms,
                   offsets[1],
                   (STB_WEAK << 4) | STT_OBJECT,
                   0,
                   SHN_UNDEF,
                   0,
                   0);

        let mut elf = TestElf::new();
        let strtab_idx = elf.section(TestSection::new(".strtab", SHT_STRTAB, table));
        elf.section(TestSection::new(".symtab", SHT_SYMTAB, syms)
            .link(strtab_idx)
            .entsize(24));
        let image = elf.build();

        let file = ElfFile::<LittleEndian>::parse(EndianBuf::new(&image)).unwrap();
        let symtab = file.section_by_type(SHT_SYMTAB).expect("symtab").clone();
        assert_eq!(file.symbol_count(&symtab), 3);

        let f = file.symbol(&symtab, 1).unwrap();
        assert_eq!(f.name, "f");
        assert_eq!(f.sym_type(), STT_FUNC);
        assert_eq!(f.binding(), STB_GLOBAL);
        assert!(f.is_defined());
        assert_eq!(f.value, 0x1000);

        let g = file.symbol(&symtab, 2).unwrap();
        assert_eq!(g.name, "g");
        assert!(!g.is_defined());
    }

    #[test]
    fn test_hash_functions() {
        // Reference values for the two standard hash functions.
        assert_eq!(elf_hash(""), 0);
        assert_eq!(elf_hash("printf"), 0x077905a6);
        assert_eq!(gnu_hash(""), 5381);
        assert_eq!(gnu_hash("printf"), 0x156b2bb8);
    }

    fn build_gnu_hash_section(names: &[&str], symoffset: u32) -> Vec<u8> {
        // One bucket, 64-bit bloom with one word covering everything.
        let nbuckets = 1u32;
        let bloom_size = 1u32;
        let bloom_shift = 5u32;

        let mut bloom: u64 = 0;
        for name in names {
            let h1 = gnu_hash(name);
            let h2 = h1 >> bloom_shift;
            bloom |= 1u64 << (h1 % 64);
            bloom |= 1u64 << (h2 % 64);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&nbuckets.to_le_bytes());
        out.extend_from_slice(&symoffset.to_le_bytes());
        out.extend_from_slice(&bloom_size.to_le_bytes());
        out.extend_from_slice(&bloom_shift.to_le_bytes());
        out.extend_from_slice(&bloom.to_le_bytes());
        // Bucket 0 points at the first hashed symbol.
        out.extend_from_slice(&symoffset.to_le_bytes());
        // Chain: every hash with the low bit clear except the last.
        for (i, name) in names.iter().enumerate() {
            let mut h = gnu_hash(name) & !1;
            if i == names.len() - 1 {
                h |= 1;
            }
            out.extend_from_slice(&h.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_gnu_hash_lookup() {
        let names = ["alpha", "beta", "gamma"];
        let section = build_gnu_hash_section(&names, 1);
        let data = EndianBuf::<LittleEndian>::new(&section);

        for (i, name) in names.iter().enumerate() {
            let found = gnu_hash_lookup(data, Class::Elf64, name, |index| {
                names.get(index - 1) == Some(name)
            })
            .unwrap();
            assert_eq!(found, Some(i + 1), "symbol {}", name);
        }

        let missing = gnu_hash_lookup(data, Class::Elf64, "does_not_exist", |_| true)
            .unwrap();
        assert_eq!(missing, None);
    }

    fn build_sysv_hash_section(names: &[&str], nbucket: u32) -> Vec<u8> {
        let nchain = names.len() as u32 + 1;
        let mut buckets = vec![0u32; nbucket as usize];
        let mut chains = vec![0u32; nchain as usize];

        for (i, name) in names.iter().enumerate() {
            let index = (i + 1) as u32;
            let bucket = (elf_hash(name) % nbucket) as usize;
            chains[index as usize] = buckets[bucket];
            buckets[bucket] = index;
        }

        let mut out = Vec::new();
        out.extend_from_slice(&nbucket.to_le_bytes());
        out.extend_from_slice(&nchain.to_le_bytes());
        for b in buckets {
            out.extend_from_slice(&b.to_le_bytes());
        }
        for c in chains {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_sysv_hash_lookup() {
        let names = ["alpha", "beta", "gamma"];
        let section = build_sysv_hash_section(&names, 2);
        let data = EndianBuf::<LittleEndian>::new(&section);

        for (i, name) in names.iter().enumerate() {
            let found = sysv_hash_lookup(data, name, |index| {
                names.get(index - 1) == Some(name)
            })
            .unwrap();
            assert_eq!(found, Some(i + 1), "symbol {}", name);
        }

        let missing = sysv_hash_lookup(data, "does_not_exist", |_| true).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_dynamic_soname_and_needed() {
        let (dynstr, offsets) = strtab(&["libfoo.so.1", "libc.so.6", "libm.so.6"]);

        let mut dynamic = Vec::new();
        for &(tag, value) in &[(DT_SONAME, offsets[0] as u64),
                               (DT_NEEDED, offsets[1] as u64),
                               (DT_NEEDED, offsets[2] as u64),
                               (DT_NULL, 0)] {
            dynamic.extend_from_slice(&(tag as u64).to_le_bytes());
            dynamic.extend_from_slice(&value.to_le_bytes());
        }

        let mut elf = TestElf::new();
        elf.section(TestSection::new(".dynstr", SHT_STRTAB, dynstr));
        elf.section(TestSection::new(".dynamic", SHT_DYNAMIC, dynamic));
        let image = elf.build();

        let file = ElfFile::<LittleEndian>::parse(EndianBuf::new(&image)).unwrap();
        assert_eq!(file.soname(), Some("libfoo.so.1"));
        assert_eq!(file.needed(), vec!["libc.so.6", "libm.so.6"]);
    }

    #[test]
    fn test_opd_entry_point() {
        let mut opd = Vec::new();
        // Three-word descriptor: entry point, TOC, environment.
        opd.extend_from_slice(&0x4000_0000u64.to_le_bytes());
        opd.extend_from_slice(&0x5000_0000u64.to_le_bytes());
        opd.extend_from_slice(&0u64.to_le_bytes());

        let mut elf = TestElf::new();
        elf.e_machine = EM_PPC64;
        elf.section(TestSection::new(".opd", SHT_PROGBITS, opd).addr(0x8000));
        let image = elf.build();

        let file = ElfFile::<LittleEndian>::parse(EndianBuf::new(&image)).unwrap();
        assert!(file.uses_opd());
        assert_eq!(file.opd_entry_point(0x8000), Some(0x4000_0000));
        assert_eq!(file.opd_entry_point(0x7000), None);
    }

    #[test]
    fn test_symbol_version_resolution() {
        let (dynstr, offsets) = strtab(&["f", "VERS_1", "VERS_2"]);

        let mut syms = Vec::new();
        emit_sym64(&mut syms, 0, 0, 0, 0, 0, 0);
        emit_sym64(&mut syms,
                   offsets[0],
                   (STB_GLOBAL << 4) | STT_FUNC,
                   0,
                   1,
                   0x1000,
                   0);

        // versym: [local, index 2]
        let mut versym = Vec::new();
        versym.extend_from_slice(&0u16.to_le_bytes());
        versym.extend_from_slice(&2u16.to_le_bytes());

        // verdef: base entry (index 1) then the real version (index 2).
        let mut verdef = Vec::new();
        // Entry 0: VER_FLG_BASE, ndx 1.
        verdef.extend_from_slice(&1u16.to_le_bytes()); // vd_version
        verdef.extend_from_slice(&VER_FLG_BASE.to_le_bytes());
        verdef.extend_from_slice(&1u16.to_le_bytes()); // vd_ndx
        verdef.extend_from_slice(&1u16.to_le_bytes()); // vd_cnt
        verdef.extend_from_slice(&0u32.to_le_bytes()); // vd_hash
        verdef.extend_from_slice(&20u32.to_le_bytes()); // vd_aux
        verdef.extend_from_slice(&28u32.to_le_bytes()); // vd_next
        verdef.extend_from_slice(&offsets[1].to_le_bytes()); // vda_name
        verdef.extend_from_slice(&0u32.to_le_bytes()); // vda_next
        // Entry 1: ndx 2 -> "VERS_2".
        verdef.extend_from_slice(&1u16.to_le_bytes());
        verdef.extend_from_slice(&0u16.to_le_bytes());
        verdef.extend_from_slice(&2u16.to_le_bytes());
        verdef.extend_from_slice(&1u16.to_le_bytes());
        verdef.extend_from_slice(&0u32.to_le_bytes());
        verdef.extend_from_slice(&20u32.to_le_bytes());
        verdef.extend_from_slice(&0u32.to_le_bytes());
        verdef.extend_from_slice(&offsets[2].to_le_bytes());
        verdef.extend_from_slice(&0u32.to_le_bytes());

        let mut elf = TestElf::new();
        let dynstr_idx = elf.section(TestSection::new(".dynstr", SHT_STRTAB, dynstr));
        elf.section(TestSection::new(".dynsym", SHT_DYNSYM, syms)
            .link(dynstr_idx)
            .entsize(24));
        elf.section(TestSection::new(".gnu.version", SHT_GNU_VERSYM, versym)
            .entsize(2));
        elf.section(TestSection::new(".gnu.version_d", SHT_GNU_VERDEF, verdef)
            .link(dynstr_idx));
        let image = elf.build();

        let file = ElfFile::<LittleEndian>::parse(EndianBuf::new(&image)).unwrap();
        assert_eq!(symbol_version(&file, 1, true),
                   VersymStatus::Version("VERS_2", true));
        assert_eq!(symbol_version(&file, 0, true), VersymStatus::Unversioned);
    }
}
