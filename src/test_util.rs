//! Shared helpers for building synthetic DWARF and ELF bytes in tests.

extern crate test_assembler;

use std::collections::HashMap;

use constants;
use leb128;
use self::test_assembler::Section;

/// Extension methods on `test_assembler::Section` for LEB128 emission.
pub trait SectionMethods: Sized {
    /// Append an unsigned LEB128 value.
    fn uleb(self, val: u64) -> Section;
    /// Append a signed LEB128 value.
    fn sleb(self, val: i64) -> Section;
}

impl SectionMethods for Section {
    fn uleb(self, val: u64) -> Section {
        let mut buf = Vec::new();
        leb128::write::unsigned(&mut buf, val).unwrap();
        self.append_bytes(&buf)
    }

    fn sleb(self, val: i64) -> Section {
        let mut buf = Vec::new();
        leb128::write::signed(&mut buf, val).unwrap();
        self.append_bytes(&buf)
    }
}

/// An attribute of a `TestDie`, with an implied form.
#[derive(Debug, Clone)]
pub enum TestAttr {
    /// `DW_FORM_string`.
    Str(&'static str),
    /// `DW_FORM_strp`; the string is interned in the test `.debug_str`.
    Strp(&'static str),
    /// `DW_FORM_data1`.
    Data1(u8),
    /// `DW_FORM_data2`.
    Data2(u16),
    /// `DW_FORM_data4`.
    Data4(u32),
    /// `DW_FORM_data8`.
    Data8(u64),
    /// `DW_FORM_sdata`.
    Sdata(i64),
    /// `DW_FORM_udata`.
    Udata(u64),
    /// `DW_FORM_flag`.
    Flag(bool),
    /// `DW_FORM_ref4` to the DIE carrying the named label, which must
    /// live in the same unit.
    Ref(&'static str),
    /// `DW_FORM_ref_addr` to the DIE carrying the named label, usable
    /// across units.
    RefAddr(&'static str),
    /// `DW_FORM_addr` (8-byte addresses).
    Addr(u64),
    /// `DW_FORM_exprloc`.
    Expr(Vec<u8>),
}

impl TestAttr {
    fn form(&self) -> constants::DwForm {
        match *self {
            TestAttr::Str(_) => constants::DW_FORM_string,
            TestAttr::Strp(_) => constants::DW_FORM_strp,
            TestAttr::Data1(_) => constants::DW_FORM_data1,
            TestAttr::Data2(_) => constants::DW_FORM_data2,
            TestAttr::Data4(_) => constants::DW_FORM_data4,
            TestAttr::Data8(_) => constants::DW_FORM_data8,
            TestAttr::Sdata(_) => constants::DW_FORM_sdata,
            TestAttr::Udata(_) => constants::DW_FORM_udata,
            TestAttr::Flag(_) => constants::DW_FORM_flag,
            TestAttr::Ref(_) => constants::DW_FORM_ref4,
            TestAttr::RefAddr(_) => constants::DW_FORM_ref_addr,
            TestAttr::Addr(_) => constants::DW_FORM_addr,
            TestAttr::Expr(_) => constants::DW_FORM_exprloc,
        }
    }
}

/// A DIE description for test-section emission.
#[derive(Debug, Clone)]
pub struct TestDie {
    tag: constants::DwTag,
    label: Option<&'static str>,
    attrs: Vec<(constants::DwAt, TestAttr)>,
    children: Vec<TestDie>,
}

impl TestDie {
    /// A new DIE with the given tag.
    pub fn new(tag: constants::DwTag) -> TestDie {
        TestDie {
            tag: tag,
            label: None,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Attach a label other DIEs can `TestAttr::Ref` to.
    pub fn label(mut self, label: &'static str) -> TestDie {
        self.label = Some(label);
        self
    }

    /// Append an attribute.
    pub fn attr(mut self, name: constants::DwAt, value: TestAttr) -> TestDie {
        self.attrs.push((name, value));
        self
    }

    /// Append a child DIE.
    pub fn child(mut self, child: TestDie) -> TestDie {
        self.children.push(child);
        self
    }
}

#[derive(Debug, Default)]
struct AbbrevTable {
    bytes: Vec<u8>,
    codes: HashMap<Vec<u64>, u64>,
    next_code: u64,
}

impl AbbrevTable {
    fn code_for(&mut self, die: &TestDie) -> u64 {
        let mut key = vec![die.tag.0, die.children.is_empty() as u64];
        for &(at, ref value) in &die.attrs {
            key.push(at.0);
            key.push(value.form().0);
        }
        if let Some(&code) = self.codes.get(&key) {
            return code;
        }

        self.next_code += 1;
        let code = self.next_code;
        leb128::write::unsigned(&mut self.bytes, code).unwrap();
        leb128::write::unsigned(&mut self.bytes, die.tag.0).unwrap();
        self.bytes.push(if die.children.is_empty() {
            constants::DW_CHILDREN_no.0
        } else {
            constants::DW_CHILDREN_yes.0
        });
        for &(at, ref value) in &die.attrs {
            leb128::write::unsigned(&mut self.bytes, at.0).unwrap();
            leb128::write::unsigned(&mut self.bytes, value.form().0).unwrap();
        }
        self.bytes.push(0);
        self.bytes.push(0);
        self.codes.insert(key, code);
        code
    }

    fn finish(mut self) -> Vec<u8> {
        self.bytes.push(0);
        self.bytes
    }
}

/// Builds `.debug_info`, `.debug_abbrev` and `.debug_str` bytes from
/// `TestDie` trees: 32-bit DWARF version 4, 8-byte addresses, all
/// units sharing the abbreviation table at offset zero.
#[derive(Debug, Default)]
pub struct TestDwarf {
    units: Vec<(constants::DwLang, TestDie)>,
    info: Vec<u8>,
    abbrev: Vec<u8>,
    str_table: Vec<u8>,
}

impl TestDwarf {
    /// A new, empty builder.
    pub fn new() -> TestDwarf {
        TestDwarf::default()
    }

    /// Add a compilation unit rooted at `root`. `DW_AT_language` is
    /// added to the root automatically.
    pub fn compile_unit(&mut self, language: constants::DwLang, root: TestDie) {
        let root = root.attr(constants::DW_AT_language, TestAttr::Udata(language.0));
        self.units.push((language, root));
    }

    /// Emit every unit into the section buffers.
    pub fn build(mut self) -> TestDwarf {
        let mut abbrevs = AbbrevTable::default();
        let mut info = Vec::new();
        let mut str_table = vec![0u8];
        let mut labels: HashMap<&'static str, usize> = HashMap::new();
        // (patch position, label, unit start); a unit start of `None`
        // marks a section-absolute ref_addr patch.
        let mut ref_patches: Vec<(usize, &'static str, Option<usize>)> = Vec::new();

        let units = ::std::mem::replace(&mut self.units, Vec::new());
        for &(_, ref root) in &units {
            let unit_start = info.len();
            // unit_length, patched below.
            info.extend_from_slice(&[0, 0, 0, 0]);
            // version
            info.extend_from_slice(&4u16.to_le_bytes());
            // debug_abbrev_offset
            info.extend_from_slice(&[0, 0, 0, 0]);
            // address_size
            info.push(8);

            emit_die(root,
                     &mut info,
                     &mut abbrevs,
                     &mut str_table,
                     &mut labels,
                     &mut ref_patches,
                     unit_start);

            let length = (info.len() - unit_start - 4) as u32;
            info[unit_start..unit_start + 4].copy_from_slice(&length.to_le_bytes());
        }

        for (pos, label, unit_start) in ref_patches {
            let target = *labels.get(label).expect("unresolved test DIE label");
            let value = match unit_start {
                Some(unit_start) => (target - unit_start) as u32,
                None => target as u32,
            };
            info[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
        }

        self.info = info;
        self.abbrev = abbrevs.finish();
        self.str_table = str_table;
        self
    }

    /// The built `.debug_info` bytes.
    pub fn debug_info(&self) -> &[u8] {
        &self.info
    }

    /// The built `.debug_abbrev` bytes.
    pub fn debug_abbrev(&self) -> &[u8] {
        &self.abbrev
    }

    /// The built `.debug_str` bytes.
    pub fn debug_str(&self) -> &[u8] {
        &self.str_table
    }
}

fn emit_die(die: &TestDie,
            info: &mut Vec<u8>,
            abbrevs: &mut AbbrevTable,
            str_table: &mut Vec<u8>,
            labels: &mut HashMap<&'static str, usize>,
            ref_patches: &mut Vec<(usize, &'static str, Option<usize>)>,
            unit_start: usize) {
    if let Some(label) = die.label {
        labels.insert(label, info.len());
    }
    let code = abbrevs.code_for(die);
    leb128::write::unsigned(info, code).unwrap();

    for &(_, ref value) in &die.attrs {
        match *value {
            TestAttr::Str(s) => {
                info.extend_from_slice(s.as_bytes());
                info.push(0);
            }
            TestAttr::Strp(s) => {
                let offset = str_table.len() as u32;
                str_table.extend_from_slice(s.as_bytes());
                str_table.push(0);
                info.extend_from_slice(&offset.to_le_bytes());
            }
            TestAttr::Data1(v) => info.push(v),
            TestAttr::Data2(v) => info.extend_from_slice(&v.to_le_bytes()),
            TestAttr::Data4(v) => info.extend_from_slice(&v.to_le_bytes()),
            TestAttr::Data8(v) => info.extend_from_slice(&v.to_le_bytes()),
            TestAttr::Sdata(v) => {
                leb128::write::signed(info, v).unwrap();
            }
            TestAttr::Udata(v) => {
                leb128::write::unsigned(info, v).unwrap();
            }
            TestAttr::Flag(v) => info.push(v as u8),
            TestAttr::Ref(label) => {
                ref_patches.push((info.len(), label, Some(unit_start)));
                info.extend_from_slice(&[0, 0, 0, 0]);
            }
            TestAttr::RefAddr(label) => {
                ref_patches.push((info.len(), label, None));
                info.extend_from_slice(&[0, 0, 0, 0]);
            }
            TestAttr::Addr(v) => info.extend_from_slice(&v.to_le_bytes()),
            TestAttr::Expr(ref bytes) => {
                leb128::write::unsigned(info, bytes.len() as u64).unwrap();
                info.extend_from_slice(bytes);
            }
        }
    }

    for child in &die.children {
        emit_die(child, info, abbrevs, str_table, labels, ref_patches, unit_start);
    }
    if !die.children.is_empty() {
        info.push(0);
    }
}

/// A section of a `TestElf` image.
#[derive(Debug, Clone)]
pub struct TestSection {
    /// Section name, interned into the test `.shstrtab`.
    pub name: &'static str,
    /// `sh_type` value.
    pub sh_type: u32,
    /// `sh_addr` value.
    pub addr: u64,
    /// `sh_link` value.
    pub link: u32,
    /// `sh_entsize` value.
    pub entsize: u64,
    /// Raw contents.
    pub data: Vec<u8>,
}

impl TestSection {
    /// A new section with the given name, type and contents.
    pub fn new(name: &'static str, sh_type: u32, data: Vec<u8>) -> TestSection {
        TestSection {
            name: name,
            sh_type: sh_type,
            addr: 0,
            link: 0,
            entsize: 0,
            data: data,
        }
    }

    /// Set the load address.
    pub fn addr(mut self, addr: u64) -> TestSection {
        self.addr = addr;
        self
    }

    /// Set the linked-section index.
    pub fn link(mut self, link: u32) -> TestSection {
        self.link = link;
        self
    }

    /// Set the entry size.
    pub fn entsize(mut self, entsize: u64) -> TestSection {
        self.entsize = entsize;
        self
    }
}

/// Assembles a minimal 64-bit little-endian ELF image from a list of
/// sections. Section indices start at 1 (index 0 is the null section);
/// `.shstrtab` is appended last.
#[derive(Debug, Default)]
pub struct TestElf {
    /// `e_type` value (`ET_DYN` by default).
    pub e_type: u16,
    /// `e_machine` value.
    pub e_machine: u16,
    sections: Vec<TestSection>,
}

const EHDR_SIZE: usize = 64;
const SHDR_SIZE: usize = 64;

impl TestElf {
    /// A new builder producing an `ET_DYN` x86-64 image.
    pub fn new() -> TestElf {
        TestElf {
            e_type: 3,     // ET_DYN
            e_machine: 62, // EM_X86_64
            sections: Vec::new(),
        }
    }

    /// Append a section; returns its header index.
    pub fn section(&mut self, section: TestSection) -> u32 {
        self.sections.push(section);
        self.sections.len() as u32
    }

    /// Assemble the image.
    pub fn build(&self) -> Vec<u8> {
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for section in &self.sections {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(section.name.as_bytes());
            shstrtab.push(0);
        }
        let shstrtab_name = shstrtab.len() as u32;
        shstrtab.extend_from_slice(b".shstrtab\0");

        // Layout: ehdr, section contents, shstrtab, section headers.
        let mut offsets = Vec::new();
        let mut pos = EHDR_SIZE;
        for section in &self.sections {
            offsets.push(pos);
            pos += section.data.len();
        }
        let shstrtab_offset = pos;
        pos += shstrtab.len();
        let shoff = pos;

        let shnum = (self.sections.len() + 2) as u16;
        let shstrndx = (self.sections.len() + 1) as u16;

        let mut out = Vec::new();
        // e_ident
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&self.e_type.to_le_bytes());
        out.extend_from_slice(&self.e_machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // e_version
        out.extend_from_slice(&0u64.to_le_bytes()); // e_entry
        out.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
        out.extend_from_slice(&(shoff as u64).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&shnum.to_le_bytes());
        out.extend_from_slice(&shstrndx.to_le_bytes());
        assert_eq!(out.len(), EHDR_SIZE);

        for section in &self.sections {
            out.extend_from_slice(&section.data);
        }
        out.extend_from_slice(&shstrtab);

        // Null section header.
        out.extend_from_slice(&[0; SHDR_SIZE]);
        for (i, section) in self.sections.iter().enumerate() {
            emit_shdr(&mut out,
                      name_offsets[i],
                      section.sh_type,
                      section.addr,
                      offsets[i] as u64,
                      section.data.len() as u64,
                      section.link,
                      section.entsize);
        }
        emit_shdr(&mut out,
                  shstrtab_name,
                  3, // SHT_STRTAB
                  0,
                  shstrtab_offset as u64,
                  shstrtab.len() as u64,
                  0,
                  0);

        out
    }
}

fn emit_shdr(out: &mut Vec<u8>,
             name: u32,
             sh_type: u32,
             addr: u64,
             offset: u64,
             size: u64,
             link: u32,
             entsize: u64) {
    out.extend_from_slice(&name.to_le_bytes());
    out.extend_from_slice(&sh_type.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_flags
    out.extend_from_slice(&addr.to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(&link.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // sh_info
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_addralign
    out.extend_from_slice(&entsize.to_le_bytes());
}

/// Emit one 64-bit little-endian symbol-table entry.
pub fn emit_sym64(out: &mut Vec<u8>,
                  name: u32,
                  info: u8,
                  other: u8,
                  shndx: u16,
                  value: u64,
                  size: u64) {
    out.extend_from_slice(&name.to_le_bytes());
    out.push(info);
    out.push(other);
    out.extend_from_slice(&shndx.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
}
