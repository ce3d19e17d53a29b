//! Parsing of `.debug_info`/`.debug_types` into per-source DIE arenas,
//! and the typed attribute accessors everything downstream reads DIEs
//! through.

use std::collections::HashMap;

use abbrev::{Abbreviations, AttributeSpecification, parse_abbreviations};
use constants;
use endianity::{Endianity, EndianBuf};
use parse::{Error, Format, Result};
use parse::{parse_address, parse_initial_length, parse_null_terminated_string,
            parse_offset, parse_signed_leb, parse_u8, parse_u16, parse_u64,
            parse_unsigned_leb, parse_word, take, u64_to_offset};

/// A section-relative offset of a DIE within its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DieOffset(pub usize);

/// Which debug-info file family a DIE was read from.
///
/// Cross-source references are forbidden except through explicit
/// imported-unit points and the `GNU_ref_alt`/`ref_sig8` forms, and a
/// canonical representative is only ever chosen among DIEs of one
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DieSource {
    /// The main file's `.debug_info`.
    Primary,
    /// The `.gnu_debugaltlink` file's `.debug_info`.
    Alternate,
    /// The `.debug_types` section.
    TypeUnit,
}

/// Index of a DIE within its source's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DieId(pub u32);

/// A reference from one DIE to another, as found in an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DieReference {
    /// A reference into the same source as the referring DIE.
    SameSource(DieOffset),
    /// A `DW_FORM_GNU_ref_alt` reference into the alternate file.
    Alternate(DieOffset),
    /// A `DW_FORM_ref_sig8` reference into the type units.
    Signature(u64),
}

/// A parsed attribute value.
///
/// String and block payloads borrow the mapped input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue<'input> {
    /// A machine address.
    Addr(u64),
    /// A block of uninterpreted bytes.
    Block(&'input [u8]),
    /// A `DW_FORM_data*` constant whose signedness the producer did not
    /// state. The form is kept so consumers can decide.
    Data(u64, constants::DwForm),
    /// A signed constant.
    Sdata(i64),
    /// An unsigned constant.
    Udata(u64),
    /// A DWARF expression.
    Exprloc(&'input [u8]),
    /// A boolean flag.
    Flag(bool),
    /// An offset into another section.
    SecOffset(u64),
    /// A reference to a DIE in the same source, already rebased to a
    /// section-relative offset.
    UnitRef(DieOffset),
    /// A `DW_FORM_ref_addr` reference, section-relative.
    DebugInfoRef(DieOffset),
    /// A reference into the alternate debug-info file.
    AltDebugInfoRef(DieOffset),
    /// A type-unit signature reference.
    SignatureRef(u64),
    /// An inline string.
    String(&'input str),
    /// An offset into `.debug_str`. Two equal offsets denote the same
    /// string-table slot, so equality never needs the bytes.
    DebugStrRef(usize),
    /// An offset into the alternate file's `.debug_str`.
    AltDebugStrRef(usize),
    /// An offset into `.debug_line_str`.
    LineStrRef(usize),
    /// An index through `.debug_str_offsets`/`.debug_addr`, carried
    /// unresolved.
    Index(u64, constants::DwForm),
}

/// A form-aware constant: `DW_FORM_sdata` is signed, `DW_FORM_udata`
/// unsigned, and `DW_FORM_data*` is whichever interpretation the
/// consumer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DieConstant {
    /// The producer said this constant is signed.
    Signed(i64),
    /// The producer said, or the consumer assumed, unsigned.
    Unsigned(u64),
}

impl DieConstant {
    /// The constant as an unsigned value, sign bits reinterpreted.
    pub fn as_unsigned(&self) -> u64 {
        match *self {
            DieConstant::Signed(v) => v as u64,
            DieConstant::Unsigned(v) => v,
        }
    }

    /// The constant as a signed value, sign bits reinterpreted.
    pub fn as_signed(&self) -> i64 {
        match *self {
            DieConstant::Signed(v) => v,
            DieConstant::Unsigned(v) => v as i64,
        }
    }
}

/// One parsed DIE in a source's arena.
#[derive(Debug)]
pub struct Die<'input> {
    offset: DieOffset,
    tag: constants::DwTag,
    unit: u32,
    parent: Option<DieId>,
    children: Vec<DieId>,
    attrs: Vec<(constants::DwAt, AttributeValue<'input>)>,
}

impl<'input> Die<'input> {
    /// This DIE's tag.
    pub fn tag(&self) -> constants::DwTag {
        self.tag
    }

    /// This DIE's section-relative offset.
    pub fn offset(&self) -> DieOffset {
        self.offset
    }

    /// The raw attribute list, in the order the producer emitted it.
    pub fn attrs(&self) -> &[(constants::DwAt, AttributeValue<'input>)] {
        &self.attrs
    }
}

/// The kind of a unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A compilation unit (or DWARF 5 partial/skeleton unit).
    Compilation,
    /// A type unit; carries the signature and the offset of the
    /// described type's DIE.
    Type {
        /// The 8-byte type signature.
        signature: u64,
        /// Section-relative offset of the type DIE.
        type_offset: DieOffset,
    },
}

/// One parsed unit: its header fields plus the root of its DIE tree.
#[derive(Debug)]
pub struct Unit {
    offset: usize,
    end: usize,
    version: u16,
    format: Format,
    address_size: u8,
    abbrev_offset: usize,
    kind: UnitKind,
    root: DieId,
    language: constants::DwLang,
}

impl Unit {
    /// The section offset of this unit's header.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// One past the last byte of this unit.
    pub fn end(&self) -> usize {
        self.end
    }

    /// The DWARF version of this unit.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// The size of addresses (in bytes) in this unit.
    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// Whether this is a compilation or a type unit.
    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    /// The root DIE of this unit.
    pub fn root(&self) -> DieId {
        self.root
    }

    /// The unit's source language, from the root DIE.
    pub fn language(&self) -> constants::DwLang {
        self.language
    }
}

/// All DIEs of one source, eagerly parsed into an arena with parent
/// and child links, plus the section-offset index.
#[derive(Debug)]
pub struct DebugInfo<'input, Endian>
    where Endian: Endianity
{
    source: DieSource,
    debug_str: EndianBuf<'input, Endian>,
    alt_debug_str: EndianBuf<'input, Endian>,
    units: Vec<Unit>,
    dies: Vec<Die<'input>>,
    offset_to_die: HashMap<usize, DieId>,
    signature_to_die: HashMap<u64, DieId>,
}

const MAX_ORIGIN_FOLLOW: usize = 16;

impl<'input, Endian> DebugInfo<'input, Endian>
    where Endian: Endianity
{
    /// Parse every unit of `debug_info` into a DIE arena.
    ///
    /// `debug_abbrev` and `debug_str` are that source's companion
    /// sections; `alt_debug_str` is the alternate file's string table,
    /// for `DW_FORM_GNU_strp_alt` resolution, or empty.
    pub fn parse(source: DieSource,
                 debug_info: EndianBuf<'input, Endian>,
                 debug_abbrev: EndianBuf<'input, Endian>,
                 debug_str: EndianBuf<'input, Endian>,
                 alt_debug_str: EndianBuf<'input, Endian>)
                 -> Result<DebugInfo<'input, Endian>> {
        let mut info = DebugInfo {
            source: source,
            debug_str: debug_str,
            alt_debug_str: alt_debug_str,
            units: Vec::new(),
            dies: Vec::new(),
            offset_to_die: HashMap::new(),
            signature_to_die: HashMap::new(),
        };

        let mut offset = 0;
        while offset < debug_info.len() {
            offset = info.parse_unit(debug_info, debug_abbrev, offset)?;
        }

        if source == DieSource::TypeUnit {
            let mut sigs = HashMap::new();
            for unit in &info.units {
                if let UnitKind::Type { signature, type_offset } = unit.kind {
                    if let Some(&id) = info.offset_to_die.get(&type_offset.0) {
                        sigs.insert(signature, id);
                    }
                }
            }
            info.signature_to_die = sigs;
        }

        Ok(info)
    }

    /// Parse one unit starting at `offset`; return the offset of the
    /// next unit.
    fn parse_unit(&mut self,
                  debug_info: EndianBuf<'input, Endian>,
                  debug_abbrev: EndianBuf<'input, Endian>,
                  offset: usize)
                  -> Result<usize> {
        let input = debug_info.range_from(offset..);
        let (rest, (length, format)) = parse_initial_length(input)?;
        let length = u64_to_offset(length)?;
        if length > rest.len() {
            return Err(Error::UnexpectedEof);
        }
        let unit_end = offset + (input.len() - rest.len()) + length;

        let (rest, version) = parse_u16(rest)?;
        if version < 2 || version > 5 {
            return Err(Error::UnknownVersion(version));
        }

        // DWARF 5 moved the address size before the abbreviation
        // offset and added the unit-type byte.
        let (rest, unit_type, address_size, abbrev_offset) = if version >= 5 {
            let (rest, unit_type) = parse_u8(rest)?;
            let (rest, address_size) = parse_u8(rest)?;
            let (rest, abbrev_offset) = parse_offset(rest, format)?;
            (rest, unit_type, address_size, abbrev_offset)
        } else {
            let (rest, abbrev_offset) = parse_offset(rest, format)?;
            let (rest, address_size) = parse_u8(rest)?;
            (rest, DW_UT_COMPILE, address_size, abbrev_offset)
        };

        let is_type_unit = self.source == DieSource::TypeUnit ||
                           unit_type == DW_UT_TYPE ||
                           unit_type == DW_UT_SPLIT_TYPE;
        let (rest, kind) = if is_type_unit {
            let (rest, signature) = parse_u64(rest)?;
            let (rest, type_offset) = parse_offset(rest, format)?;
            (rest,
             UnitKind::Type {
                 signature: signature,
                 type_offset: DieOffset(offset + type_offset),
             })
        } else {
            (rest, UnitKind::Compilation)
        };

        if unit_end < debug_info.len() - rest.len() {
            return Err(Error::UnitHeaderLengthTooShort);
        }

        let abbrevs = parse_abbreviations(debug_abbrev, abbrev_offset)?;

        let unit_index = self.units.len() as u32;
        self.units.push(Unit {
            offset: offset,
            end: unit_end,
            version: version,
            format: format,
            address_size: address_size,
            abbrev_offset: abbrev_offset,
            kind: kind,
            root: DieId(self.dies.len() as u32),
            language: constants::DwLang(0),
        });

        self.parse_die_tree(debug_info, rest, unit_end, unit_index, &abbrevs)?;

        // The language lives on the root DIE; hoist it onto the unit
        // so every consumer can get at it without chasing parents.
        let root = self.units[unit_index as usize].root;
        if (root.0 as usize) < self.dies.len() {
            if let Some(AttributeValue::Data(lang, _)) =
                self.attr_value(root, constants::DW_AT_language) {
                self.units[unit_index as usize].language = constants::DwLang(lang);
            } else if let Some(AttributeValue::Udata(lang)) =
                self.attr_value(root, constants::DW_AT_language) {
                self.units[unit_index as usize].language = constants::DwLang(lang);
            }
        }

        Ok(unit_end)
    }

    /// Parse the DIE records of one unit, linking parents and children.
    fn parse_die_tree(&mut self,
                      debug_info: EndianBuf<'input, Endian>,
                      mut input: EndianBuf<'input, Endian>,
                      unit_end: usize,
                      unit_index: u32,
                      abbrevs: &Abbreviations)
                      -> Result<()> {
        let unit_offset = self.units[unit_index as usize].offset;
        let format = self.units[unit_index as usize].format;
        let address_size = self.units[unit_index as usize].address_size;

        let mut parent_stack: Vec<DieId> = Vec::new();

        while debug_info.len() - input.len() < unit_end {
            let die_offset = debug_info.len() - input.len();
            let (rest, code) = parse_unsigned_leb(input)?;
            input = rest;

            if code == 0 {
                // A null entry terminates the current sibling chain.
                if parent_stack.pop().is_none() {
                    // Trailing padding after the root's children.
                    break;
                }
                continue;
            }

            let abbrev = match abbrevs.get(code) {
                Some(abbrev) => abbrev,
                None => return Err(Error::UnknownAbbreviation(code)),
            };

            let mut attrs = Vec::with_capacity(abbrev.attributes().len());
            for spec in abbrev.attributes() {
                let (rest, value) = parse_attribute(input,
                                                    *spec,
                                                    unit_offset,
                                                    format,
                                                    address_size)?;
                input = rest;
                attrs.push((spec.name(), value));
            }

            let id = DieId(self.dies.len() as u32);
            let parent = parent_stack.last().cloned();
            self.dies.push(Die {
                offset: DieOffset(die_offset),
                tag: abbrev.tag(),
                unit: unit_index,
                parent: parent,
                children: Vec::new(),
                attrs: attrs,
            });
            self.offset_to_die.insert(die_offset, id);
            if let Some(parent) = parent {
                self.dies[parent.0 as usize].children.push(id);
            }

            if abbrev.has_children() {
                parent_stack.push(id);
            }
        }

        Ok(())
    }

    /// This arena's source.
    pub fn source(&self) -> DieSource {
        self.source
    }

    /// The units of this source, in section order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// The DIE with the given arena index.
    pub fn die(&self, id: DieId) -> &Die<'input> {
        &self.dies[id.0 as usize]
    }

    /// The number of DIEs in the arena.
    pub fn die_count(&self) -> usize {
        self.dies.len()
    }

    /// Find the DIE at the given section-relative offset.
    pub fn die_at_offset(&self, offset: DieOffset) -> Option<DieId> {
        self.offset_to_die.get(&offset.0).cloned()
    }

    /// Find the type DIE with the given type-unit signature.
    pub fn die_for_signature(&self, signature: u64) -> Option<DieId> {
        self.signature_to_die.get(&signature).cloned()
    }

    /// The unit the given DIE belongs to.
    pub fn unit_of(&self, id: DieId) -> &Unit {
        &self.units[self.die(id).unit as usize]
    }

    /// The parent of the given DIE, or `None` for unit roots.
    pub fn parent(&self, id: DieId) -> Option<DieId> {
        self.die(id).parent
    }

    /// The children of the given DIE, in source order.
    pub fn children(&self, id: DieId) -> &[DieId] {
        &self.die(id).children
    }

    /// A resumable cursor over the given DIE's children.
    pub fn child_cursor(&self, id: DieId) -> DieCursor<Endian> {
        DieCursor {
            info: self,
            ids: self.children(id),
            pos: 0,
        }
    }

    /// The raw value of the given attribute, not following origins.
    pub fn attr_value(&self,
                      id: DieId,
                      name: constants::DwAt)
                      -> Option<AttributeValue<'input>> {
        self.die(id)
            .attrs
            .iter()
            .find(|&&(at, _)| at == name)
            .map(|&(_, value)| value)
    }

    /// The value of the given attribute, following
    /// `DW_AT_specification` and `DW_AT_abstract_origin` chains when
    /// the attribute is absent at the site itself.
    pub fn attr_value_with_origin(&self,
                                  id: DieId,
                                  name: constants::DwAt)
                                  -> Option<AttributeValue<'input>> {
        let mut current = id;
        for _ in 0..MAX_ORIGIN_FOLLOW {
            if let Some(value) = self.attr_value(current, name) {
                return Some(value);
            }
            let origin = self.attr_value(current, constants::DW_AT_specification)
                .or_else(|| self.attr_value(current, constants::DW_AT_abstract_origin));
            match origin {
                Some(AttributeValue::UnitRef(offset)) |
                Some(AttributeValue::DebugInfoRef(offset)) => {
                    match self.die_at_offset(offset) {
                        Some(next) => current = next,
                        None => return None,
                    }
                }
                _ => return None,
            }
        }
        None
    }

    /// Resolve a string-like attribute value to its bytes.
    pub fn string_value(&self, value: AttributeValue<'input>) -> Option<&'input str> {
        match value {
            AttributeValue::String(s) => Some(s),
            AttributeValue::DebugStrRef(offset) => {
                self.string_at(self.debug_str, offset)
            }
            AttributeValue::AltDebugStrRef(offset) => {
                self.string_at(self.alt_debug_str, offset)
            }
            _ => None,
        }
    }

    fn string_at(&self,
                 table: EndianBuf<'input, Endian>,
                 offset: usize)
                 -> Option<&'input str> {
        if offset >= table.len() {
            return None;
        }
        parse_null_terminated_string(table.range_from(offset..))
            .ok()
            .map(|(_, s)| s)
    }

    /// `DW_AT_name`, following origins.
    pub fn name(&self, id: DieId) -> Option<&'input str> {
        self.attr_value_with_origin(id, constants::DW_AT_name)
            .and_then(|v| self.string_value(v))
    }

    /// `DW_AT_linkage_name`, falling back to the pre-DWARF-4
    /// `DW_AT_MIPS_linkage_name`, following origins.
    pub fn linkage_name(&self, id: DieId) -> Option<&'input str> {
        self.attr_value_with_origin(id, constants::DW_AT_linkage_name)
            .or_else(|| {
                self.attr_value_with_origin(id, constants::DW_AT_MIPS_linkage_name)
            })
            .and_then(|v| self.string_value(v))
    }

    /// The declaration coordinates (file index, line) of a DIE, when
    /// present.
    pub fn decl_location(&self, id: DieId) -> Option<(u64, u64)> {
        let file = self.unsigned_constant(id, constants::DW_AT_decl_file)?;
        let line = self.unsigned_constant(id, constants::DW_AT_decl_line).unwrap_or(0);
        Some((file, line))
    }

    /// A flag attribute; absent means false.
    pub fn flag(&self, id: DieId, name: constants::DwAt) -> bool {
        match self.attr_value_with_origin(id, name) {
            Some(AttributeValue::Flag(f)) => f,
            Some(AttributeValue::Data(v, _)) |
            Some(AttributeValue::Udata(v)) => v != 0,
            Some(AttributeValue::Sdata(v)) => v != 0,
            _ => false,
        }
    }

    /// A form-aware constant attribute.
    pub fn constant(&self, id: DieId, name: constants::DwAt) -> Option<DieConstant> {
        match self.attr_value_with_origin(id, name) {
            Some(AttributeValue::Sdata(v)) => Some(DieConstant::Signed(v)),
            Some(AttributeValue::Udata(v)) |
            Some(AttributeValue::Data(v, _)) => Some(DieConstant::Unsigned(v)),
            _ => None,
        }
    }

    /// A constant attribute read as unsigned.
    pub fn unsigned_constant(&self, id: DieId, name: constants::DwAt) -> Option<u64> {
        self.constant(id, name).map(|c| c.as_unsigned())
    }

    /// A constant attribute read as signed.
    pub fn signed_constant(&self, id: DieId, name: constants::DwAt) -> Option<i64> {
        self.constant(id, name).map(|c| c.as_signed())
    }

    /// The size of the entity in bits: `DW_AT_byte_size * 8`, else
    /// `DW_AT_bit_size`, else `None`.
    pub fn size_in_bits(&self, id: DieId) -> Option<u64> {
        if let Some(bytes) = self.unsigned_constant(id, constants::DW_AT_byte_size) {
            return Some(bytes * 8);
        }
        self.unsigned_constant(id, constants::DW_AT_bit_size)
    }

    /// An address attribute.
    pub fn address(&self, id: DieId, name: constants::DwAt) -> Option<u64> {
        match self.attr_value_with_origin(id, name) {
            Some(AttributeValue::Addr(addr)) => Some(addr),
            _ => None,
        }
    }

    /// A DIE-reference attribute.
    pub fn die_reference(&self,
                         id: DieId,
                         name: constants::DwAt)
                         -> Option<DieReference> {
        match self.attr_value_with_origin(id, name) {
            Some(AttributeValue::UnitRef(offset)) |
            Some(AttributeValue::DebugInfoRef(offset)) => {
                Some(DieReference::SameSource(offset))
            }
            Some(AttributeValue::AltDebugInfoRef(offset)) => {
                Some(DieReference::Alternate(offset))
            }
            Some(AttributeValue::SignatureRef(sig)) => {
                Some(DieReference::Signature(sig))
            }
            _ => None,
        }
    }

    /// A location-expression attribute: `DW_FORM_exprloc` or a block.
    pub fn expression(&self, id: DieId, name: constants::DwAt) -> Option<&'input [u8]> {
        match self.attr_value_with_origin(id, name) {
            Some(AttributeValue::Exprloc(bytes)) |
            Some(AttributeValue::Block(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// Compare a string attribute across two DIEs without touching the
    /// string bytes when both reference the same `.debug_str` slot.
    pub fn string_attrs_equal(&self,
                              a: DieId,
                              other: &DebugInfo<'input, Endian>,
                              b: DieId,
                              name: constants::DwAt)
                              -> bool {
        let va = self.attr_value_with_origin(a, name);
        let vb = other.attr_value_with_origin(b, name);
        match (va, vb) {
            (None, None) => true,
            (Some(AttributeValue::DebugStrRef(oa)),
             Some(AttributeValue::DebugStrRef(ob)))
                if self.source == other.source => {
                // Same string table, same slot: pointer equality.
                oa == ob ||
                self.string_value(AttributeValue::DebugStrRef(oa)) ==
                other.string_value(AttributeValue::DebugStrRef(ob))
            }
            (Some(va), Some(vb)) => {
                self.string_value(va) == other.string_value(vb)
            }
            _ => false,
        }
    }
}

/// A resumable cursor over a DIE's children.
#[derive(Debug, Clone)]
pub struct DieCursor<'a, 'input, Endian>
    where Endian: Endianity + 'a,
          'input: 'a
{
    info: &'a DebugInfo<'input, Endian>,
    ids: &'a [DieId],
    pos: usize,
}

impl<'a, 'input, Endian> DieCursor<'a, 'input, Endian>
    where Endian: Endianity
{
    /// The next child, advancing the cursor.
    pub fn next(&mut self) -> Option<DieId> {
        if self.pos < self.ids.len() {
            let id = self.ids[self.pos];
            self.pos += 1;
            Some(id)
        } else {
            None
        }
    }

    /// The next child with the given tag, skipping others.
    pub fn next_with_tag(&mut self, tag: constants::DwTag) -> Option<DieId> {
        while let Some(id) = self.next() {
            if self.info.die(id).tag() == tag {
                return Some(id);
            }
        }
        None
    }
}

const DW_UT_COMPILE: u8 = 0x01;
const DW_UT_TYPE: u8 = 0x02;
const DW_UT_SPLIT_TYPE: u8 = 0x06;

/// Parse one attribute value according to its form.
fn parse_attribute<'input, Endian>(input: EndianBuf<'input, Endian>,
                                   spec: AttributeSpecification,
                                   unit_offset: usize,
                                   format: Format,
                                   address_size: u8)
                                   -> Result<(EndianBuf<'input, Endian>,
                                              AttributeValue<'input>)>
    where Endian: Endianity
{
    let mut form = spec.form();
    let mut input = input;

    // `DW_FORM_indirect` carries the real form in the DIE itself.
    while form == constants::DW_FORM_indirect {
        let (rest, real_form) = parse_unsigned_leb(input)?;
        input = rest;
        form = constants::DwForm(real_form);
    }

    match form {
        constants::DW_FORM_addr => {
            let (rest, addr) = parse_address(input, address_size)?;
            Ok((rest, AttributeValue::Addr(addr)))
        }
        constants::DW_FORM_block1 => {
            let (rest, len) = parse_u8(input)?;
            let (rest, block) = take(len as usize, rest)?;
            Ok((rest, AttributeValue::Block(block.into())))
        }
        constants::DW_FORM_block2 => {
            let (rest, len) = parse_u16(input)?;
            let (rest, block) = take(len as usize, rest)?;
            Ok((rest, AttributeValue::Block(block.into())))
        }
        constants::DW_FORM_block4 => {
            let (rest, len) = ::parse::parse_u32(input)?;
            let (rest, block) = take(len as usize, rest)?;
            Ok((rest, AttributeValue::Block(block.into())))
        }
        constants::DW_FORM_block => {
            let (rest, len) = parse_unsigned_leb(input)?;
            let (rest, block) = take(u64_to_offset(len)?, rest)?;
            Ok((rest, AttributeValue::Block(block.into())))
        }
        constants::DW_FORM_data1 => {
            let (rest, data) = parse_u8(input)?;
            Ok((rest, AttributeValue::Data(data as u64, form)))
        }
        constants::DW_FORM_data2 => {
            let (rest, data) = parse_u16(input)?;
            Ok((rest, AttributeValue::Data(data as u64, form)))
        }
        constants::DW_FORM_data4 => {
            let (rest, data) = ::parse::parse_u32(input)?;
            Ok((rest, AttributeValue::Data(data as u64, form)))
        }
        constants::DW_FORM_data8 => {
            let (rest, data) = parse_u64(input)?;
            Ok((rest, AttributeValue::Data(data, form)))
        }
        constants::DW_FORM_data16 => {
            let (rest, block) = take(16, input)?;
            Ok((rest, AttributeValue::Block(block.into())))
        }
        constants::DW_FORM_sdata => {
            let (rest, data) = parse_signed_leb(input)?;
            Ok((rest, AttributeValue::Sdata(data)))
        }
        constants::DW_FORM_udata => {
            let (rest, data) = parse_unsigned_leb(input)?;
            Ok((rest, AttributeValue::Udata(data)))
        }
        constants::DW_FORM_exprloc => {
            let (rest, len) = parse_unsigned_leb(input)?;
            let (rest, block) = take(u64_to_offset(len)?, rest)?;
            Ok((rest, AttributeValue::Exprloc(block.into())))
        }
        constants::DW_FORM_flag => {
            let (rest, flag) = parse_u8(input)?;
            Ok((rest, AttributeValue::Flag(flag != 0)))
        }
        constants::DW_FORM_flag_present => {
            Ok((input, AttributeValue::Flag(true)))
        }
        constants::DW_FORM_sec_offset => {
            let (rest, offset) = parse_word(input, format)?;
            Ok((rest, AttributeValue::SecOffset(offset)))
        }
        constants::DW_FORM_ref1 => {
            let (rest, value) = parse_u8(input)?;
            Ok((rest,
                AttributeValue::UnitRef(DieOffset(unit_offset + value as usize))))
        }
        constants::DW_FORM_ref2 => {
            let (rest, value) = parse_u16(input)?;
            Ok((rest,
                AttributeValue::UnitRef(DieOffset(unit_offset + value as usize))))
        }
        constants::DW_FORM_ref4 => {
            let (rest, value) = ::parse::parse_u32(input)?;
            Ok((rest,
                AttributeValue::UnitRef(DieOffset(unit_offset + value as usize))))
        }
        constants::DW_FORM_ref8 => {
            let (rest, value) = parse_u64(input)?;
            Ok((rest,
                AttributeValue::UnitRef(DieOffset(unit_offset +
                                                  u64_to_offset(value)?))))
        }
        constants::DW_FORM_ref_udata => {
            let (rest, value) = parse_unsigned_leb(input)?;
            Ok((rest,
                AttributeValue::UnitRef(DieOffset(unit_offset +
                                                  u64_to_offset(value)?))))
        }
        constants::DW_FORM_ref_addr => {
            let (rest, offset) = parse_offset(input, format)?;
            Ok((rest, AttributeValue::DebugInfoRef(DieOffset(offset))))
        }
        constants::DW_FORM_GNU_ref_alt => {
            let (rest, offset) = parse_offset(input, format)?;
            Ok((rest, AttributeValue::AltDebugInfoRef(DieOffset(offset))))
        }
        constants::DW_FORM_ref_sig8 => {
            let (rest, sig) = parse_u64(input)?;
            Ok((rest, AttributeValue::SignatureRef(sig)))
        }
        constants::DW_FORM_string => {
            let (rest, s) = parse_null_terminated_string(input)?;
            Ok((rest, AttributeValue::String(s)))
        }
        constants::DW_FORM_strp => {
            let (rest, offset) = parse_offset(input, format)?;
            Ok((rest, AttributeValue::DebugStrRef(offset)))
        }
        constants::DW_FORM_GNU_strp_alt => {
            let (rest, offset) = parse_offset(input, format)?;
            Ok((rest, AttributeValue::AltDebugStrRef(offset)))
        }
        constants::DW_FORM_line_strp => {
            let (rest, offset) = parse_offset(input, format)?;
            Ok((rest, AttributeValue::LineStrRef(offset)))
        }
        constants::DW_FORM_strp_sup |
        constants::DW_FORM_ref_sup4 => {
            let (rest, value) = ::parse::parse_u32(input)?;
            Ok((rest, AttributeValue::Index(value as u64, form)))
        }
        constants::DW_FORM_ref_sup8 => {
            let (rest, value) = parse_u64(input)?;
            Ok((rest, AttributeValue::Index(value, form)))
        }
        constants::DW_FORM_strx |
        constants::DW_FORM_addrx |
        constants::DW_FORM_loclistx |
        constants::DW_FORM_rnglistx => {
            let (rest, index) = parse_unsigned_leb(input)?;
            Ok((rest, AttributeValue::Index(index, form)))
        }
        constants::DW_FORM_strx1 | constants::DW_FORM_addrx1 => {
            let (rest, index) = parse_u8(input)?;
            Ok((rest, AttributeValue::Index(index as u64, form)))
        }
        constants::DW_FORM_strx2 | constants::DW_FORM_addrx2 => {
            let (rest, index) = parse_u16(input)?;
            Ok((rest, AttributeValue::Index(index as u64, form)))
        }
        constants::DW_FORM_strx3 | constants::DW_FORM_addrx3 => {
            let (rest, bytes) = take(3, input)?;
            let mut index = 0u64;
            for i in 0..3 {
                let shift = if Endian::is_big_endian() { 2 - i } else { i };
                index |= (bytes[i] as u64) << (shift * 8);
            }
            Ok((rest, AttributeValue::Index(index, form)))
        }
        constants::DW_FORM_strx4 | constants::DW_FORM_addrx4 => {
            let (rest, index) = ::parse::parse_u32(input)?;
            Ok((rest, AttributeValue::Index(index as u64, form)))
        }
        constants::DW_FORM_implicit_const => {
            Ok((input, AttributeValue::Sdata(spec.implicit_const_value())))
        }
        otherwise => Err(Error::UnknownForm(otherwise)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constants;
    use endianity::{EndianBuf, LittleEndian};
    use test_util::{TestAttr, TestDie, TestDwarf};

    fn parse(dwarf: &TestDwarf) -> DebugInfo<LittleEndian> {
        DebugInfo::parse(DieSource::Primary,
                         EndianBuf::new(dwarf.debug_info()),
                         EndianBuf::new(dwarf.debug_abbrev()),
                         EndianBuf::new(dwarf.debug_str()),
                         EndianBuf::new(&[]))
            .expect("should parse")
    }

    #[test]
    fn test_parse_simple_unit() {
        let mut dwarf = TestDwarf::new();
        dwarf.compile_unit(constants::DW_LANG_C99,
                           TestDie::new(constants::DW_TAG_compile_unit)
                               .attr(constants::DW_AT_name, TestAttr::Str("a.c"))
                               .child(TestDie::new(constants::DW_TAG_base_type)
                                   .attr(constants::DW_AT_name, TestAttr::Str("int"))
                                   .attr(constants::DW_AT_byte_size,
                                         TestAttr::Data1(4))));
        let dwarf = dwarf.build();
        let info = parse(&dwarf);

        assert_eq!(info.units().len(), 1);
        let unit = &info.units()[0];
        assert_eq!(unit.version(), 4);
        assert_eq!(unit.language(), constants::DW_LANG_C99);

        let root = unit.root();
        assert_eq!(info.die(root).tag(), constants::DW_TAG_compile_unit);
        assert_eq!(info.name(root), Some("a.c"));

        let children = info.children(root);
        assert_eq!(children.len(), 1);
        let base = children[0];
        assert_eq!(info.die(base).tag(), constants::DW_TAG_base_type);
        assert_eq!(info.name(base), Some("int"));
        assert_eq!(info.size_in_bits(base), Some(32));
        assert_eq!(info.parent(base), Some(root));
    }

    #[test]
    fn test_die_at_offset_roundtrip() {
        let mut dwarf = TestDwarf::new();
        dwarf.compile_unit(constants::DW_LANG_C99,
                           TestDie::new(constants::DW_TAG_compile_unit)
                               .child(TestDie::new(constants::DW_TAG_base_type)
                                   .attr(constants::DW_AT_name, TestAttr::Str("int"))));
        let dwarf = dwarf.build();
        let info = parse(&dwarf);

        for idx in 0..info.die_count() {
            let id = DieId(idx as u32);
            let offset = info.die(id).offset();
            assert_eq!(info.die_at_offset(offset), Some(id));
        }
    }

    #[test]
    fn test_reference_attr() {
        let mut dwarf = TestDwarf::new();
        dwarf.compile_unit(constants::DW_LANG_C99,
                           TestDie::new(constants::DW_TAG_compile_unit)
                               .child(TestDie::new(constants::DW_TAG_base_type)
                                   .label("int")
                                   .attr(constants::DW_AT_name, TestAttr::Str("int")))
                               .child(TestDie::new(constants::DW_TAG_pointer_type)
                                   .attr(constants::DW_AT_type, TestAttr::Ref("int"))));
        let dwarf = dwarf.build();
        let info = parse(&dwarf);

        let root = info.units()[0].root();
        let ptr = info.children(root)[1];
        let target = match info.die_reference(ptr, constants::DW_AT_type) {
            Some(DieReference::SameSource(offset)) => offset,
            otherwise => panic!("Unexpected reference: {:?}", otherwise),
        };
        let target = info.die_at_offset(target).expect("referenced DIE");
        assert_eq!(info.name(target), Some("int"));
    }

    #[test]
    fn test_attr_value_with_origin() {
        let mut dwarf = TestDwarf::new();
        dwarf.compile_unit(constants::DW_LANG_C_plus_plus,
                           TestDie::new(constants::DW_TAG_compile_unit)
                               .child(TestDie::new(constants::DW_TAG_subprogram)
                                   .label("decl")
                                   .attr(constants::DW_AT_name, TestAttr::Str("m")))
                               .child(TestDie::new(constants::DW_TAG_subprogram)
                                   .attr(constants::DW_AT_specification,
                                         TestAttr::Ref("decl"))
                                   .attr(constants::DW_AT_linkage_name,
                                         TestAttr::Str("_Z1mv"))));
        let dwarf = dwarf.build();
        let info = parse(&dwarf);

        let root = info.units()[0].root();
        let clone = info.children(root)[1];
        // The name is only present on the referenced declaration.
        assert_eq!(info.name(clone), Some("m"));
        assert_eq!(info.linkage_name(clone), Some("_Z1mv"));
    }

    #[test]
    fn test_flag_and_constants() {
        let mut dwarf = TestDwarf::new();
        dwarf.compile_unit(constants::DW_LANG_C99,
                           TestDie::new(constants::DW_TAG_compile_unit)
                               .child(TestDie::new(constants::DW_TAG_structure_type)
                                   .attr(constants::DW_AT_declaration,
                                         TestAttr::Flag(true))
                                   .attr(constants::DW_AT_byte_size,
                                         TestAttr::Data1(8)))
                               .child(TestDie::new(constants::DW_TAG_enumerator)
                                   .attr(constants::DW_AT_const_value,
                                         TestAttr::Sdata(-3))));
        let dwarf = dwarf.build();
        let info = parse(&dwarf);

        let root = info.units()[0].root();
        let strukt = info.children(root)[0];
        assert!(info.flag(strukt, constants::DW_AT_declaration));
        assert_eq!(info.size_in_bits(strukt), Some(64));

        let enumerator = info.children(root)[1];
        assert_eq!(info.constant(enumerator, constants::DW_AT_const_value),
                   Some(DieConstant::Signed(-3)));
    }

    #[test]
    fn test_child_cursor() {
        let mut dwarf = TestDwarf::new();
        dwarf.compile_unit(constants::DW_LANG_C99,
                           TestDie::new(constants::DW_TAG_compile_unit)
                               .child(TestDie::new(constants::DW_TAG_base_type))
                               .child(TestDie::new(constants::DW_TAG_variable))
                               .child(TestDie::new(constants::DW_TAG_base_type)));
        let dwarf = dwarf.build();
        let info = parse(&dwarf);

        let root = info.units()[0].root();
        let mut cursor = info.child_cursor(root);
        assert!(cursor.next_with_tag(constants::DW_TAG_variable).is_some());
        assert!(cursor.next_with_tag(constants::DW_TAG_variable).is_none());

        let mut cursor = info.child_cursor(root);
        let mut count = 0;
        while cursor.next().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
