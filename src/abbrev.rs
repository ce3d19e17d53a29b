//! Parsing of the `.debug_abbrev` section.

use std::collections::hash_map;

use constants;
use endianity::{Endianity, EndianBuf};
use parse::{Error, Result, parse_unsigned_leb, parse_signed_leb};

/// The description of an attribute in an abbreviated type. It is a pair of
/// name and form, plus the constant value for `DW_FORM_implicit_const`
/// attributes, whose value lives in the abbreviation rather than the DIE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpecification {
    name: constants::DwAt,
    form: constants::DwForm,
    implicit_const_value: i64,
}

impl AttributeSpecification {
    /// Construct a new `AttributeSpecification` from the given name and form.
    pub fn new(name: constants::DwAt,
               form: constants::DwForm)
               -> AttributeSpecification {
        AttributeSpecification {
            name: name,
            form: form,
            implicit_const_value: 0,
        }
    }

    /// Get the attribute's name.
    pub fn name(&self) -> constants::DwAt {
        self.name
    }

    /// Get the attribute's form.
    pub fn form(&self) -> constants::DwForm {
        self.form
    }

    /// Get the constant value carried by a `DW_FORM_implicit_const`
    /// specification.
    pub fn implicit_const_value(&self) -> i64 {
        self.implicit_const_value
    }
}

/// An abbreviation describes the shape of a DIE: its code, tag,
/// whether it has children, and its set of attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviation {
    code: u64,
    tag: constants::DwTag,
    has_children: bool,
    attributes: Vec<AttributeSpecification>,
}

impl Abbreviation {
    /// Construct a new `Abbreviation`.
    ///
    /// ### Panics
    ///
    /// Panics if `code` is `0`.
    pub fn new(code: u64,
               tag: constants::DwTag,
               has_children: bool,
               attributes: Vec<AttributeSpecification>)
               -> Abbreviation {
        assert!(code != 0);
        Abbreviation {
            code: code,
            tag: tag,
            has_children: has_children,
            attributes: attributes,
        }
    }

    /// Get this abbreviation's code.
    pub fn code(&self) -> u64 {
        self.code
    }

    /// Get this abbreviation's tag.
    pub fn tag(&self) -> constants::DwTag {
        self.tag
    }

    /// Return true if this abbreviation's type has children, false otherwise.
    pub fn has_children(&self) -> bool {
        self.has_children
    }

    /// Get this abbreviation's attributes.
    pub fn attributes(&self) -> &[AttributeSpecification] {
        &self.attributes[..]
    }
}

/// A set of abbreviations, as read from one `.debug_abbrev` contribution.
#[derive(Debug, Clone, Default)]
pub struct Abbreviations {
    abbrevs: hash_map::HashMap<u64, Abbreviation>,
}

impl Abbreviations {
    /// Construct a new, empty set of abbreviations.
    pub fn new() -> Abbreviations {
        Abbreviations { abbrevs: hash_map::HashMap::new() }
    }

    /// Insert an abbreviation into the set.
    ///
    /// Returns `Ok` if it is the first abbreviation in the set with its code,
    /// `Err` if the code is a duplicate.
    fn insert(&mut self, abbrev: Abbreviation) -> ::std::result::Result<(), ()> {
        match self.abbrevs.entry(abbrev.code) {
            hash_map::Entry::Occupied(_) => Err(()),
            hash_map::Entry::Vacant(entry) => {
                entry.insert(abbrev);
                Ok(())
            }
        }
    }

    /// Get the abbreviation with the given code.
    pub fn get(&self, code: u64) -> Option<&Abbreviation> {
        self.abbrevs.get(&code)
    }
}

/// Parse the abbreviations at the given offset of the `.debug_abbrev`
/// section, up to and including the terminating null abbreviation.
pub fn parse_abbreviations<Endian>(debug_abbrev: EndianBuf<Endian>,
                                   offset: usize)
                                   -> Result<Abbreviations>
    where Endian: Endianity
{
    if offset > debug_abbrev.len() {
        return Err(Error::UnexpectedEof);
    }
    let mut input = debug_abbrev.range_from(offset..);
    let mut abbrevs = Abbreviations::new();

    loop {
        let (rest, code) = parse_unsigned_leb(input)?;
        input = rest;
        if code == 0 {
            return Ok(abbrevs);
        }

        let (rest, tag) = parse_unsigned_leb(input)?;
        if tag == 0 {
            return Err(Error::AbbreviationTagZero);
        }
        let tag = constants::DwTag(tag);

        let (rest, has_children) = ::parse::parse_u8(rest)?;
        let has_children = match constants::DwChildren(has_children) {
            constants::DW_CHILDREN_yes => true,
            constants::DW_CHILDREN_no => false,
            _ => return Err(Error::BadHasChildren),
        };

        let mut attributes = Vec::new();
        input = rest;
        loop {
            let (rest, name) = parse_unsigned_leb(input)?;
            let (rest, form) = parse_unsigned_leb(rest)?;
            input = rest;
            if name == 0 && form == 0 {
                break;
            }
            if name == 0 || form == 0 {
                return Err(if name == 0 {
                    Error::AbbreviationTagZero
                } else {
                    Error::AttributeFormZero
                });
            }
            let mut spec = AttributeSpecification::new(constants::DwAt(name),
                                                       constants::DwForm(form));
            if spec.form == constants::DW_FORM_implicit_const {
                let (rest, value) = parse_signed_leb(input)?;
                input = rest;
                spec.implicit_const_value = value;
            }
            attributes.push(spec);
        }

        let abbrev = Abbreviation::new(code, tag, has_children, attributes);
        if abbrevs.insert(abbrev).is_err() {
            return Err(Error::DuplicateAbbreviationCode);
        }
    }
}
