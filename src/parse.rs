//! The crate-wide error type and the primitive section readers that
//! every higher layer is built from.

use std::error;
use std::fmt::{self, Debug};
use std::io;
use std::result;
use std::str;

use constants;
use endianity::{Endianity, EndianBuf};
use leb128;

/// An error that occurred while reading a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An error parsing an unsigned LEB128 value.
    BadUnsignedLeb128,
    /// An error parsing a signed LEB128 value.
    BadSignedLeb128,
    /// An abbreviation declared that its tag is zero, but zero is reserved for
    /// null records.
    AbbreviationTagZero,
    /// An attribute specification declared that its form is zero, but zero is
    /// reserved for null records.
    AttributeFormZero,
    /// The abbreviation's has-children byte was not one of
    /// `DW_CHILDREN_{yes,no}`.
    BadHasChildren,
    /// Found an unknown `DW_FORM_*` type.
    UnknownForm(constants::DwForm),
    /// Found an abbreviation code that has already been used.
    DuplicateAbbreviationCode,
    /// Found an unknown reserved length value.
    UnknownReservedLength,
    /// Found an unknown DWARF version.
    UnknownVersion(u16),
    /// The unit header's claimed length is too short to even hold the header
    /// itself.
    UnitHeaderLengthTooShort,
    /// Found a record with an unknown abbreviation code.
    UnknownAbbreviation(u64),
    /// Hit the end of input before it was expected.
    UnexpectedEof,
    /// The specified address size is not supported.
    UnsupportedAddressSize(u8),
    /// An offset value was larger than the maximum supported value.
    UnsupportedOffset,
    /// Found an invalid UTF-8 string.
    BadUtf8,
    /// A DIE reference pointed outside every unit of its source.
    InvalidDieReference,
    /// The primary file carries no `.debug_info` section.
    DebugInfoNotFound,
    /// `.gnu_debugaltlink` names a file that cannot be located under any
    /// configured debug-info root path.
    AltDebugInfoNotFound,
    /// Neither a symbol table nor a dynamic symbol table is present.
    NoSymbolsFound,
    /// The input is not an ELF file.
    NotAnElfFile,
    /// The ELF class byte is neither ELFCLASS32 nor ELFCLASS64.
    UnsupportedElfClass(u8),
    /// The ELF data-encoding byte is neither LSB nor MSB.
    UnsupportedElfEncoding(u8),
    /// A section header references a string table slot that does not exist.
    BadSectionName,
    /// A symbol's name offset points outside its string table.
    BadSymbolName,
    /// Neither ksymtab probe resolved the section's first entry.
    UnsupportedKsymtabFormat,
    /// A DWARF expression contains an opcode outside the supported subset.
    UnsupportedOpcode(constants::DwOp),
    /// Invalid branch target for a `DW_OP_bra` or `DW_OP_skip`.
    BadBranchTarget(usize),
    /// Not enough items on the stack when evaluating an expression.
    NotEnoughStackItems,
    /// Too many iterations to compute the expression.
    TooManyIterations,
    /// Division or modulus by zero when evaluating an expression.
    DivisionByZero,
    /// An I/O error occurred while opening or mapping a binary.
    Io(io::ErrorKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        Debug::fmt(self, f)
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        match *self {
            Error::BadUnsignedLeb128 => "An error parsing an unsigned LEB128 value",
            Error::BadSignedLeb128 => "An error parsing a signed LEB128 value",
            Error::AbbreviationTagZero => {
                "An abbreviation declared that its tag is zero,
                 but zero is reserved for null records"
            }
            Error::AttributeFormZero => {
                "An attribute specification declared that its form is zero,
                 but zero is reserved for null records"
            }
            Error::BadHasChildren => {
                "The abbreviation's has-children byte was not one of
                 `DW_CHILDREN_{yes,no}`"
            }
            Error::UnknownForm(_) => "Found an unknown `DW_FORM_*` type",
            Error::DuplicateAbbreviationCode => {
                "Found an abbreviation code that has already been used"
            }
            Error::UnknownReservedLength => "Found an unknown reserved length value",
            Error::UnknownVersion(_) => "Found an unknown DWARF version",
            Error::UnitHeaderLengthTooShort => {
                "The unit header's claimed length is too short to even hold
                 the header itself"
            }
            Error::UnknownAbbreviation(_) => "Found a record with an unknown abbreviation code",
            Error::UnexpectedEof => "Hit the end of input before it was expected",
            Error::UnsupportedAddressSize(_) => "The specified address size is not supported",
            Error::UnsupportedOffset => {
                "An offset value was larger than the maximum supported value"
            }
            Error::BadUtf8 => "Found an invalid UTF-8 string.",
            Error::InvalidDieReference => {
                "A DIE reference pointed outside every unit of its source"
            }
            Error::DebugInfoNotFound => "The primary file carries no `.debug_info` section",
            Error::AltDebugInfoNotFound => {
                "`.gnu_debugaltlink` names a file that cannot be located under
                 any configured debug-info root path"
            }
            Error::NoSymbolsFound => {
                "Neither a symbol table nor a dynamic symbol table is present"
            }
            Error::NotAnElfFile => "The input is not an ELF file",
            Error::UnsupportedElfClass(_) => {
                "The ELF class byte is neither ELFCLASS32 nor ELFCLASS64"
            }
            Error::UnsupportedElfEncoding(_) => {
                "The ELF data-encoding byte is neither LSB nor MSB"
            }
            Error::BadSectionName => {
                "A section header references a string table slot that does not exist"
            }
            Error::BadSymbolName => "A symbol's name offset points outside its string table",
            Error::UnsupportedKsymtabFormat => {
                "Neither ksymtab probe resolved the section's first entry"
            }
            Error::UnsupportedOpcode(_) => {
                "A DWARF expression contains an opcode outside the supported subset"
            }
            Error::BadBranchTarget(_) => "Invalid branch target in DWARF expression",
            Error::NotEnoughStackItems => "Not enough items on stack when evaluating expression",
            Error::TooManyIterations => "Too many iterations to evaluate DWARF expression",
            Error::DivisionByZero => "Division or modulus by zero when evaluating expression",
            Error::Io(_) => "An I/O error occurred while opening or mapping a binary",
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e.kind())
    }
}

/// The result of a read.
pub type Result<T> = result::Result<T, Error>;

/// Whether the format of a compilation unit is 32- or 64-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// 64-bit DWARF
    Dwarf64,
    /// 32-bit DWARF
    Dwarf32,
}

/// Parse a `u8` from the input.
#[inline]
pub fn parse_u8<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, u8)>
    where Endian: Endianity
{
    if input.is_empty() {
        Err(Error::UnexpectedEof)
    } else {
        Ok((input.range_from(1..), input[0]))
    }
}

/// Parse an `i8` from the input.
#[inline]
pub fn parse_i8<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, i8)>
    where Endian: Endianity
{
    let (rest, value) = parse_u8(input)?;
    Ok((rest, value as i8))
}

/// Parse a `u16` from the input.
#[inline]
pub fn parse_u16<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, u16)>
    where Endian: Endianity
{
    if input.len() < 2 {
        Err(Error::UnexpectedEof)
    } else {
        Ok((input.range_from(2..), Endian::read_u16(&input)))
    }
}

/// Parse an `i16` from the input.
#[inline]
pub fn parse_i16<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, i16)>
    where Endian: Endianity
{
    let (rest, value) = parse_u16(input)?;
    Ok((rest, value as i16))
}

/// Parse a `u32` from the input.
#[inline]
pub fn parse_u32<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, u32)>
    where Endian: Endianity
{
    if input.len() < 4 {
        Err(Error::UnexpectedEof)
    } else {
        Ok((input.range_from(4..), Endian::read_u32(&input)))
    }
}

/// Parse an `i32` from the input.
#[inline]
pub fn parse_i32<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, i32)>
    where Endian: Endianity
{
    let (rest, value) = parse_u32(input)?;
    Ok((rest, value as i32))
}

/// Parse a `u64` from the input.
#[inline]
pub fn parse_u64<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, u64)>
    where Endian: Endianity
{
    if input.len() < 8 {
        Err(Error::UnexpectedEof)
    } else {
        Ok((input.range_from(8..), Endian::read_u64(&input)))
    }
}

/// Parse an `i64` from the input.
#[inline]
pub fn parse_i64<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, i64)>
    where Endian: Endianity
{
    let (rest, value) = parse_u64(input)?;
    Ok((rest, value as i64))
}

/// Parse a `u32` from the input and return it as a `u64`.
#[inline]
pub fn parse_u32_as_u64<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, u64)>
    where Endian: Endianity
{
    let (rest, value) = parse_u32(input)?;
    Ok((rest, value as u64))
}

/// Convert a `u64` to a `usize` and return it.
#[inline]
pub fn u64_to_offset(offset64: u64) -> Result<usize> {
    let offset = offset64 as usize;
    if offset as u64 == offset64 {
        Ok(offset)
    } else {
        Err(Error::UnsupportedOffset)
    }
}

/// Parse a word-sized integer according to the DWARF format, and return it as
/// a `u64`.
#[inline]
pub fn parse_word<Endian>(input: EndianBuf<Endian>,
                          format: Format)
                          -> Result<(EndianBuf<Endian>, u64)>
    where Endian: Endianity
{
    match format {
        Format::Dwarf32 => parse_u32_as_u64(input),
        Format::Dwarf64 => parse_u64(input),
    }
}

/// Parse a word-sized integer according to the DWARF format, and return it as
/// a `usize`.
#[inline]
pub fn parse_offset<Endian>(input: EndianBuf<Endian>,
                            format: Format)
                            -> Result<(EndianBuf<Endian>, usize)>
    where Endian: Endianity
{
    let (rest, offset) = parse_word(input, format)?;
    let offset = u64_to_offset(offset)?;
    Ok((rest, offset))
}

/// Parse an address-sized integer, and return it as a `u64`.
#[inline]
pub fn parse_address<Endian>(input: EndianBuf<Endian>,
                             address_size: u8)
                             -> Result<(EndianBuf<Endian>, u64)>
    where Endian: Endianity
{
    if input.len() < address_size as usize {
        Err(Error::UnexpectedEof)
    } else {
        let address = match address_size {
            8 => Endian::read_u64(&input),
            4 => Endian::read_u32(&input) as u64,
            2 => Endian::read_u16(&input) as u64,
            1 => input[0] as u64,
            otherwise => return Err(Error::UnsupportedAddressSize(otherwise)),
        };
        Ok((input.range_from(address_size as usize..), address))
    }
}

/// Parse an unsigned LEB128 encoded integer.
#[inline]
pub fn parse_unsigned_leb<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, u64)>
    where Endian: Endianity
{
    let mut bytes: &[u8] = input.into();
    match leb128::read::unsigned(&mut bytes) {
        Ok(val) => Ok((EndianBuf::new(bytes), val)),
        Err(leb128::read::Error::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::UnexpectedEof)
        }
        Err(_) => Err(Error::BadUnsignedLeb128),
    }
}

/// Parse a signed LEB128 encoded integer.
#[inline]
pub fn parse_signed_leb<Endian>(input: EndianBuf<Endian>) -> Result<(EndianBuf<Endian>, i64)>
    where Endian: Endianity
{
    let mut bytes: &[u8] = input.into();
    match leb128::read::signed(&mut bytes) {
        Ok(val) => Ok((EndianBuf::new(bytes), val)),
        Err(leb128::read::Error::IoError(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::UnexpectedEof)
        }
        Err(_) => Err(Error::BadSignedLeb128),
    }
}

/// Parse an unsigned LEB128 encoded integer and return it as a `usize`.
#[inline]
pub fn parse_uleb_as_offset<Endian>(input: EndianBuf<Endian>)
                                    -> Result<(EndianBuf<Endian>, usize)>
    where Endian: Endianity
{
    let (rest, offset) = parse_unsigned_leb(input)?;
    let offset = u64_to_offset(offset)?;
    Ok((rest, offset))
}

/// Parse a null-terminated string from the input, checking it is valid UTF-8.
#[inline]
pub fn parse_null_terminated_string<Endian>(input: EndianBuf<Endian>)
                                            -> Result<(EndianBuf<Endian>, &str)>
    where Endian: Endianity
{
    let bytes: &[u8] = input.into();
    let null_idx = bytes.iter().position(|ch| *ch == 0);

    if let Some(idx) = null_idx {
        let s = str::from_utf8(&bytes[0..idx]).map_err(|_| Error::BadUtf8)?;
        Ok((input.range_from(idx + 1..), s))
    } else {
        Err(Error::UnexpectedEof)
    }
}

const MAX_DWARF_32_UNIT_LENGTH: u64 = 0xfffffff0;

const DWARF_64_INITIAL_UNIT_LENGTH: u64 = 0xffffffff;

/// Parse a unit header's initial length, distinguishing 32- from 64-bit
/// DWARF.
pub fn parse_initial_length<Endian>(input: EndianBuf<Endian>)
                                    -> Result<(EndianBuf<Endian>, (u64, Format))>
    where Endian: Endianity
{
    let (rest, val) = parse_u32_as_u64(input)?;
    if val < MAX_DWARF_32_UNIT_LENGTH {
        Ok((rest, (val, Format::Dwarf32)))
    } else if val == DWARF_64_INITIAL_UNIT_LENGTH {
        let (rest, val) = parse_u64(rest)?;
        Ok((rest, (val, Format::Dwarf64)))
    } else {
        Err(Error::UnknownReservedLength)
    }
}

/// Take a slice of size `bytes` from the input.
#[inline]
pub fn take<Endian>(bytes: usize,
                    input: EndianBuf<Endian>)
                    -> Result<(EndianBuf<Endian>, EndianBuf<Endian>)>
    where Endian: Endianity
{
    if input.len() < bytes {
        Err(Error::UnexpectedEof)
    } else {
        Ok((input.range_from(bytes..), input.range_to(..bytes)))
    }
}
