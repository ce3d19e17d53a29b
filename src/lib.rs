//! `abiread` reads an ELF binary's DWARF debug information and builds
//! a language-independent representation of the binary's ABI: an
//! ordered set of translation units carrying namespaces, types and
//! declarations, bound to the binary's exported and undefined ELF
//! symbols.
//!
//! Types are canonicalized structurally while reading: two
//! structurally equal types end up sharing one canonical
//! representative, so type equality degenerates to identity and the
//! resulting corpus is cheap to diff against another binary's.
//!
//! The main entry point is [`reader::read_corpus_from_elf`]; callers
//! that already hold the section bytes can use
//! [`reader::read_corpus_from_sections`] instead.
//!
//! ```no_run
//! use abiread::ir::Environment;
//! use abiread::reader::{read_corpus_from_elf, ReadOptions};
//!
//! let mut env = Environment::new();
//! let opts = ReadOptions::default();
//! let corpus = read_corpus_from_elf("/usr/lib64/libfoo.so".as_ref(),
//!                                   &mut env,
//!                                   &opts)
//!     .unwrap();
//! for tu in corpus.translation_units() {
//!     println!("{}", tu.path());
//! }
//! ```

#![deny(missing_docs)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
extern crate leb128;
extern crate memmap2;

pub mod abbrev;
pub mod canon;
pub mod compare;
pub mod constants;
pub mod die;
pub mod dwarf;
pub mod elf;
pub mod endianity;
pub mod expr;
pub mod ir;
pub mod names;
pub mod parse;
pub mod reader;
pub mod symbols;

#[cfg(test)]
mod test_util;

pub use endianity::{BigEndian, Endianity, EndianBuf, LittleEndian, NativeEndian};
pub use ir::{Corpus, Environment};
pub use parse::{Error, Result};
pub use reader::{ReadOptions, read_corpus_from_elf, read_corpus_from_sections};
