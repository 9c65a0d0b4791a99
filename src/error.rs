//! Error types.
//!
//! Both types are raised through `anyhow`, so callers that care about the
//! category can `downcast_ref` to them.

use std::fmt;

/// Malformed object file input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Fewer bytes than a header needs.
    TooShort { needed: usize, available: usize },
    InvalidMagic(i32),
    UnsupportedVersion(u16),
    UnknownAtomType(u8),
    /// Input ended in the middle of the named field.
    Truncated(&'static str),
    InvalidUtf8(&'static str),
    ReferenceOutOfRange { index: u32, count: usize },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { needed, available } => {
                write!(f, "object file too short: need {needed} bytes, have {available}")
            }
            Self::InvalidMagic(magic) => write!(f, "invalid magic number: {magic:#010x}"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported object file version: {v}"),
            Self::UnknownAtomType(t) => write!(f, "unknown atom type: {t}"),
            Self::Truncated(field) => write!(f, "unexpected end of input reading {field}"),
            Self::InvalidUtf8(field) => write!(f, "{field} is not valid UTF-8"),
            Self::ReferenceOutOfRange { index, count } => {
                write!(f, "reference to atom {index} out of range ({count} atoms)")
            }
        }
    }
}

impl std::error::Error for FormatError {}

/// Failure while merging, laying out or patching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    InconsistentOrigin { expected: u64, found: u64 },
    MultipleMain(String),
    DuplicateAtom(String),
    TypeMismatch { name: String, first: &'static str, second: &'static str },
    LocalReference { procedure: String, target: String },
    Undefined(Vec<String>),
    NoMain,
    OutOfRange { site: u64, target: u64, limit: &'static str },
    UnsupportedAddressType(u8),
    PatchOutOfBounds { procedure: String, site: u64 },
    /// An address computed for the named atom does not fit in 64 bits.
    AddressOverflow(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InconsistentOrigin { expected, found } => {
                write!(f, "inconsistent origin: {expected:#x} and {found:#x}")
            }
            Self::MultipleMain(name) => write!(f, "multiple main procedures ('{name}')"),
            Self::DuplicateAtom(name) => write!(f, "multiple atoms named '{name}'"),
            Self::TypeMismatch { name, first, second } => {
                write!(f, "'{name}' ({first}) and '{name}' ({second}) not the same type")
            }
            Self::LocalReference { procedure, target } => write!(
                f,
                "'{procedure}' referencing local atom '{target}' from another object file"
            ),
            Self::Undefined(names) => write!(f, "undefined atoms: {}", names.join(", ")),
            Self::NoMain => write!(f, "no main procedure"),
            Self::OutOfRange { site, target, limit } => write!(
                f,
                "target {target:#x} out of {limit} range from {site:#x}"
            ),
            Self::UnsupportedAddressType(t) => write!(f, "address mode {t} not supported"),
            Self::PatchOutOfBounds { procedure, site } => {
                write!(f, "patch site {site:#x} in '{procedure}' lies outside the image")
            }
            Self::AddressOverflow(name) => {
                write!(f, "address of '{name}' overflows the address space")
            }
        }
    }
}

impl std::error::Error for LinkError {}
