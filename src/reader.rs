//! Atom object file reader.
//!
//! The format is little-endian throughout:
//!
//! ```text
//! magic       i32   "atom"
//! version     u16   1
//! has_origin  u8
//! origin      u64   present even when has_origin is 0
//! atoms...          until end of input
//! ```
//!
//! Each atom starts with a type tag, its flags and a NUL-terminated name,
//! followed by a body specific to the tag. Procedures list their references
//! last; a global reference names its target by index in the atom list, and
//! that target may appear later in the file. References are therefore
//! collected raw during the atom pass and resolved once every atom is known.

use anyhow::Result;
use object::endian::{I32Bytes, LittleEndian as LE, U16Bytes, U32Bytes, U64Bytes};
use object::read::Bytes;

use crate::atom::{AddressType, Atom, AtomId, AtomKind, ObjectFile, Procedure, Reference};
use crate::error::FormatError;

/// "atom" read as a little-endian i32.
pub const MAGIC: i32 = 0x6D6F_7461;
pub const VERSION: u16 = 1;
/// Minimum number of bytes accepted before any field is decoded.
pub const HEADER_SIZE: usize = 14;

pub const TAG_PROCEDURE: u8 = 0;
pub const TAG_STRING: u8 = 1;
pub const TAG_DATA: u8 = 2;

/// A reference as it appears on disk, before its target is looked up.
struct RawReference {
    owner: AtomId,
    is_global: bool,
    address_type: u8,
    address: u32,
    target: u32,
}

/// Decode an object file from `data`.
pub fn read_object(data: &[u8]) -> Result<ObjectFile> {
    Ok(parse(data)?)
}

fn parse(data: &[u8]) -> Result<ObjectFile, FormatError> {
    if data.len() < HEADER_SIZE {
        return Err(FormatError::TooShort { needed: HEADER_SIZE, available: data.len() });
    }
    let mut input = Bytes(data);

    let magic = read_i32(&mut input, "magic")?;
    if magic != MAGIC {
        return Err(FormatError::InvalidMagic(magic));
    }
    let version = read_u16(&mut input, "version")?;
    if version != VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    let has_origin = read_bool(&mut input, "has_origin")?;
    let origin = read_u64(&mut input, "origin")?;

    let mut file = ObjectFile::new(has_origin.then_some(origin));
    let mut raw_references = Vec::new();

    while !input.is_empty() {
        let tag = read_u8(&mut input, "atom type")?;
        if !matches!(tag, TAG_PROCEDURE | TAG_STRING | TAG_DATA) {
            return Err(FormatError::UnknownAtomType(tag));
        }
        let is_defined = read_bool(&mut input, "is_defined")?;
        let is_global = read_bool(&mut input, "is_global")?;
        let name = read_string(&mut input, "name")?;
        let owner = AtomId(file.len());

        let kind = match tag {
            TAG_PROCEDURE => {
                let is_main = read_bool(&mut input, "is_main")?;
                let code_len = read_u32(&mut input, "code length")?;
                let code = read_bytes(&mut input, code_len, "code")?;
                let count = read_u16(&mut input, "reference count")?;
                for _ in 0..count {
                    raw_references.push(RawReference {
                        owner,
                        is_global: read_bool(&mut input, "reference is_global")?,
                        address_type: read_u8(&mut input, "reference address type")?,
                        address: read_u32(&mut input, "reference address")?,
                        target: read_u32(&mut input, "reference target")?,
                    });
                }
                AtomKind::Procedure(Procedure { code, is_main, references: Vec::new() })
            }
            TAG_STRING => AtomKind::String(read_string(&mut input, "string content")?),
            _ => {
                let len = read_u32(&mut input, "data length")?;
                AtomKind::Data(read_bytes(&mut input, len, "data content")?)
            }
        };

        file.push(Atom { name, is_defined, is_global, kind });
    }

    resolve_references(&mut file, raw_references)?;
    Ok(file)
}

fn resolve_references(file: &mut ObjectFile, raw: Vec<RawReference>) -> Result<(), FormatError> {
    let count = file.len();
    for raw in raw {
        let address_type = AddressType::from_u8(raw.address_type);
        let reference = if raw.is_global {
            if raw.target as usize >= count {
                return Err(FormatError::ReferenceOutOfRange { index: raw.target, count });
            }
            Reference::global(address_type, raw.address, AtomId(raw.target as usize))
        } else {
            Reference::local(address_type, raw.address, raw.target)
        };
        // The owner was pushed as a procedure by the atom pass.
        if let Some(proc) = file.atoms[raw.owner.0].as_procedure_mut() {
            proc.references.push(reference);
        }
    }
    Ok(())
}

fn read_u8(input: &mut Bytes<'_>, field: &'static str) -> Result<u8, FormatError> {
    input.read::<u8>().map(|v| *v).map_err(|()| FormatError::Truncated(field))
}

fn read_bool(input: &mut Bytes<'_>, field: &'static str) -> Result<bool, FormatError> {
    read_u8(input, field).map(|v| v != 0)
}

fn read_u16(input: &mut Bytes<'_>, field: &'static str) -> Result<u16, FormatError> {
    input.read::<U16Bytes<LE>>().map(|v| v.get(LE)).map_err(|()| FormatError::Truncated(field))
}

fn read_u32(input: &mut Bytes<'_>, field: &'static str) -> Result<u32, FormatError> {
    input.read::<U32Bytes<LE>>().map(|v| v.get(LE)).map_err(|()| FormatError::Truncated(field))
}

fn read_i32(input: &mut Bytes<'_>, field: &'static str) -> Result<i32, FormatError> {
    input.read::<I32Bytes<LE>>().map(|v| v.get(LE)).map_err(|()| FormatError::Truncated(field))
}

fn read_u64(input: &mut Bytes<'_>, field: &'static str) -> Result<u64, FormatError> {
    input.read::<U64Bytes<LE>>().map(|v| v.get(LE)).map_err(|()| FormatError::Truncated(field))
}

fn read_bytes(input: &mut Bytes<'_>, len: u32, field: &'static str) -> Result<Vec<u8>, FormatError> {
    input
        .read_bytes(len as usize)
        .map(|bytes| bytes.0.to_vec())
        .map_err(|()| FormatError::Truncated(field))
}

fn read_string(input: &mut Bytes<'_>, field: &'static str) -> Result<String, FormatError> {
    let raw = input.read_string().map_err(|()| FormatError::Truncated(field))?;
    String::from_utf8(raw.to_vec()).map_err(|_| FormatError::InvalidUtf8(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(origin: Option<u64>) -> Vec<u8> {
        let mut bytes = vec![0x61, 0x74, 0x6F, 0x6D, 0x01, 0x00];
        bytes.push(origin.is_some() as u8);
        bytes.extend_from_slice(&origin.unwrap_or(0).to_le_bytes());
        bytes
    }

    fn format_error(data: &[u8]) -> FormatError {
        let err = read_object(data).unwrap_err();
        err.downcast_ref::<FormatError>().cloned().expect("expected a FormatError")
    }

    #[test]
    fn empty_file_without_origin() {
        let file = read_object(&header(None)).unwrap();
        assert_eq!(file.len(), 0);
        assert_eq!(file.origin, None);
    }

    #[test]
    fn origin_is_kept_when_flagged() {
        let file = read_object(&header(Some(0x8000))).unwrap();
        assert_eq!(file.origin, Some(0x8000));
    }

    #[test]
    fn rejects_short_input() {
        let data = header(None);
        assert_eq!(
            format_error(&data[..13]),
            FormatError::TooShort { needed: 14, available: 13 }
        );
        // 14 bytes pass the size check but the origin field is cut short.
        assert_eq!(format_error(&data[..14]), FormatError::Truncated("origin"));
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut data = header(None);
        data[0] = b'x';
        assert!(matches!(format_error(&data), FormatError::InvalidMagic(_)));

        let mut data = header(None);
        data[4] = 2;
        assert_eq!(format_error(&data), FormatError::UnsupportedVersion(2));
    }

    #[test]
    fn rejects_unknown_tag() {
        let mut data = header(None);
        data.push(3);
        assert_eq!(format_error(&data), FormatError::UnknownAtomType(3));
    }

    #[test]
    fn reports_truncated_field() {
        let mut data = header(None);
        data.extend_from_slice(&[TAG_DATA, 1, 1, b'd', 0]);
        data.extend_from_slice(&10u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3]);
        assert_eq!(format_error(&data), FormatError::Truncated("data content"));

        let mut data = header(None);
        data.extend_from_slice(&[TAG_STRING, 1, 1, b'n', b'a']);
        assert_eq!(format_error(&data), FormatError::Truncated("name"));
    }

    #[test]
    fn forward_reference_resolves() {
        let mut data = header(None);
        // procedure "p" referencing atom 1, which follows it
        data.extend_from_slice(&[TAG_PROCEDURE, 1, 1, b'p', 0, 1]);
        data.extend_from_slice(&4u32.to_le_bytes());
        data.extend_from_slice(&[0xEB, 0, 0, 0]);
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&[1, 0]);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&[TAG_STRING, 1, 0, b's', 0, b'h', b'i', 0]);

        let file = read_object(&data).unwrap();
        assert_eq!(file.len(), 2);
        let proc = file.atoms[0].as_procedure().unwrap();
        assert!(proc.is_main);
        assert_eq!(
            proc.references,
            vec![Reference::global(AddressType::ArmTargetAddress, 0, AtomId(1))]
        );
        assert_eq!(file.atoms[1].kind, AtomKind::String("hi".into()));
        assert!(!file.atoms[1].is_global);
    }

    #[test]
    fn rejects_reference_past_atom_table() {
        let mut data = header(None);
        data.extend_from_slice(&[TAG_PROCEDURE, 1, 1, b'p', 0, 0]);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&[1, 1]);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&5u32.to_le_bytes());
        assert_eq!(
            format_error(&data),
            FormatError::ReferenceOutOfRange { index: 5, count: 1 }
        );
    }
}
