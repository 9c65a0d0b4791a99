//! Output writers.
//!
//! `write_object` serializes an `ObjectFile` in the layout decoded by
//! `reader::read_object`. `write_image` emits a linked binary.

use anyhow::{Context, Result};
use object::endian::{I32Bytes, LittleEndian as LE, U16Bytes, U32Bytes, U64Bytes};
use object::pod::bytes_of;
use std::io::Write;
use std::path::Path;

use crate::atom::{Atom, AtomKind, ObjectFile, ReferenceTarget};
use crate::reader::{MAGIC, TAG_DATA, TAG_PROCEDURE, TAG_STRING, VERSION};

fn u16(v: u16) -> U16Bytes<LE> {
    U16Bytes::new(LE, v)
}
fn u32(v: u32) -> U32Bytes<LE> {
    U32Bytes::new(LE, v)
}
fn i32(v: i32) -> I32Bytes<LE> {
    I32Bytes::new(LE, v)
}
fn u64(v: u64) -> U64Bytes<LE> {
    U64Bytes::new(LE, v)
}

/// Serialize `file` to `out`.
///
/// # Panics
///
/// If a global reference names an atom that is not part of `file`, or if a
/// length does not fit its field (code and data lengths are `u32`, a
/// procedure's reference count is `u16`).
pub fn write_object<W: Write>(file: &ObjectFile, out: &mut W) -> Result<()> {
    let mut buffer = Vec::new();

    buffer.extend_from_slice(bytes_of(&i32(MAGIC)));
    buffer.extend_from_slice(bytes_of(&u16(VERSION)));
    buffer.push(file.origin.is_some() as u8);
    buffer.extend_from_slice(bytes_of(&u64(file.origin.unwrap_or(0))));

    for atom in &file.atoms {
        write_atom(file, atom, &mut buffer);
    }

    out.write_all(&buffer).context("failed to write object file")?;
    Ok(())
}

fn write_atom(file: &ObjectFile, atom: &Atom, buffer: &mut Vec<u8>) {
    let tag = match atom.kind {
        AtomKind::Procedure(_) => TAG_PROCEDURE,
        AtomKind::String(_) => TAG_STRING,
        AtomKind::Data(_) => TAG_DATA,
    };
    buffer.push(tag);
    buffer.push(atom.is_defined as u8);
    buffer.push(atom.is_global as u8);
    write_string(&atom.name, buffer);

    match &atom.kind {
        AtomKind::Procedure(proc) => {
            buffer.push(proc.is_main as u8);
            buffer.extend_from_slice(bytes_of(&u32(field_len(&atom.name, "code", proc.code.len()))));
            buffer.extend_from_slice(&proc.code);
            let count = u16::try_from(proc.references.len()).unwrap_or_else(|_| {
                panic!(
                    "'{}' has {} references, more than an object file can hold",
                    atom.name,
                    proc.references.len()
                )
            });
            buffer.extend_from_slice(bytes_of(&u16(count)));
            for reference in &proc.references {
                let target = match reference.target {
                    ReferenceTarget::Global(id) => {
                        assert!(
                            id.index() < file.len(),
                            "'{}' references atom {} which is not in the object file",
                            atom.name,
                            id
                        );
                        id.index() as u32
                    }
                    ReferenceTarget::Local(offset) => offset,
                };
                buffer.push(reference.is_global() as u8);
                buffer.push(reference.address_type.to_u8());
                buffer.extend_from_slice(bytes_of(&u32(reference.address)));
                buffer.extend_from_slice(bytes_of(&u32(target)));
            }
        }
        AtomKind::String(content) => write_string(content, buffer),
        AtomKind::Data(content) => {
            buffer.extend_from_slice(bytes_of(&u32(field_len(&atom.name, "data", content.len()))));
            buffer.extend_from_slice(content);
        }
    }
}

fn field_len(name: &str, field: &str, len: usize) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| {
        panic!("'{}' has {} bytes of {}, more than an object file can hold", name, len, field)
    })
}

fn write_string(value: &str, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(value.as_bytes());
    buffer.push(0);
}

/// Write a linked image to disk.
pub fn write_image(output_path: &Path, image: &[u8]) -> Result<()> {
    std::fs::write(output_path, image)
        .with_context(|| format!("failed to write {}", output_path.display()))?;
    Ok(())
}
