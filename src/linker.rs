//! Core Linker logic.
//!
//! This module contains the `Linker` struct which orchestrates the entire linking process:
//! 1. Input Loading: Reads Atom object files.
//! 2. Symbol Resolution: Merges every input into one combined object file.
//! 3. Verification: Every atom is defined and there is a main procedure.
//! 4. Layout: Places the atoms reachable from main and assigns addresses.
//! 5. Relocation: Patches instruction words based on atom addresses.

use anyhow::{bail, Context, Result};
use std::io::Write;

use crate::arch::arm::Arm;
use crate::arch::Architecture;
use crate::atom::{Atom, AtomId, ObjectFile, ReferenceTarget};
use crate::error::LinkError;
use crate::layout::Layout;
use crate::reader::read_object;
use crate::symbol::{self, SymbolTable};

pub struct Linker<A: Architecture> {
    arch: A,
    input_objects: Vec<ObjectFile>,
    input_paths: Vec<String>,
}

/// The result of a successful link.
#[derive(Debug, Clone)]
pub struct Linked {
    /// Every input merged into one, including atoms that were not placed.
    pub file: ObjectFile,
    pub layout: Layout,
}

impl Linked {
    pub fn image(&self) -> &[u8] {
        &self.layout.image
    }

    pub fn address_of(&self, id: AtomId) -> Option<u64> {
        self.layout.address_of(id)
    }

    /// Placed atoms in image order, with their addresses.
    pub fn map(&self) -> impl Iterator<Item = (u64, &Atom)> {
        self.layout
            .placements
            .iter()
            .map(|placement| (placement.address, &self.file.atoms[placement.atom.0]))
    }
}

impl<A: Architecture> Linker<A> {
    pub fn new(arch: A) -> Self {
        Self { arch, input_objects: Vec::new(), input_paths: Vec::new() }
    }

    pub fn add_file(&mut self, path: impl Into<String>, file: ObjectFile) {
        self.input_objects.push(file);
        self.input_paths.push(path.into());
    }

    /// Parse an object file image and queue it for linking.
    pub fn add_bytes(&mut self, path: impl Into<String>, data: &[u8]) -> Result<()> {
        let path = path.into();
        let file = read_object(data).with_context(|| format!("failed to parse {}", path))?;
        tracing::debug!("Loaded {} ({} atoms)", path, file.len());
        self.add_file(path, file);
        Ok(())
    }

    pub fn merge(&self) -> Result<ObjectFile> {
        let mut table = SymbolTable::new();
        for (file_index, file) in self.input_objects.iter().enumerate() {
            table
                .add_file(file_index, file)
                .with_context(|| format!("while merging {}", self.input_paths[file_index]))?;
        }
        table.finish(&self.input_objects)
    }

    pub fn link(&self) -> Result<Linked> {
        let file = self.merge()?;
        let main = verify(&file)?;
        let mut layout = Layout::new(&file, main, file.origin.unwrap_or(0))?;
        self.relocate(&file, &mut layout)?;
        tracing::debug!(
            "Laid out {} of {} atoms, {} bytes",
            layout.placements.len(),
            file.len(),
            layout.image.len()
        );
        Ok(Linked { file, layout })
    }

    fn relocate(&self, file: &ObjectFile, layout: &mut Layout) -> Result<()> {
        for index in 0..layout.placements.len() {
            let placement = layout.placements[index];
            let atom = &file.atoms[placement.atom.0];
            let overflow = || LinkError::AddressOverflow(atom.name.clone());
            let Some(proc) = atom.as_procedure() else { continue };

            for reference in &proc.references {
                let target = match reference.target {
                    ReferenceTarget::Global(id) => layout.address_of(id).with_context(|| {
                        format!("'{}' references an atom that was not placed", atom.name)
                    })?,
                    ReferenceTarget::Local(offset) => placement
                        .address
                        .checked_add(offset as u64)
                        .ok_or_else(overflow)?,
                };
                let site = placement
                    .address
                    .checked_add(reference.address as u64)
                    .ok_or_else(overflow)?;
                let offset = placement.offset + reference.address as usize;
                if offset + 4 > layout.image.len() {
                    bail!(LinkError::PatchOutOfBounds { procedure: atom.name.clone(), site });
                }
                self.arch
                    .apply_relocation(reference.address_type, site, target, offset, &mut layout.image)
                    .with_context(|| format!("while patching '{}'", atom.name))?;
            }
        }
        Ok(())
    }
}

/// Checks that `file` is ready for layout and returns its main procedure.
fn verify(file: &ObjectFile) -> Result<AtomId> {
    let undefined: Vec<String> = file.undefined().map(|atom| atom.name.clone()).collect();
    if !undefined.is_empty() {
        bail!(LinkError::Undefined(undefined));
    }
    match file.main_procedure() {
        Some(main) => Ok(main),
        None => bail!(LinkError::NoMain),
    }
}

/// Merge `files` left to right into a single object file.
pub fn merge(files: &[ObjectFile]) -> Result<ObjectFile> {
    symbol::merge(files)
}

/// Link `files` for ARM and write the image to `destination`. Nothing is
/// written unless linking succeeds.
pub fn link<W: Write>(files: &[ObjectFile], destination: &mut W) -> Result<Linked> {
    let mut linker = Linker::new(Arm);
    for (index, file) in files.iter().enumerate() {
        linker.add_file(format!("<input {}>", index), file.clone());
    }
    let linked = linker.link()?;
    destination.write_all(linked.image()).context("failed to write image")?;
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{AddressType, Reference};
    use crate::writer::write_object;

    fn link_error(files: &[ObjectFile]) -> LinkError {
        let err = link(files, &mut Vec::new()).unwrap_err();
        err.downcast_ref::<LinkError>().cloned().expect("expected a LinkError")
    }

    #[test]
    fn single_byte_main() {
        let mut file = ObjectFile::new(None);
        file.push(Atom::main("Proc", vec![0xAA]));
        let mut out = Vec::new();
        link(&[file], &mut out).unwrap();
        assert_eq!(out, vec![0xAA]);
    }

    #[test]
    fn unreachable_atoms_get_no_address() {
        let mut file = ObjectFile::new(None);
        let x = file.push(Atom::data("X", vec![1, 2, 3, 4]));
        let y = file.push(Atom::data("Y", vec![5, 6, 7, 8]));
        file.push(
            Atom::main("main", vec![0xE5, 0x9F, 0x00, 0x00])
                .with_reference(Reference::global(AddressType::ArmOffset12, 0, x)),
        );

        let mut out = Vec::new();
        let linked = link(&[file], &mut out).unwrap();
        assert_eq!(out, vec![0xE5, 0x9F, 0x00, 0x04, 1, 2, 3, 4]);
        assert_eq!(linked.address_of(x), Some(4));
        assert_eq!(linked.address_of(y), None);
        assert_eq!(linked.file.len(), 3);
    }

    fn offset12_at_distance(distance: usize) -> ObjectFile {
        let mut file = ObjectFile::new(None);
        let mut code = vec![0; distance];
        code[..4].copy_from_slice(&[0xE5, 0x9F, 0x00, 0x00]);
        let data = AtomId(1);
        file.push(
            Atom::main("main", code)
                .with_reference(Reference::global(AddressType::ArmOffset12, 0, data)),
        );
        file.push(Atom::data("far", vec![0; 4]));
        file
    }

    #[test]
    fn offset12_limit() {
        let mut out = Vec::new();
        link(&[offset12_at_distance(4095)], &mut out).unwrap();
        assert_eq!(&out[..4], &[0xE5, 0x9F, 0x0F, 0xFF]);

        assert!(matches!(
            link_error(&[offset12_at_distance(4096)]),
            LinkError::OutOfRange { site: 0, target: 4096, .. }
        ));
    }

    #[test]
    fn local_reference_and_origin() {
        let mut file = ObjectFile::new(Some(0x8000));
        file.push(
            Atom::main("main", vec![0xEA, 0, 0, 0, 0, 0, 0, 0, 0xE5, 0x9F, 0, 0])
                .with_reference(Reference::local(AddressType::ArmOffset12, 8, 0)),
        );
        let mut out = Vec::new();
        link(&[file], &mut out).unwrap();
        // load 8 bytes backwards: U bit cleared
        assert_eq!(&out[8..], &[0xE5, 0x1F, 0x00, 0x08]);
    }

    #[test]
    fn branch_between_files() {
        let mut a = ObjectFile::new(None);
        let callee = a.push(Atom::external_procedure("callee"));
        a.push(
            Atom::main("main", vec![0xEB, 0, 0, 0])
                .with_reference(Reference::global(AddressType::ArmTargetAddress, 0, callee)),
        );
        let mut b = ObjectFile::new(None);
        b.push(Atom::procedure("callee", vec![0xE1, 0x2F, 0xFF, 0x1E]));

        let mut out = Vec::new();
        let linked = link(&[a, b], &mut out).unwrap();
        // site 0, target 4: ((0 + 4 - 8) >> 2) & 0xFFFFFF
        assert_eq!(out, vec![0xEB, 0xFF, 0xFF, 0xFF, 0xE1, 0x2F, 0xFF, 0x1E]);
        let names: Vec<_> = linked.map().map(|(addr, atom)| (addr, atom.name.as_str())).collect();
        assert_eq!(names, vec![(0, "main"), (4, "callee")]);
    }

    #[test]
    fn branch_at_high_origin() {
        let mut file = ObjectFile::new(Some(0x7FFF_FFFF_FFFF_FF00));
        file.push(
            Atom::main("main", vec![0xEB, 0, 0, 0, 0xE1, 0x2F, 0xFF, 0x1E])
                .with_reference(Reference::local(AddressType::ArmTargetAddress, 0, 4)),
        );
        let mut out = Vec::new();
        link(&[file], &mut out).unwrap();
        assert_eq!(&out[..4], &[0xEB, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn data_past_end_of_memory() {
        let mut file = ObjectFile::new(Some(u64::MAX));
        let data = AtomId(1);
        file.push(
            Atom::main("main", vec![0xAA])
                .with_reference(Reference::global(AddressType::ArmOffset12, 0, data)),
        );
        file.push(Atom::data("data", vec![0xBB]));
        assert_eq!(link_error(&[file]), LinkError::AddressOverflow("data".into()));
    }

    #[test]
    fn local_target_past_end_of_memory() {
        let mut file = ObjectFile::new(Some(u64::MAX - 3));
        file.push(
            Atom::main("main", vec![0xE5, 0x9F, 0, 0])
                .with_reference(Reference::local(AddressType::ArmOffset12, 0, 8)),
        );
        assert_eq!(link_error(&[file]), LinkError::AddressOverflow("main".into()));
    }

    #[test]
    fn undefined_atoms_are_listed_together() {
        let mut file = ObjectFile::new(None);
        file.push(Atom::main("main", vec![0]));
        file.push(Atom::external_data("a"));
        file.push(Atom::external_string("b"));
        assert_eq!(
            link_error(&[file]),
            LinkError::Undefined(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn requires_main() {
        let mut file = ObjectFile::new(None);
        file.push(Atom::procedure("f", vec![0]));
        assert_eq!(link_error(&[file]), LinkError::NoMain);
    }

    #[test]
    fn unsupported_address_type() {
        let mut file = ObjectFile::new(None);
        file.push(
            Atom::main("main", vec![0; 4])
                .with_reference(Reference::local(AddressType::Other(9), 0, 0)),
        );
        assert_eq!(link_error(&[file]), LinkError::UnsupportedAddressType(9));
    }

    #[test]
    fn patch_past_end_of_image() {
        let mut file = ObjectFile::new(None);
        file.push(
            Atom::main("main", vec![0; 4])
                .with_reference(Reference::local(AddressType::ArmOffset12, 2, 0)),
        );
        assert_eq!(
            link_error(&[file]),
            LinkError::PatchOutOfBounds { procedure: "main".into(), site: 2 }
        );
    }

    #[test]
    fn links_from_object_bytes() {
        let mut file = ObjectFile::new(None);
        file.push(Atom::main("main", vec![0xAA, 0xBB]));
        let mut bytes = Vec::new();
        write_object(&file, &mut bytes).unwrap();

        let mut linker = Linker::new(Arm);
        linker.add_bytes("main.o", &bytes).unwrap();
        assert_eq!(linker.link().unwrap().image(), &[0xAA, 0xBB]);
        assert!(linker.add_bytes("junk.o", b"junk").is_err());
    }
}
