//! Symbol resolution across object files.
//!
//! `SymbolTable` folds input files into one combined set of atoms, keyed by
//! name. Definitions replace placeholders, placeholders never replace
//! definitions, and two definitions of one name are an error. References are
//! not copied while atoms are being added: a reference's target may be a
//! placeholder that a later file replaces. `finish` rebuilds every reference
//! against the final atom list.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;

use crate::atom::{Atom, AtomId, ObjectFile, Reference, ReferenceTarget};
use crate::error::LinkError;

/// An atom in the combined set, tagged with the input file it was copied from.
struct Slot {
    atom: Atom,
    file_index: usize,
}

#[derive(Default)]
pub struct SymbolTable {
    origin: Option<u64>,
    /// Insertion-ordered; a replaced placeholder leaves a hole.
    slots: Vec<Option<Slot>>,
    by_name: HashMap<String, usize>,
    main: Option<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the atoms of one input file. `file_index` identifies the file in
    /// the list later passed to `finish`.
    pub fn add_file(&mut self, file_index: usize, file: &ObjectFile) -> Result<()> {
        match (self.origin, file.origin) {
            (None, Some(origin)) => self.origin = Some(origin),
            (Some(expected), Some(found)) if expected != found => {
                bail!(LinkError::InconsistentOrigin { expected, found })
            }
            _ => {}
        }

        for atom in &file.atoms {
            self.add_atom(file_index, atom)?;
        }
        Ok(())
    }

    fn add_atom(&mut self, file_index: usize, atom: &Atom) -> Result<()> {
        if atom.is_main() && self.main.is_some() {
            bail!(LinkError::MultipleMain(atom.name.clone()));
        }

        let existing_slot = self.by_name.get(&atom.name).copied();
        let Some(slot) = existing_slot else {
            tracing::debug!("Adding {} '{}' from file {}", atom.kind_name(), atom.name, file_index);
            self.insert(file_index, atom);
            return Ok(());
        };
        let existing = match &self.slots[slot] {
            Some(existing) => &existing.atom,
            None => bail!("atom '{}' lost from symbol table", atom.name),
        };

        if existing.is_defined && atom.is_defined {
            bail!(LinkError::DuplicateAtom(atom.name.clone()));
        }
        if !existing.same_kind(atom) {
            bail!(LinkError::TypeMismatch {
                name: atom.name.clone(),
                first: existing.kind_name(),
                second: atom.kind_name(),
            });
        }
        if !atom.is_defined {
            tracing::debug!("Skipping placeholder '{}' from file {}", atom.name, file_index);
            return Ok(());
        }

        tracing::debug!("Replacing placeholder '{}' with definition from file {}", atom.name, file_index);
        self.slots[slot] = None;
        if self.main == Some(slot) {
            self.main = None;
        }
        self.insert(file_index, atom);
        Ok(())
    }

    fn insert(&mut self, file_index: usize, atom: &Atom) {
        let slot = self.slots.len();
        if atom.is_main() {
            self.main = Some(slot);
        }
        self.by_name.insert(atom.name.clone(), slot);
        self.slots.push(Some(Slot { atom: atom.detached(), file_index }));
    }

    /// Produce the combined object file. `files` must be the same list, in
    /// the same order, that was passed to `add_file`.
    pub fn finish(self, files: &[ObjectFile]) -> Result<ObjectFile> {
        let mut combined = ObjectFile::new(self.origin);
        let mut file_of = Vec::new();
        let mut slot_ids = vec![None; self.slots.len()];

        for (slot, entry) in self.slots.into_iter().enumerate() {
            if let Some(Slot { atom, file_index }) = entry {
                slot_ids[slot] = Some(combined.push(atom));
                file_of.push(file_index);
            }
        }

        let lookup = |name: &str| -> Result<AtomId> {
            self.by_name
                .get(name)
                .and_then(|&slot| slot_ids[slot])
                .with_context(|| format!("'{}' missing from merged object file", name))
        };

        for file in files {
            for atom in file.atoms.iter().filter(|atom| atom.is_defined) {
                let Some(proc) = atom.as_procedure() else {
                    continue;
                };
                let owner = lookup(&atom.name)?;
                let mut references = Vec::with_capacity(proc.references.len());

                for reference in &proc.references {
                    let target = match reference.target {
                        ReferenceTarget::Local(offset) => ReferenceTarget::Local(offset),
                        ReferenceTarget::Global(id) => {
                            let source = file.get(id).with_context(|| {
                                format!("'{}' references missing atom {}", atom.name, id)
                            })?;
                            let target = lookup(&source.name)?;
                            if !combined.atoms[target.0].is_global
                                && file_of[owner.0] != file_of[target.0]
                            {
                                bail!(LinkError::LocalReference {
                                    procedure: atom.name.clone(),
                                    target: source.name.clone(),
                                });
                            }
                            ReferenceTarget::Global(target)
                        }
                    };
                    references.push(Reference { target, ..*reference });
                }

                if let Some(merged) = combined.atoms[owner.0].as_procedure_mut() {
                    merged.references = references;
                }
            }
        }

        Ok(combined)
    }
}

/// Merge `files` left to right into a single object file.
pub fn merge(files: &[ObjectFile]) -> Result<ObjectFile> {
    let mut table = SymbolTable::new();
    for (file_index, file) in files.iter().enumerate() {
        table.add_file(file_index, file)?;
    }
    table.finish(files)
}
