//! Layout management.
//!
//! Only atoms reachable from the main procedure end up in the image. They are
//! found by a depth-first walk over global references: a procedure is placed,
//! then each of its references in order; a referenced procedure has its whole
//! subgraph placed before the walk continues with the next reference. Atoms
//! are packed back to back starting at the origin.

use anyhow::{bail, Result};

use crate::atom::{AtomId, AtomKind, ObjectFile, ReferenceTarget};
use crate::error::LinkError;

/// The final position of one atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub atom: AtomId,
    /// Runtime address of the atom's first byte.
    pub address: u64,
    /// Position of the atom's first byte within the image.
    pub offset: usize,
    /// Bytes written, including a string's terminator.
    pub len: usize,
}

/// Placed atoms and the bytes they occupy.
#[derive(Debug, Clone)]
pub struct Layout {
    pub origin: u64,
    /// Placements in image order.
    pub placements: Vec<Placement>,
    /// Indexed by `AtomId`; `None` for atoms that were not reached.
    slots: Vec<Option<usize>>,
    pub image: Vec<u8>,
}

impl Layout {
    /// Lay out everything reachable from `entry` in `file`.
    pub fn new(file: &ObjectFile, entry: AtomId, origin: u64) -> Result<Self> {
        let mut layout = Self {
            origin,
            placements: Vec::new(),
            slots: vec![None; file.len()],
            image: Vec::new(),
        };
        for id in walk(file, entry) {
            layout.place(file, id)?;
        }
        Ok(layout)
    }

    fn place(&mut self, file: &ObjectFile, id: AtomId) -> Result<()> {
        let offset = self.image.len();
        let Some(address) = self.origin.checked_add(offset as u64) else {
            bail!(LinkError::AddressOverflow(file.atoms[id.0].name.clone()));
        };
        match &file.atoms[id.0].kind {
            AtomKind::Procedure(proc) => self.image.extend_from_slice(&proc.code),
            AtomKind::Data(content) => self.image.extend_from_slice(content),
            AtomKind::String(content) => {
                self.image.extend_from_slice(content.as_bytes());
                self.image.push(0);
            }
        }
        let placement = Placement {
            atom: id,
            address,
            offset,
            len: self.image.len() - offset,
        };
        tracing::debug!(
            "Placed {} '{}' at {:#x} ({} bytes)",
            file.atoms[id.0].kind_name(),
            file.atoms[id.0].name,
            placement.address,
            placement.len
        );
        self.slots[id.0] = Some(self.placements.len());
        self.placements.push(placement);
        Ok(())
    }

    pub fn placement(&self, id: AtomId) -> Option<&Placement> {
        let index = (*self.slots.get(id.0)?)?;
        self.placements.get(index)
    }

    pub fn address_of(&self, id: AtomId) -> Option<u64> {
        self.placement(id).map(|placement| placement.address)
    }

    pub fn is_placed(&self, id: AtomId) -> bool {
        self.placement(id).is_some()
    }
}

/// Atoms reachable from `entry`, in placement order. Each atom appears once,
/// so reference cycles terminate.
pub fn walk(file: &ObjectFile, entry: AtomId) -> Vec<AtomId> {
    let mut visited = vec![false; file.len()];
    let mut order = vec![entry];
    // (procedure, index of the next reference to follow)
    let mut stack = vec![(entry, 0usize)];
    visited[entry.0] = true;

    while let Some(frame) = stack.last_mut() {
        let (id, next) = *frame;
        frame.1 += 1;

        let references = match file.atoms[id.0].as_procedure() {
            Some(proc) => &proc.references,
            None => {
                stack.pop();
                continue;
            }
        };
        let Some(reference) = references.get(next) else {
            stack.pop();
            continue;
        };
        let ReferenceTarget::Global(target) = reference.target else { continue };
        if visited[target.0] {
            continue;
        }
        visited[target.0] = true;
        order.push(target);
        if file.atoms[target.0].as_procedure().is_some() {
            stack.push((target, 0));
        }
    }
    order
}
