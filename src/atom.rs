//! Atom object model.
//!
//! An object file is an ordered list of atoms. Each atom is a named unit of
//! code, data, or string content. Procedures additionally carry a list of
//! references: sites inside their code that must be patched once the final
//! address of the referenced thing is known.
//!
//! Atoms are stored in an arena (`ObjectFile::atoms`) and referred to by
//! `AtomId`, which is simply the position in that list.

use std::fmt;

/// Index of an atom inside the `ObjectFile` that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub usize);

impl AtomId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a resolved address is encoded into the instruction word at a patch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressType {
    /// 24-bit word offset of a `B`/`BL` instruction.
    ArmTargetAddress,
    /// 12-bit immediate offset of a `LDR`/`STR` instruction, with the U bit.
    ArmOffset12,
    /// An encoding this toolchain does not know. Kept so it survives a
    /// read/write cycle; linking rejects it.
    Other(u8),
}

impl AddressType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AddressType::ArmTargetAddress,
            1 => AddressType::ArmOffset12,
            other => AddressType::Other(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            AddressType::ArmTargetAddress => 0,
            AddressType::ArmOffset12 => 1,
            AddressType::Other(other) => other,
        }
    }
}

/// What a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// Another atom of the same object file.
    Global(AtomId),
    /// A byte offset inside the owning procedure's own code.
    Local(u32),
}

/// A relocation site inside a procedure's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub address_type: AddressType,
    /// Offset within the owning procedure's code of the instruction word to patch.
    pub address: u32,
    pub target: ReferenceTarget,
}

impl Reference {
    pub fn global(address_type: AddressType, address: u32, target: AtomId) -> Self {
        Self { address_type, address, target: ReferenceTarget::Global(target) }
    }

    pub fn local(address_type: AddressType, address: u32, offset: u32) -> Self {
        Self { address_type, address, target: ReferenceTarget::Local(offset) }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.target, ReferenceTarget::Global(_))
    }
}

/// Machine code plus the relocations inside it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Procedure {
    pub code: Vec<u8>,
    /// Marks the program entry point.
    pub is_main: bool,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomKind {
    Procedure(Procedure),
    /// Null-terminated string. The terminator is not part of `content`.
    String(String),
    Data(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    pub name: String,
    /// False for placeholders standing in for an atom defined elsewhere.
    pub is_defined: bool,
    /// Visible to other object files during linking.
    pub is_global: bool,
    pub kind: AtomKind,
}

impl Atom {
    pub fn procedure(name: impl Into<String>, code: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            is_defined: true,
            is_global: true,
            kind: AtomKind::Procedure(Procedure { code, ..Default::default() }),
        }
    }

    pub fn main(name: impl Into<String>, code: Vec<u8>) -> Self {
        let mut atom = Self::procedure(name, code);
        if let AtomKind::Procedure(proc) = &mut atom.kind {
            proc.is_main = true;
        }
        atom
    }

    pub fn data(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self { name: name.into(), is_defined: true, is_global: true, kind: AtomKind::Data(content) }
    }

    pub fn string(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_defined: true,
            is_global: true,
            kind: AtomKind::String(content.into()),
        }
    }

    /// Undefined procedure placeholder.
    pub fn external_procedure(name: impl Into<String>) -> Self {
        Self::procedure(name, Vec::new()).undefined()
    }

    /// Undefined data placeholder.
    pub fn external_data(name: impl Into<String>) -> Self {
        Self::data(name, Vec::new()).undefined()
    }

    /// Undefined string placeholder.
    pub fn external_string(name: impl Into<String>) -> Self {
        Self::string(name, String::new()).undefined()
    }

    pub fn undefined(mut self) -> Self {
        self.is_defined = false;
        self
    }

    pub fn local(mut self) -> Self {
        self.is_global = false;
        self
    }

    pub fn with_reference(mut self, reference: Reference) -> Self {
        if let AtomKind::Procedure(proc) = &mut self.kind {
            proc.references.push(reference);
        }
        self
    }

    /// Payload size in bytes. Strings do not count their terminator.
    pub fn size(&self) -> u32 {
        let len = match &self.kind {
            AtomKind::Procedure(proc) => proc.code.len(),
            AtomKind::String(content) => content.len(),
            AtomKind::Data(content) => content.len(),
        };
        len as u32
    }

    pub fn as_procedure(&self) -> Option<&Procedure> {
        match &self.kind {
            AtomKind::Procedure(proc) => Some(proc),
            _ => None,
        }
    }

    pub fn as_procedure_mut(&mut self) -> Option<&mut Procedure> {
        match &mut self.kind {
            AtomKind::Procedure(proc) => Some(proc),
            _ => None,
        }
    }

    pub fn is_main(&self) -> bool {
        self.as_procedure().map_or(false, |proc| proc.is_main)
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            AtomKind::Procedure(_) => "procedure",
            AtomKind::String(_) => "string",
            AtomKind::Data(_) => "data",
        }
    }

    pub fn same_kind(&self, other: &Atom) -> bool {
        std::mem::discriminant(&self.kind) == std::mem::discriminant(&other.kind)
    }

    /// Copy of this atom with the reference list emptied. Used by the merger,
    /// which rebuilds references once every atom has its final id.
    pub fn detached(&self) -> Atom {
        let mut copy = self.clone();
        if let Some(proc) = copy.as_procedure_mut() {
            proc.references.clear();
        }
        copy
    }
}

/// An ordered collection of atoms with an optional load address.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectFile {
    pub atoms: Vec<Atom>,
    /// Base address the code is assumed to be loaded at.
    pub origin: Option<u64>,
}

impl ObjectFile {
    pub fn new(origin: Option<u64>) -> Self {
        Self { atoms: Vec::new(), origin }
    }

    pub fn push(&mut self, atom: Atom) -> AtomId {
        self.atoms.push(atom);
        AtomId(self.atoms.len() - 1)
    }

    pub fn get(&self, id: AtomId) -> Option<&Atom> {
        self.atoms.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AtomId, &Atom)> {
        self.atoms.iter().enumerate().map(|(i, atom)| (AtomId(i), atom))
    }

    /// First atom with the given name.
    pub fn find(&self, name: &str) -> Option<AtomId> {
        self.atoms.iter().position(|atom| atom.name == name).map(AtomId)
    }

    pub fn main_procedure(&self) -> Option<AtomId> {
        self.atoms.iter().position(Atom::is_main).map(AtomId)
    }

    pub fn undefined(&self) -> impl Iterator<Item = &Atom> {
        self.atoms.iter().filter(|atom| !atom.is_defined)
    }
}
