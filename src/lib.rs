//! Atom object files and their linker.
//!
//! This library provides the core components for the `atomld` linker.
//! It is organized into several modules:
//! - `atom`: The object model (atoms, references, object files).
//! - `reader` / `writer`: The Atom object file codec.
//! - `symbol`: Merging object files into one.
//! - `layout`: Reachability and address assignment.
//! - `arch`: Instruction-set specific relocation logic.
//! - `linker`: The main linking orchestration.
//! - `config`: CLI configuration.

pub mod arch;
pub mod atom;
pub mod config;
pub mod error;
pub mod layout;
pub mod linker;
pub mod reader;
pub mod symbol;
pub mod utils;
pub mod writer;

pub use atom::{AddressType, Atom, AtomId, AtomKind, ObjectFile, Procedure, Reference, ReferenceTarget};
pub use error::{FormatError, LinkError};
pub use linker::{link, merge, Linked, Linker};
pub use reader::read_object;
pub use writer::write_object;
