//! Architecture abstraction.
//!
//! This module defines the `Architecture` trait, which encapsulates how a
//! resolved address is encoded into an instruction. The linker itself only
//! knows patch sites and targets; the backend owns the bit layout.

use anyhow::Result;

use crate::atom::AddressType;

pub mod arm;

/// A trait representing a target instruction set.
pub trait Architecture {
    /// Patches the instruction word at `offset` in `image`.
    ///
    /// # Arguments
    /// * `address_type` - How the address is encoded into the instruction.
    /// * `site` - The runtime address of the instruction being patched.
    /// * `target` - The runtime address the instruction should refer to.
    /// * `offset` - The position of the instruction within `image`.
    /// * `image` - The laid-out binary.
    fn apply_relocation(
        &self,
        address_type: AddressType,
        site: u64,
        target: u64,
        offset: usize,
        image: &mut [u8],
    ) -> Result<()>;
}
