//! ARM backend.
//!
//! Instruction words are stored big-endian in procedure code, with the
//! relocated field zeroed by the assembler.

use super::Architecture;
use anyhow::{bail, ensure, Result};

use crate::atom::AddressType;
use crate::error::LinkError;
use crate::utils::{read_word, write_word};

/// Largest distance reachable by a 12-bit load/store immediate.
pub const OFFSET12_RANGE: u64 = 4095;
/// Approximation of the ±32MB reach of `B`/`BL`.
pub const BRANCH_RANGE: u64 = 32_000_000;

/// U bit of a load/store: set when the offset is added to the base.
const UP_BIT: u32 = 1 << 23;

/// The ARM backend.
pub struct Arm;

impl Arm {
    /// Encodes `target` into a load/store with a 12-bit immediate.
    pub fn encode_offset12(word: u32, site: u64, target: u64) -> Result<u32> {
        let distance = site.abs_diff(target);
        if distance > OFFSET12_RANGE {
            bail!(LinkError::OutOfRange { site, target, limit: "±4KB" });
        }
        let word = if site <= target { word | UP_BIT } else { word & !UP_BIT };
        Ok((word & !0xFFF) | distance as u32)
    }

    /// Encodes `target` into the 24-bit field of a branch.
    ///
    /// Forward branches sum the two addresses rather than subtracting them,
    /// unlike the architectural `(target - (site + 8)) >> 2`. Arithmetic is
    /// done on the low 32 bits of both addresses and wraps.
    // TODO: validate forward branches against hardware before changing the sum.
    pub fn encode_branch(word: u32, site: u64, target: u64) -> Result<u32> {
        if site.abs_diff(target) > BRANCH_RANGE {
            bail!(LinkError::OutOfRange { site, target, limit: "±32MB" });
        }
        let (site32, target32) = (site as u32, target as u32);
        let value = if site <= target {
            site32.wrapping_add(target32)
        } else {
            target32.wrapping_sub(site32)
        };
        let offset = (((value.wrapping_sub(8) as i32 >> 2) as u32) | 0x8000_0000) & 0x00FF_FFFF;
        Ok((word & 0xFF00_0000) | offset)
    }
}

impl Architecture for Arm {
    fn apply_relocation(
        &self,
        address_type: AddressType,
        site: u64,
        target: u64,
        offset: usize,
        image: &mut [u8],
    ) -> Result<()> {
        let Some(word) = read_word(image, offset) else {
            bail!("instruction at {:#x} lies outside the image", site);
        };
        let patched = match address_type {
            AddressType::ArmOffset12 => Self::encode_offset12(word, site, target)?,
            AddressType::ArmTargetAddress => Self::encode_branch(word, site, target)?,
            AddressType::Other(mode) => bail!(LinkError::UnsupportedAddressType(mode)),
        };
        tracing::trace!(
            "Patched {:?} at {:#x} -> {:#x}: {:#010x} => {:#010x}",
            address_type, site, target, word, patched
        );
        ensure!(
            write_word(image, offset, patched),
            "instruction at {:#x} lies outside the image",
            site
        );
        Ok(())
    }
}
