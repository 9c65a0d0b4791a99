//! Utility functions.

/// Reads the big-endian instruction word at `offset`, if it lies within `data`.
pub fn read_word(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

/// Writes `word` big-endian at `offset`. Returns false if it does not fit.
pub fn write_word(data: &mut [u8], offset: usize, word: u32) -> bool {
    let Some(end) = offset.checked_add(4) else { return false };
    match data.get_mut(offset..end) {
        Some(slot) => {
            slot.copy_from_slice(&word.to_be_bytes());
            true
        }
        None => false,
    }
}
