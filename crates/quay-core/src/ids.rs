//! Identifier aliases and piece size helpers.
//!
//! Content and zone ids are assigned by the store and grow strictly in
//! creation order, which is what lets the backfill cursor and the deal
//! workers page in ascending id order.

/// Identifier of a stored content object.
pub type ContentId = u64;

/// Identifier of a staging zone.
pub type ZoneId = u64;

/// Fixed id of the singleton deal queue tracker row.
pub const TRACKER_ID: u64 = 1;

/// Smallest padded piece a provider will accept.
pub const MIN_PIECE_SIZE: u64 = 128;

/// Padded piece size for a payload of `size` bytes.
///
/// FR32 padding expands every 127 bytes to 128; the result is rounded up to
/// the next power of two and never smaller than [`MIN_PIECE_SIZE`].
#[must_use]
pub const fn padded_piece_size(size: u64) -> u64 {
    let padded = size.saturating_add(size.div_ceil(127));
    let rounded = match padded.checked_next_power_of_two() {
        Some(v) => v,
        None => u64::MAX,
    };
    if rounded < MIN_PIECE_SIZE {
        MIN_PIECE_SIZE
    } else {
        rounded
    }
}
