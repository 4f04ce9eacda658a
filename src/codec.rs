//! Wide-value codec
//!
//! Encoding and decoding between 16-bit register cells and values that span
//! several of them. Everything here is pure: fixed-length cell slices in,
//! decoded values out, no state and no I/O.
//!
//! ## Cell Layouts
//!
//! ```text
//! float (2 cells)      IEEE-754 single precision, four word/byte orders
//! u32/i32 (2 cells)    big-endian: cell 0 carries the most significant bits
//! u64/i64 (4 cells)    big-endian: cell 0 carries the most significant bits
//! chunked (2-4 cells)  one base-10000 digit per cell, most significant first
//! ```
//!
//! The chunked-decimal form keeps exact decimal quantities (metered totals,
//! currency) out of binary floating point: `[1, 2345]` is the integer
//! `1_2345`, not a float approximation of it.
//!
//! Sign never lives in the cells. Callers that need signed presentation
//! reinterpret the decoded bits (`as i32` / `as i64`), the way the CLI does.

use crate::error::{RegMirrorError, Result};

/// Base of one chunked-decimal digit: each cell holds `0..=9999`.
pub const CHUNK_BASE: u64 = 10_000;

/// Word/byte ordering of a float spanning two register cells.
///
/// Naming follows the libmodbus convention: the four bytes of the IEEE-754
/// word are `a` (most significant) through `d`, and the variant spells the
/// order in which they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordOrder {
    /// Natural big-endian: cell 0 = `ab`, cell 1 = `cd`
    Abcd,
    /// Byte-swapped within each cell: cell 0 = `ba`, cell 1 = `dc`
    Badc,
    /// Cells swapped: cell 0 = `cd`, cell 1 = `ab`
    Cdab,
    /// Fully reversed: cell 0 = `dc`, cell 1 = `ba`
    Dcba,
}

// =============================================================================
// Floating point
// =============================================================================

/// Decode two cells into an IEEE-754 single-precision float.
pub fn decode_float(cells: &[u16], order: WordOrder) -> Result<f32> {
    let [c0, c1] = pair(cells, "float")?;
    let bits = match order {
        WordOrder::Abcd => (u32::from(c0) << 16) | u32::from(c1),
        WordOrder::Badc => (u32::from(c0.swap_bytes()) << 16) | u32::from(c1.swap_bytes()),
        WordOrder::Cdab => (u32::from(c1) << 16) | u32::from(c0),
        WordOrder::Dcba => ((u32::from(c0) << 16) | u32::from(c1)).swap_bytes(),
    };
    Ok(f32::from_bits(bits))
}

/// Encode an IEEE-754 single-precision float into two cells.
pub fn encode_float(value: f32, order: WordOrder) -> [u16; 2] {
    let bits = value.to_bits();
    let hi = (bits >> 16) as u16;
    let lo = bits as u16;
    match order {
        WordOrder::Abcd => [hi, lo],
        WordOrder::Badc => [hi.swap_bytes(), lo.swap_bytes()],
        WordOrder::Cdab => [lo, hi],
        WordOrder::Dcba => {
            let swapped = bits.swap_bytes();
            [(swapped >> 16) as u16, swapped as u16]
        }
    }
}

// =============================================================================
// Two's-complement integers
// =============================================================================

/// Decode two cells into a 32-bit unsigned integer (big-endian cell order).
pub fn decode_u32(cells: &[u16]) -> Result<u32> {
    let [c0, c1] = pair(cells, "u32")?;
    Ok((u32::from(c0) << 16) | u32::from(c1))
}

/// Decode two cells into a 32-bit signed integer.
pub fn decode_i32(cells: &[u16]) -> Result<i32> {
    Ok(decode_u32(cells)? as i32)
}

/// Encode a 32-bit unsigned integer into two cells.
pub fn encode_u32(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, value as u16]
}

/// Decode four cells into a 64-bit unsigned integer (big-endian cell order).
pub fn decode_u64(cells: &[u16]) -> Result<u64> {
    let [c0, c1, c2, c3] = quad(cells, "u64")?;
    Ok((u64::from(c0) << 48) | (u64::from(c1) << 32) | (u64::from(c2) << 16) | u64::from(c3))
}

/// Decode four cells into a 64-bit signed integer.
pub fn decode_i64(cells: &[u16]) -> Result<i64> {
    Ok(decode_u64(cells)? as i64)
}

/// Encode a 64-bit unsigned integer into four cells.
pub fn encode_u64(value: u64) -> [u16; 4] {
    [
        (value >> 48) as u16,
        (value >> 32) as u16,
        (value >> 16) as u16,
        value as u16,
    ]
}

// =============================================================================
// Chunked decimal (base-10000)
// =============================================================================

/// Decode chunked-decimal cells into an unsigned integer.
///
/// Each cell carries one base-10000 digit, most significant first:
/// the result is `sum(cells[i] * 10000^(n-1-i))`. Widths 2, 3 and 4 are
/// supported. Cells are expected to hold values below 10000; larger digits
/// simply contribute more than their place value.
pub fn decode_chunked(cells: &[u16]) -> Result<u64> {
    chunk_width(cells.len())?;
    Ok(cells
        .iter()
        .fold(0u64, |acc, &digit| acc * CHUNK_BASE + u64::from(digit)))
}

/// Encode an unsigned integer into `width` chunked-decimal cells.
///
/// The value is peeled from the least significant cell upward: `value % 10000`
/// lands in the last cell, then the value is divided by 10000 and the next
/// cell toward the front is filled. Magnitudes above `10000^width - 1`
/// truncate silently; keeping the value in range is the caller's
/// responsibility.
pub fn encode_chunked(value: u64, width: usize) -> Result<Vec<u16>> {
    chunk_width(width)?;
    let mut cells = vec![0u16; width];
    let mut rest = value;
    for cell in cells.iter_mut().rev() {
        *cell = (rest % CHUNK_BASE) as u16;
        rest /= CHUNK_BASE;
    }
    Ok(cells)
}

fn chunk_width(width: usize) -> Result<()> {
    if (2..=4).contains(&width) {
        Ok(())
    } else {
        Err(RegMirrorError::InvalidArgument(format!(
            "chunked decimal spans 2 to 4 cells, got {width}"
        )))
    }
}

// =============================================================================
// Slice-shape helpers
// =============================================================================

fn pair(cells: &[u16], what: &str) -> Result<[u16; 2]> {
    cells.try_into().map_err(|_| wrong_count(what, 2, cells.len()))
}

fn quad(cells: &[u16], what: &str) -> Result<[u16; 4]> {
    cells.try_into().map_err(|_| wrong_count(what, 4, cells.len()))
}

fn wrong_count(what: &str, want: usize, got: usize) -> RegMirrorError {
    RegMirrorError::InvalidArgument(format!("{what} expects {want} cells, got {got}"))
}
