//! Write reflection
//!
//! The protocol library's reply step only reports that a request succeeded;
//! it does not say which cells a write touched. The reflector recovers that
//! from the raw request bytes after a successful reply and pushes the
//! mutations into the store so the backing table follows the map.
//!
//! The request is authoritative: everything is decoded as big-endian 16-bit
//! pairs straight from the byte buffer, the reply is never consulted, and
//! the map is never read back.

use tracing::debug;

use crate::error::Result;
use crate::store::{CellValue, PersistentTable, RegisterSpace, RegisterStore};

// TCP ADU layout: the 7-byte MBAP header, then the PDU.
const FUNC_OFFSET: usize = 7;
const ADDR_OFFSET: usize = 8;
const VALUE_OFFSET: usize = 10;
/// First value of a write-multiple-registers run (after the byte-count field).
const MULTI_RUN_OFFSET: usize = 13;

pub const FC_WRITE_SINGLE_COIL: u8 = 5;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 6;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 15;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 16;

/// Coil value sentinel for "on" in a write-single-coil request.
const COIL_ON: u16 = 0xFF00;
/// Coil value sentinel for "off".
const COIL_OFF: u16 = 0x0000;

/// Whether a function code is one the reflector knows how to mirror.
pub fn is_write_request(func: u8) -> bool {
    matches!(
        func,
        FC_WRITE_SINGLE_COIL
            | FC_WRITE_SINGLE_REGISTER
            | FC_WRITE_MULTIPLE_COILS
            | FC_WRITE_MULTIPLE_REGISTERS
    )
}

/// Mirror an accepted write request into the store.
///
/// Call this only after the reply step succeeded; the request bytes are then
/// known to describe a write the map has already taken.
///
/// - Write single coil: the two-byte value is a sentinel, `0x0000` for off
///   and `0xFF00` for on. Anything else is not a coil write and mirrors
///   nothing (no error).
/// - Write single register: the raw value, mirrored directly.
/// - Write multiple coils: deliberately not mirrored - an acknowledged
///   persistence gap. The map still holds the write.
/// - Write multiple registers: the quantity field drives a walk over the
///   16-bit run, one persistence call per register at consecutive addresses.
pub fn reflect_write<T: PersistentTable>(
    request: &[u8],
    store: &mut RegisterStore<T>,
) -> Result<()> {
    let (Some(func), Some(address), Some(value)) = (
        request.get(FUNC_OFFSET).copied(),
        read_u16(request, ADDR_OFFSET),
        read_u16(request, VALUE_OFFSET),
    ) else {
        // too short to be a write ADU; the library would have rejected it
        return Ok(());
    };

    match func {
        FC_WRITE_SINGLE_COIL => match value {
            COIL_OFF => store.write(RegisterSpace::Coil, address, CellValue::Bit(false))?,
            COIL_ON => store.write(RegisterSpace::Coil, address, CellValue::Bit(true))?,
            other => debug!("ignoring coil write with non-sentinel value {other:#06x}"),
        },
        FC_WRITE_SINGLE_REGISTER => {
            store.write(RegisterSpace::HoldingRegister, address, CellValue::Word(value))?;
        }
        FC_WRITE_MULTIPLE_COILS => {
            // acknowledged persistence gap: coils written in bulk are not
            // mirrored
        }
        FC_WRITE_MULTIPLE_REGISTERS => {
            let quantity = usize::from(value);
            for i in 0..quantity {
                let Some(word) = read_u16(request, MULTI_RUN_OFFSET + 2 * i) else {
                    break;
                };
                let Some(target) = address.checked_add(i as u16) else {
                    break;
                };
                store.write(RegisterSpace::HoldingRegister, target, CellValue::Word(word))?;
            }
        }
        _ => {}
    }

    Ok(())
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_be_bytes([
        *buf.get(offset)?,
        *buf.get(offset + 1)?,
    ]))
}
