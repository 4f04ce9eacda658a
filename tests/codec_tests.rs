//! Codec Tests
//!
//! Wide-value encode/decode: float word orders, integer widths and the
//! chunked-decimal representation.

use regmirror::codec::{
    decode_chunked, decode_float, decode_i32, decode_i64, decode_u32, decode_u64, encode_chunked,
    encode_float, encode_u32, encode_u64, WordOrder,
};

// =============================================================================
// Float layouts
// =============================================================================

// 123456.0f32 has the IEEE-754 word 0x47F12000; the four orders place its
// bytes differently across the two cells.
const VALUE: f32 = 123456.0;

#[test]
fn test_float_abcd_layout() {
    assert_eq!(encode_float(VALUE, WordOrder::Abcd), [0x47F1, 0x2000]);
    assert_eq!(decode_float(&[0x47F1, 0x2000], WordOrder::Abcd).unwrap(), VALUE);
}

#[test]
fn test_float_badc_layout() {
    assert_eq!(encode_float(VALUE, WordOrder::Badc), [0xF147, 0x0020]);
    assert_eq!(decode_float(&[0xF147, 0x0020], WordOrder::Badc).unwrap(), VALUE);
}

#[test]
fn test_float_cdab_layout() {
    assert_eq!(encode_float(VALUE, WordOrder::Cdab), [0x2000, 0x47F1]);
    assert_eq!(decode_float(&[0x2000, 0x47F1], WordOrder::Cdab).unwrap(), VALUE);
}

#[test]
fn test_float_dcba_layout() {
    assert_eq!(encode_float(VALUE, WordOrder::Dcba), [0x0020, 0xF147]);
    assert_eq!(decode_float(&[0x0020, 0xF147], WordOrder::Dcba).unwrap(), VALUE);
}

#[test]
fn test_float_round_trip_all_orders() {
    let orders = [
        WordOrder::Abcd,
        WordOrder::Badc,
        WordOrder::Cdab,
        WordOrder::Dcba,
    ];
    for value in [0.0f32, -1.5, 0.1, 3.14159, -123456.75, f32::MAX, f32::MIN] {
        for order in orders {
            let cells = encode_float(value, order);
            assert_eq!(decode_float(&cells, order).unwrap(), value, "{order:?}");
        }
    }
}

#[test]
fn test_float_rejects_wrong_cell_count() {
    assert!(decode_float(&[1], WordOrder::Abcd).is_err());
    assert!(decode_float(&[1, 2, 3], WordOrder::Abcd).is_err());
}

// =============================================================================
// Integers
// =============================================================================

#[test]
fn test_u32_big_endian_cell_order() {
    assert_eq!(encode_u32(0x0001_0000), [1, 0]);
    assert_eq!(decode_u32(&[1, 0]).unwrap(), 65536);
    assert_eq!(decode_u32(&[0xABCD, 0x1234]).unwrap(), 0xABCD_1234);
}

#[test]
fn test_i32_sign_reinterpretation() {
    let cells = encode_u32(-1i32 as u32);
    assert_eq!(cells, [0xFFFF, 0xFFFF]);
    assert_eq!(decode_i32(&cells).unwrap(), -1);
    assert_eq!(decode_i32(&encode_u32(-123456i32 as u32)).unwrap(), -123456);
}

#[test]
fn test_u64_round_trip() {
    for value in [0u64, 1, u64::from(u32::MAX) + 1, u64::MAX] {
        assert_eq!(decode_u64(&encode_u64(value)).unwrap(), value);
    }
    assert_eq!(
        decode_u64(&[0x0123, 0x4567, 0x89AB, 0xCDEF]).unwrap(),
        0x0123_4567_89AB_CDEF
    );
}

#[test]
fn test_i64_sign_reinterpretation() {
    assert_eq!(decode_i64(&encode_u64(-42i64 as u64)).unwrap(), -42);
}

#[test]
fn test_int_reject_wrong_cell_count() {
    assert!(decode_u32(&[1, 2, 3]).is_err());
    assert!(decode_u64(&[1, 2]).is_err());
}

// =============================================================================
// Chunked decimal
// =============================================================================

#[test]
fn test_chunked_digit_placement() {
    // one base-10000 digit per cell, most significant first
    assert_eq!(encode_chunked(1_2345, 2).unwrap(), vec![1, 2345]);
    assert_eq!(encode_chunked(9999_0001, 2).unwrap(), vec![9999, 1]);
    assert_eq!(encode_chunked(7, 3).unwrap(), vec![0, 0, 7]);
    assert_eq!(
        encode_chunked(123_4567_8901_2345, 4).unwrap(),
        vec![123, 4567, 8901, 2345]
    );
}

#[test]
fn test_chunked_decode_accumulates_arithmetically() {
    // digit groups may share bit positions; accumulation must be arithmetic,
    // not bitwise
    assert_eq!(decode_chunked(&[1, 9999]).unwrap(), 19999);
    assert_eq!(decode_chunked(&[9999, 9999]).unwrap(), 9999_9999);
}

#[test]
fn test_chunked_round_trip_boundaries() {
    for width in 2..=4usize {
        let max = 10_000u64.pow(width as u32) - 1;
        for value in [0, 1, 9999, 10_000, max / 2, max - 1, max] {
            let cells = encode_chunked(value, width).unwrap();
            assert_eq!(cells.len(), width);
            assert_eq!(decode_chunked(&cells).unwrap(), value, "width {width}");
        }
    }
}

#[test]
fn test_chunked_overflow_truncates_silently() {
    // one past the 2-cell maximum wraps to zero; bounding the value is the
    // caller's responsibility
    assert_eq!(encode_chunked(100_000_000, 2).unwrap(), vec![0, 0]);
    assert_eq!(encode_chunked(100_000_001, 2).unwrap(), vec![0, 1]);
}

#[test]
fn test_chunked_rejects_bad_widths() {
    assert!(encode_chunked(1, 1).is_err());
    assert!(encode_chunked(1, 5).is_err());
    assert!(decode_chunked(&[1]).is_err());
    assert!(decode_chunked(&[1, 2, 3, 4, 5]).is_err());
}
