//! Script number encoding: minimally-sized big-endian two's-complement
//! integers, and the stack-item truthiness rule arithmetic and control-flow
//! opcodes share (§4.C).
//!
//! This is deliberately not Bitcoin Core's little-endian sign-magnitude
//! `CScriptNum` format; the evaluator here treats every numeric stack item as
//! a minimal big-endian two's-complement integer, matching how this coin
//! profile's reference script engine decodes and re-encodes them.

/// Decodes `bytes` as a big-endian two's-complement signed integer.
/// An empty slice decodes to zero.
pub fn decode_int(bytes: &[u8]) -> i64 {
    if bytes.is_empty() {
        return 0;
    }
    let magnitude = bytes.iter().fold(0i128, |acc, &b| (acc << 8) | b as i128);
    let value = if bytes[0] & 0x80 != 0 {
        magnitude - (1i128 << (8 * bytes.len()))
    } else {
        magnitude
    };
    value as i64
}

/// Decodes `bytes` as a big-endian unsigned integer, used for the stack-depth
/// arguments to `OP_PICK`/`OP_ROLL`.
pub fn decode_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Encodes `v` as the shortest big-endian two's-complement byte string that
/// round-trips through [`decode_int`]. Zero encodes to the empty string.
pub fn encode_int(v: i64) -> Vec<u8> {
    if v == 0 {
        return Vec::new();
    }
    let mut bytes = v.to_be_bytes().to_vec();
    while bytes.len() > 1 {
        let first = bytes[0];
        let second = bytes[1];
        let redundant = (first == 0x00 && second & 0x80 == 0) || (first == 0xff && second & 0x80 != 0);
        if redundant {
            bytes.remove(0);
        } else {
            break;
        }
    }
    bytes
}

/// A stack item is true unless every byte is zero, or the only nonzero byte
/// is a trailing `0x80` (negative zero).
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    let last = bytes.len().saturating_sub(1);
    for (i, &v) in bytes.iter().enumerate() {
        if i != last {
            if v != 0 {
                return true;
            }
        } else if v != 0x80 && v != 0x00 {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_small_values() {
        for v in [-300i64, -129, -128, -1, 0, 1, 127, 128, 300] {
            assert_eq!(decode_int(&encode_int(v)), v, "failed for {}", v);
        }
    }

    #[test]
    fn zero_encodes_empty() {
        assert_eq!(encode_int(0), Vec::<u8>::new());
        assert_eq!(decode_int(&[]), 0);
    }

    #[test]
    fn minimal_two_byte_boundary() {
        assert_eq!(encode_int(128), vec![0x00, 0x80]);
        assert_eq!(encode_int(-129), vec![0xff, 0x7f]);
        assert_eq!(encode_int(127), vec![0x7f]);
        assert_eq!(encode_int(-128), vec![0x80]);
    }

    #[test]
    fn bool_casting() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0x00]));
        assert!(!cast_to_bool(&[0x80]));
        assert!(cast_to_bool(&[0x01]));
        assert!(cast_to_bool(&[0x00, 0x01]));
        assert!(cast_to_bool(&[0x00, 0x80]));
    }
}
