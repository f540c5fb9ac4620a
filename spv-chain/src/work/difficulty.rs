//! Proof-of-work target/difficulty representation and retarget arithmetic.
//!
//! Blocks encode their difficulty target in the compact "nBits" form
//! (§4.D `BlockHeader.difficulty_threshold`); the header chain engine expands
//! it to a full 256-bit target to compare against a block hash, and to
//! compute cumulative chain work.

use std::cmp::Ordering;
use std::convert::TryFrom;

use primitive_types::U256;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::parameters::Network;
use spv_codec_derive::{BtcDeserialize, BtcSerialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// The compact ("nBits") encoding of a proof-of-work target: one exponent
/// byte and a three-byte mantissa, matching Bitcoin's `nBits` field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, BtcSerialize, BtcDeserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct CompactDifficulty(pub u32);

/// A fully expanded 256-bit proof-of-work target.
///
/// Ordering matches Bitcoin convention: a *smaller* value means *more*
/// work is required, so `hash <= target` is the proof-of-work check and
/// `target_a > target_b` means `target_a` is the easier (lower-work) target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub struct ExpandedDifficulty(pub U256);

/// Cumulative proof-of-work, accumulated across a chain of headers.
///
/// `Work` adds, `ExpandedDifficulty` doesn't; keeping them as distinct types
/// stops callers from accidentally comparing a target against accumulated
/// work.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Default)]
pub struct Work(pub U256);

impl std::ops::Add for Work {
    type Output = Work;
    fn add(self, rhs: Work) -> Work {
        Work(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Work {
    fn sum<I: Iterator<Item = Work>>(iter: I) -> Work {
        iter.fold(Work::default(), |a, b| a + b)
    }
}

impl CompactDifficulty {
    /// Expand this compact target to its full 256-bit form.
    ///
    /// Returns `None` for negative or overflowing encodings, which are never
    /// valid proof-of-work targets.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        let bits = self.0;
        let exponent = (bits >> 24) as u32;
        let mantissa = bits & 0x007f_ffff;
        // The sign bit (0x00800000) makes the target negative; Bitcoin never
        // allows this.
        if bits & 0x0080_0000 != 0 {
            return None;
        }
        if mantissa == 0 {
            return Some(ExpandedDifficulty(U256::zero()));
        }
        let mantissa = U256::from(mantissa);
        let target = if exponent <= 3 {
            mantissa >> (8 * (3 - exponent))
        } else {
            if exponent > 32 {
                return None;
            }
            mantissa << (8 * (exponent - 3))
        };
        Some(ExpandedDifficulty(target))
    }

    /// Compress a 256-bit target back down to its nBits form.
    pub fn from_expanded(target: ExpandedDifficulty) -> CompactDifficulty {
        let mut bytes = [0u8; 32];
        target.0.to_big_endian(&mut bytes);
        let first_nonzero = bytes.iter().position(|b| *b != 0);
        let first_nonzero = match first_nonzero {
            Some(i) => i,
            None => return CompactDifficulty(0),
        };
        let significant = &bytes[first_nonzero..];
        let mut exponent = (32 - first_nonzero) as u32;
        let mut mantissa_bytes = [0u8; 3];
        if significant.len() >= 3 {
            mantissa_bytes.copy_from_slice(&significant[..3]);
        } else {
            mantissa_bytes[..significant.len()].copy_from_slice(significant);
        }
        // If the high bit of the mantissa is set it would be read back as a
        // sign bit, so shift the whole mantissa down a byte and bump the
        // exponent to compensate.
        if mantissa_bytes[0] & 0x80 != 0 {
            mantissa_bytes = [0, mantissa_bytes[0], mantissa_bytes[1]];
            exponent += 1;
        }
        let mantissa = u32::from_be_bytes([0, mantissa_bytes[0], mantissa_bytes[1], mantissa_bytes[2]]);
        CompactDifficulty((exponent << 24) | mantissa)
    }
}

impl ExpandedDifficulty {
    /// The loosest difficulty target this `network` will ever validate; the
    /// coin profile's `difficulty_limit`.
    pub fn target_difficulty_limit(network: Network) -> ExpandedDifficulty {
        ExpandedDifficulty(network.params().difficulty_limit)
    }

    /// `work = floor(2**256 / (target + 1))`, saturating to `Work(U256::MAX)`
    /// for the degenerate all-zero target.
    pub fn to_work(self) -> Work {
        let target_plus_one = self.0.saturating_add(U256::one());
        if target_plus_one.is_zero() {
            return Work(U256::MAX);
        }
        Work(U256::MAX / target_plus_one)
    }

    /// Is this target within the coin's difficulty limit, i.e. no looser
    /// (numerically larger) than `difficulty_limit`?
    pub fn is_within_limit(self, network: Network) -> bool {
        self.0 > U256::zero() && self <= Self::target_difficulty_limit(network)
    }
}

impl PartialEq<crate::block::Hash> for ExpandedDifficulty {
    fn eq(&self, other: &crate::block::Hash) -> bool {
        self.0 == hash_as_u256(other)
    }
}

impl PartialOrd<crate::block::Hash> for ExpandedDifficulty {
    fn partial_cmp(&self, other: &crate::block::Hash) -> Option<Ordering> {
        self.0.partial_cmp(&hash_as_u256(other))
    }
}

fn hash_as_u256(hash: &crate::block::Hash) -> U256 {
    U256::from_little_endian(&hash.0)
}

/// Clamp `timespan` to `[target / 4, target * 4]`, the retarget bound spec
/// §4.E requires.
pub fn clamp_timespan(actual_timespan: i64, target_timespan: i64) -> i64 {
    actual_timespan.max(target_timespan / 4).min(target_timespan * 4)
}

/// Compute the next retarget: `new_target = clamp(old_target * timespan /
/// target_timespan, <= difficulty_limit)`.
pub fn retarget(
    old_target: ExpandedDifficulty,
    clamped_timespan: i64,
    target_timespan: i64,
    network: Network,
) -> ExpandedDifficulty {
    let timespan = U256::from(clamped_timespan.max(0) as u64);
    let target_timespan = U256::from(target_timespan as u64);
    let new_target = old_target.0.saturating_mul(timespan) / target_timespan;
    let limit = ExpandedDifficulty::target_difficulty_limit(network).0;
    ExpandedDifficulty(new_target.min(limit))
}

impl TryFrom<ExpandedDifficulty> for CompactDifficulty {
    type Error = SerializationError;
    fn try_from(value: ExpandedDifficulty) -> Result<Self, Self::Error> {
        Ok(CompactDifficulty::from_expanded(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_genesis_bits() {
        // Bitcoin mainnet genesis block bits: 0x1d00ffff
        let compact = CompactDifficulty(0x1d00ffff);
        let expanded = compact.to_expanded().expect("valid compact difficulty");
        let roundtrip = CompactDifficulty::from_expanded(expanded);
        assert_eq!(roundtrip.0, compact.0);
    }

    #[test]
    fn more_work_for_smaller_target() {
        let easy = ExpandedDifficulty(U256::from(1000u64));
        let hard = ExpandedDifficulty(U256::from(10u64));
        assert!(hard.to_work() > easy.to_work());
    }

    #[test]
    fn clamp_bounds() {
        let target = 14 * 24 * 60 * 60;
        assert_eq!(clamp_timespan(target * 8, target), target * 4);
        assert_eq!(clamp_timespan(target / 8, target), target / 4);
        assert_eq!(clamp_timespan(target, target), target);
    }
}
