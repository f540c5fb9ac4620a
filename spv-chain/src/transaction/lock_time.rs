use std::io;

use chrono::{TimeZone, Utc};
#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

use crate::block::Height;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A transaction's lock-time field (§3 `Transaction.is_final`).
///
/// The wire encoding is a single `u32`; values below 500,000,000 are block
/// heights, values at or above it are Unix timestamps. `LockTime::Height(0)`
/// ("no lock-time") is the common case and is always final.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub enum LockTime {
    Height(Height),
    Time(chrono::DateTime<Utc>),
}

/// The wire-format boundary between height- and time-based lock-times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

impl LockTime {
    pub fn new(raw: u32) -> LockTime {
        if raw < LOCKTIME_THRESHOLD {
            LockTime::Height(Height(raw))
        } else {
            LockTime::Time(Utc.timestamp(raw as i64, 0))
        }
    }

    fn raw(self) -> u32 {
        match self {
            LockTime::Height(h) => h.0,
            LockTime::Time(t) => t.timestamp() as u32,
        }
    }

    /// Is a lock-time of `self` satisfied at `height`/`block_time`, per the
    /// wire-encoding threshold rule?
    pub fn is_satisfied_at(self, height: Height, block_time: chrono::DateTime<Utc>) -> bool {
        match self {
            LockTime::Height(h) => h.0 < height.0,
            LockTime::Time(t) => t < block_time,
        }
    }
}

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: io::Write>(&self, target: W) -> Result<(), io::Error> {
        self.raw().bitcoin_serialize(target)
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(LockTime::new(u32::bitcoin_deserialize(reader)?))
    }
}

impl Default for LockTime {
    fn default() -> Self {
        LockTime::Height(Height(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_roundtrip() {
        spv_test::init();
        assert_eq!(LockTime::new(500).raw(), 500);
        assert!(matches!(LockTime::new(500), LockTime::Height(Height(500))));
    }

    #[test]
    fn time_roundtrip() {
        spv_test::init();
        let raw = LOCKTIME_THRESHOLD + 1000;
        assert!(matches!(LockTime::new(raw), LockTime::Time(_)));
        assert_eq!(LockTime::new(raw).raw(), raw);
    }

    #[test]
    fn zero_is_always_satisfied() {
        spv_test::init();
        let lt = LockTime::new(0);
        assert!(lt.is_satisfied_at(Height(1), Utc.timestamp(0, 0)));
    }
}
