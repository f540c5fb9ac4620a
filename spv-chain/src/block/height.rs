use std::{convert::TryFrom, fmt};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};

/// The height of a block: the number of blocks in the chain below it, with
/// the genesis block at height 0.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Height(pub u32);

impl Height {
    /// The height of the genesis block.
    pub const MIN: Height = Height(0);
    /// The largest height that can be represented in the coinbase script's
    /// BIP-34 height encoding (a 4-byte little-endian `CompactInt` pushed as
    /// script data).
    pub const MAX: Height = Height(500_000_000);

    pub fn is_min(self) -> bool {
        self == Height::MIN
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add<u32> for Height {
    type Output = Height;
    fn add(self, rhs: u32) -> Height {
        Height(self.0 + rhs)
    }
}

impl std::ops::Sub<Height> for Height {
    type Output = i64;
    fn sub(self, rhs: Height) -> i64 {
        self.0 as i64 - rhs.0 as i64
    }
}

impl std::ops::Sub<u32> for Height {
    type Output = Height;
    fn sub(self, rhs: u32) -> Height {
        Height(self.0.saturating_sub(rhs))
    }
}

impl TryFrom<i64> for Height {
    type Error = &'static str;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 || value > Height::MAX.0 as i64 {
            return Err("height out of range");
        }
        Ok(Height(value as u32))
    }
}

impl From<u32> for Height {
    fn from(value: u32) -> Self {
        Height(value)
    }
}
