//! The transaction Merkle tree that binds a block's header to its
//! transactions (§3 `Block`, §4.D "Merkle root recomputation").

use std::fmt;

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};
use spv_codec_derive::BtcSerialize;

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transaction;

/// The Merkle root of a block's transactions.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, BtcSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Root(pub [u8; 32]);

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(&reversed))
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&reversed))
            .finish()
    }
}

impl BitcoinDeserialize for Root {
    fn bitcoin_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
    }
}

/// Recompute the Merkle root over an ordered sequence of transaction hashes,
/// following Bitcoin's pairwise double-SHA-256 tree: an odd row duplicates
/// its last element before combining.
///
/// Returns the all-zero root for an empty sequence, which never occurs for
/// a well-formed block (the coinbase transaction is always present).
impl std::iter::FromIterator<transaction::Hash> for Root {
    fn from_iter<I: IntoIterator<Item = transaction::Hash>>(iter: I) -> Self {
        let mut level: Vec<[u8; 32]> = iter.into_iter().map(|hash| hash.0).collect();
        if level.is_empty() {
            return Root([0; 32]);
        }
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = *level.last().expect("checked non-empty above");
                level.push(last);
            }
            level = level
                .chunks(2)
                .map(|pair| {
                    let mut writer = sha256d::Writer::default();
                    std::io::Write::write_all(&mut writer, &pair[0])
                        .expect("writing to a Sha256 writer is infallible");
                    std::io::Write::write_all(&mut writer, &pair[1])
                        .expect("writing to a Sha256 writer is infallible");
                    writer.finish()
                })
                .collect();
        }
        Root(level[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_is_its_own_root() {
        spv_test::init();
        let hash = transaction::Hash([7; 32]);
        let root: Root = std::iter::once(hash).collect();
        assert_eq!(root.0, hash.0);
    }

    #[test]
    fn odd_row_duplicates_last_leaf() {
        spv_test::init();
        let a = transaction::Hash([1; 32]);
        let b = transaction::Hash([2; 32]);
        let c = transaction::Hash([3; 32]);

        let three: Root = vec![a, b, c].into_iter().collect();
        let four: Root = vec![a, b, c, c].into_iter().collect();
        assert_eq!(three.0, four.0);
    }
}
