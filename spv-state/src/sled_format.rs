//! A thin typed layer over [`sled::Tree`]: every persistent map the chain
//! engine and transaction database keep is a `sled::Tree` of bincode-encoded
//! values, keyed either by a fixed-width binary key (a height or a hash) or
//! by the literal ASCII keys spec.md §6 names (`tx-<hex(hash)>`, `needs_headers`, ...).

use serde::{de::DeserializeOwned, Serialize};
use sled::Tree;

use crate::error::StateError;

/// Insert/get/remove a bincode-encoded value under a raw byte key.
pub trait TypedTree {
    fn typed_insert<V: Serialize>(&self, key: impl AsRef<[u8]>, value: &V) -> Result<(), StateError>;
    fn typed_get<V: DeserializeOwned>(&self, key: impl AsRef<[u8]>) -> Result<Option<V>, StateError>;
    fn typed_remove(&self, key: impl AsRef<[u8]>) -> Result<(), StateError>;
}

impl TypedTree for Tree {
    fn typed_insert<V: Serialize>(&self, key: impl AsRef<[u8]>, value: &V) -> Result<(), StateError> {
        let bytes = bincode::serialize(value)?;
        self.insert(key.as_ref(), bytes)?;
        Ok(())
    }

    fn typed_get<V: DeserializeOwned>(&self, key: impl AsRef<[u8]>) -> Result<Option<V>, StateError> {
        match self.get(key.as_ref())? {
            Some(ivec) => Ok(Some(bincode::deserialize(&ivec)?)),
            None => Ok(None),
        }
    }

    fn typed_remove(&self, key: impl AsRef<[u8]>) -> Result<(), StateError> {
        self.remove(key.as_ref())?;
        Ok(())
    }
}

/// The big-endian height key sled sorts its keyspace by, so a height-keyed
/// tree can be range-scanned in chain order.
pub fn height_key(height: spv_chain::block::Height) -> [u8; 4] {
    height.0.to_be_bytes()
}

/// The `tx-<hex(hash)>` key spec.md §6 specifies for the transaction
/// database.
pub fn tx_key(hash: &spv_chain::transaction::Hash) -> Vec<u8> {
    format!("tx-{}", hex::encode(hash.0)).into_bytes()
}

/// The raw 32-byte key used for block-hash-keyed trees (the chain index and
/// the watched-block-height map).
pub fn hash_key(hash: &spv_chain::block::Hash) -> [u8; 32] {
    hash.0
}
