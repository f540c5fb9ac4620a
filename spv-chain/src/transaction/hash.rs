use std::{fmt, io};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;
use serde::{Deserialize, Serialize};
use spv_codec_derive::BtcSerialize;

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};

use super::Transaction;

/// A transaction hash (txid), computed as the double-SHA-256 of the
/// transaction's serialized bytes (§3 `Transaction`).
///
/// Like [`crate::block::Hash`], the wire and in-memory representation is
/// little-endian, but conventionally displayed reversed (big-endian hex),
/// matching how block explorers and `bitcoin-cli` print it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, BtcSerialize)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Hash(pub [u8; 32]);

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(&reversed))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.debug_tuple("transaction::Hash")
            .field(&hex::encode(&reversed))
            .finish()
    }
}

impl BitcoinDeserialize for Hash {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Hash(<[u8; 32]>::bitcoin_deserialize(&mut reader)?))
    }
}

impl std::str::FromStr for Hash {
    type Err = SerializationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; 32];
        hex::decode_to_slice(s, &mut bytes[..])
            .map_err(|_| SerializationError::Parse("txid hex decoding error"))?;
        bytes.reverse();
        Ok(Hash(bytes))
    }
}

impl<'a> From<&'a Transaction> for Hash {
    fn from(tx: &'a Transaction) -> Self {
        let mut writer = sha256d::Writer::default();
        tx.bitcoin_serialize(&mut writer)
            .expect("Sha256 writer is infallible");
        Hash(writer.finish())
    }
}
