//! Inventory items for the Bitcoin protocol.

use std::io::{Read, Write};

use spv_chain::{
    block,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
    transaction,
};

/// An inventory hash which refers to some advertised or requested data.
///
/// Bitcoin calls this an "inventory vector" but it is just a typed hash, not a
/// container, so we do not use that term to avoid confusion with `Vec<T>`.
///
/// [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#Inventory_Vectors)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InventoryHash {
    /// An error. The wiki says data with this code may be ignored.
    Error,
    /// A hash of a transaction.
    Tx(transaction::Hash),
    /// A hash of a block.
    Block(block::Hash),
    /// A hash of a block header, requested in place of a block when a
    /// bloom filter is set. Not served by this node, but still decodable.
    FilteredBlock(block::Hash),
}

impl From<transaction::Hash> for InventoryHash {
    fn from(tx: transaction::Hash) -> InventoryHash {
        InventoryHash::Tx(tx)
    }
}

impl From<block::Hash> for InventoryHash {
    fn from(hash: block::Hash) -> InventoryHash {
        InventoryHash::Block(hash)
    }
}

impl BitcoinSerialize for InventoryHash {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        let (code, bytes) = match *self {
            InventoryHash::Error => (0u32, [0; 32]),
            InventoryHash::Tx(hash) => (1, hash.0),
            InventoryHash::Block(hash) => (2, hash.0),
            InventoryHash::FilteredBlock(hash) => (3, hash.0),
        };
        code.bitcoin_serialize(&mut writer)?;
        bytes.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for InventoryHash {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let code = u32::bitcoin_deserialize(&mut reader)?;
        let bytes = <[u8; 32]>::bitcoin_deserialize(&mut reader)?;
        match code {
            0 => Ok(InventoryHash::Error),
            1 => Ok(InventoryHash::Tx(transaction::Hash(bytes))),
            2 => Ok(InventoryHash::Block(block::Hash(bytes))),
            3 => Ok(InventoryHash::FilteredBlock(block::Hash(bytes))),
            _ => Err(SerializationError::Parse("invalid inventory code")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_inv_roundtrips() {
        let inv = InventoryHash::Block(block::Hash([7; 32]));
        let bytes = inv.bitcoin_serialize_to_vec().unwrap();
        assert_eq!(InventoryHash::bitcoin_deserialize(&bytes[..]).unwrap(), inv);
    }

    #[test]
    fn unknown_code_errors() {
        let mut bytes = vec![9, 0, 0, 0];
        bytes.extend_from_slice(&[0; 32]);
        assert!(InventoryHash::bitcoin_deserialize(&bytes[..]).is_err());
    }
}
