//! Hand-written (de)serialization for the transparent input/output types
//! whose wire shape isn't a plain field-by-field struct: [`OutPoint`]'s
//! sentinel coinbase encoding, and [`Input`]'s two-variant shape.

use std::io::{self, Read};

use crate::cached::Cached;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transaction;

use super::{CoinbaseData, Input, OutPoint};

/// The sentinel previous-output used by a coinbase input: an all-zero hash
/// and an index of `0xFFFFFFFF` (§3 `Block`).
const COINBASE_PREVOUT_INDEX: u32 = 0xFFFF_FFFF;

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: transaction::Hash::bitcoin_deserialize(&mut reader)?,
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
                sequence,
            } => {
                outpoint.bitcoin_serialize(&mut writer)?;
                unlock_script.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)
            }
            Input::Coinbase { data, sequence, .. } => {
                let prevout = OutPoint {
                    hash: transaction::Hash([0; 32]),
                    index: COINBASE_PREVOUT_INDEX,
                };
                prevout.bitcoin_serialize(&mut writer)?;
                data.bitcoin_serialize(&mut writer)?;
                sequence.bitcoin_serialize(&mut writer)
            }
        }
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::bitcoin_deserialize(&mut reader)?;
        if outpoint.hash.0 == [0; 32] && outpoint.index == COINBASE_PREVOUT_INDEX {
            let raw_len = crate::compactint::CompactInt::bitcoin_deserialize(&mut reader)?.value();
            let mut bytes = Vec::new();
            (&mut reader).take(raw_len).read_to_end(&mut bytes)?;
            let data = CoinbaseData(bytes);
            let height = data.parse_height().map(Cached::from);
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::Coinbase { height, data, sequence })
        } else {
            let unlock_script = super::Script::bitcoin_deserialize(&mut reader)?;
            let sequence = u32::bitcoin_deserialize(&mut reader)?;
            Ok(Input::PrevOut { outpoint, unlock_script, sequence })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparent::Script;

    #[test]
    fn prevout_input_roundtrips() {
        spv_test::init();
        let input = Input::PrevOut {
            outpoint: OutPoint { hash: transaction::Hash([3; 32]), index: 1 },
            unlock_script: Script(vec![1, 2, 3]),
            sequence: 0xFFFF_FFFF,
        };
        let mut bytes = Vec::new();
        input.bitcoin_serialize(&mut bytes).unwrap();
        let back = Input::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(input, back);
    }

    #[test]
    fn coinbase_input_roundtrips_and_parses_height() {
        spv_test::init();
        // BIP-34 push of height 42: opcode 1 (push one byte), then 42.
        let data = CoinbaseData(vec![1, 42]);
        let input = Input::Coinbase {
            height: None,
            data,
            sequence: 0,
        };
        let mut bytes = Vec::new();
        input.bitcoin_serialize(&mut bytes).unwrap();
        let back = Input::bitcoin_deserialize(&bytes[..]).unwrap();
        match back {
            Input::Coinbase { height, .. } => {
                assert_eq!(height.and_then(|h| h.value()), Some(crate::block::Height(42)));
            }
            _ => panic!("expected coinbase input"),
        }
    }
}
