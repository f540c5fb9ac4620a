//! Newtype wrappers for primitive wire values that need their own type
//! identity (a `u64` nonce is not a `u64` services bitmask).

use std::io;

use bitflags::bitflags;
use spv_chain::parameters::Network;
use spv_chain::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use spv_codec_derive::{BtcDeserialize, BtcSerialize};

/// The protocol version a peer negotiates with, carried in `version` and
/// prefixed onto `getheaders`/`getblocks` payloads.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, BtcSerialize, BtcDeserialize)]
pub struct ProtocolVersion(pub u32);

/// A nonce used to detect self-connections during the handshake, and to
/// pair up `ping`/`pong`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, BtcSerialize, BtcDeserialize)]
pub struct Nonce(pub u64);

bitflags! {
    /// Services a peer advertises in its `version` message.
    #[derive(Default)]
    pub struct PeerServices: u64 {
        /// The peer can serve the full block chain.
        const NODE_NETWORK = 1;
    }
}

impl BitcoinSerialize for PeerServices {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.bits().bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for PeerServices {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let bits = u64::bitcoin_deserialize(reader)?;
        Ok(PeerServices::from_bits_truncate(bits))
    }
}

/// The four magic bytes that prefix every message on the wire, identifying
/// which network (and thus which [`Params`](spv_chain::parameters::Params))
/// the sender believes it's speaking to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl From<Network> for Magic {
    fn from(network: Network) -> Magic {
        Magic(network.params().network_magic)
    }
}
