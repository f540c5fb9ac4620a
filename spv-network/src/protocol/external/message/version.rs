use super::super::types::*;
use super::{Nonce, ProtocolVersion};
use spv_codec_derive::{BtcDeserialize, BtcSerialize};
use chrono::{DateTime, TimeZone, Utc};
use std::net;
use std::net::SocketAddr;
use spv_chain::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

use spv_chain::block;

// #[derive(Deserializable, Serializable, Debug, Clone)]
/// A `version` message.
///
/// Note that although this is called `version` in Bitcoin, its role is really
/// analogous to a `ClientHello` message in TLS, used to begin a handshake, and
/// is distinct from a simple version number.
///
/// [Bitcoin reference](https://en.bitcoin.it/wiki/Protocol_documentation#version)
#[derive(Clone, PartialEq, Eq, Debug, BtcSerialize, BtcDeserialize)]
pub struct Version {
    /// The network version number supported by the sender.
    pub version: ProtocolVersion,

    /// The network services advertised by the sender.
    pub services: PeerServices,

    /// The time when the version message was sent.
    pub timestamp: DateTime<Utc>,

    /// The network address of the node receiving this message, and its
    /// advertised network services.
    ///
    /// Q: how does the handshake know the remote peer's services already?
    pub address_recv: (PeerServices, net::SocketAddr),

    /// The network address of the node sending this message, and its
    /// advertised network services.
    pub address_from: (PeerServices, net::SocketAddr),

    /// Node random nonce, randomly generated every time a version
    /// packet is sent. This nonce is used to detect connections
    /// to self.
    pub nonce: Nonce,

    /// The user agent advertised by the sender.
    pub user_agent: String,

    /// The last block received by the emitting node.
    pub best_block: block::Height,

    /// Whether the remote peer should announce relayed
    /// transactions or not, see [BIP 0037](https://github.com/bitcoin/bips/blob/master/bip-0037.mediawiki)
    pub relay: bool,
}

impl Version {
    pub fn new(
        version: ProtocolVersion,
        their_ip: SocketAddr,
        their_services: PeerServices, // Should be PeerServices::NODE_NETWORK when connecting outbound
        our_services: PeerServices,
        our_ip: SocketAddr,
        nonce: Nonce,
        user_agent: String,
        best_block: block::Height,
        relay: bool,
    ) -> Version {
        // To try to stay within the range where bitcoin core will ignore our clock skew,
        // truncate the timestamp to the nearest 5 minutes.
        let now = Utc::now().timestamp();
        let timestamp = Utc.timestamp(now - now.rem_euclid(5 * 60), 0);
        Version {
            version,
            services: our_services,
            timestamp: timestamp,
            address_recv: (their_services, their_ip),
            address_from: (our_services, our_ip),
            nonce,
            user_agent,
            best_block,
            relay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spv_chain::block;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn roundtrips_through_bytes() {
        spv_test::init();
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8333);
        let v = Version::new(
            ProtocolVersion(60002),
            addr,
            PeerServices::NODE_NETWORK,
            PeerServices::NODE_NETWORK,
            addr,
            Nonce(42),
            "/Satoshi:0.7.2/".to_owned(),
            block::Height(0),
            true,
        );
        let bytes = v.bitcoin_serialize_to_vec().unwrap();
        let back = Version::bitcoin_deserialize(&bytes[..]).unwrap();
        assert_eq!(v, back);
    }
}
