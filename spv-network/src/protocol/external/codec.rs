//! A Tokio codec mapping byte streams to Bitcoin message streams (§4.A
//! `network_message`).

use std::fmt;
use std::io::{Cursor, Write};
use std::sync::Arc;

use crate::meta_addr::MetaAddr;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use spv_chain::{
    block,
    parameters::Network,
    serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError as Error},
    transaction::Transaction,
};

use tracing::trace;

use crate::constants;

use super::{command::Command, inv::InventoryHash, message::Message, types::*};

/// The length of a Bitcoin message header: `magic(4) || command(12) ||
/// length(4) || checksum(4)`.
const HEADER_LEN: usize = 24;

/// Maximum size of a protocol message body (§4.A `MAX_MESSAGE_SIZE`).
const MAX_PROTOCOL_MESSAGE_LEN: usize = 2 * 1024 * 1024;

/// A codec which produces Bitcoin messages from byte streams and vice versa.
pub struct Codec {
    builder: Builder,
    state: DecodeState,
}

/// A builder for specifying [`Codec`] options.
pub struct Builder {
    network: Network,
    version: ProtocolVersion,
    max_len: usize,
    metrics_label: Option<String>,
}

impl Codec {
    pub fn builder() -> Builder {
        Builder {
            network: Network::Mainnet,
            version: constants::CURRENT_VERSION,
            max_len: MAX_PROTOCOL_MESSAGE_LEN,
            metrics_label: None,
        }
    }

    /// Reconfigure the version used by the codec, e.g. after completing a
    /// handshake.
    pub fn reconfigure_version(&mut self, version: ProtocolVersion) {
        self.builder.version = version;
    }
}

impl Builder {
    pub fn finish(self) -> Codec {
        Codec {
            builder: self,
            state: DecodeState::Head,
        }
    }

    pub fn for_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    #[allow(dead_code)]
    pub fn for_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    #[allow(dead_code)]
    pub fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_len = len;
        self
    }

    pub fn with_metrics_label(mut self, metrics_label: String) -> Self {
        self.metrics_label = Some(metrics_label);
        self
    }
}

// ======== Encoding =========

impl Encoder<Message> for Codec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        use Error::Parse;

        let mut body = Vec::new();
        self.write_body(&item, &mut body)?;

        if body.len() > self.builder.max_len {
            return Err(Parse("body length exceeded maximum size"));
        }

        if let Some(label) = self.builder.metrics_label.clone() {
            metrics::counter!("bytes.written", (body.len() + HEADER_LEN) as u64, "addr" => label);
        }

        let command = item.command().bytes();
        trace!(?item, len = body.len());

        let mut header = [0u8; HEADER_LEN];
        let mut header_writer = Cursor::new(&mut header[..]);
        header_writer.write_all(&Magic::from(self.builder.network).0[..])?;
        header_writer.write_all(command)?;
        header_writer.write_u32::<LittleEndian>(body.len() as u32)?;
        header_writer.write_all(&sha256d::Checksum::from(&body[..]).0)?;

        dst.reserve(HEADER_LEN + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);

        Ok(())
    }
}

impl Codec {
    fn write_body<W: Write>(&self, msg: &Message, mut writer: W) -> Result<(), Error> {
        match msg {
            Message::Version(inner) => inner.bitcoin_serialize(&mut writer)?,
            Message::Verack => { /* empty payload */ }
            Message::Ping(nonce) => nonce.bitcoin_serialize(&mut writer)?,
            Message::Pong(nonce) => nonce.bitcoin_serialize(&mut writer)?,
            Message::Addr(addrs) => addrs.bitcoin_serialize(&mut writer)?,
            Message::GetAddr => { /* empty payload */ }
            Message::Block(block) => block.bitcoin_serialize(&mut writer)?,
            Message::GetBlocks(get_blocks) => {
                self.builder.version.bitcoin_serialize(&mut writer)?;
                get_blocks.bitcoin_serialize(&mut writer)?
            }
            Message::GetHeaders(get_headers) => {
                self.builder.version.bitcoin_serialize(&mut writer)?;
                get_headers.bitcoin_serialize(&mut writer)?
            }
            Message::Headers(headers) => headers.bitcoin_serialize(&mut writer)?,
            Message::Inv(hashes) => hashes.bitcoin_serialize(&mut writer)?,
            Message::GetData(hashes) => hashes.bitcoin_serialize(&mut writer)?,
            Message::NotFound(hashes) => hashes.bitcoin_serialize(&mut writer)?,
            Message::Tx(transaction) => transaction.bitcoin_serialize(&mut writer)?,
        }
        Ok(())
    }
}

// ======== Decoding =========

enum DecodeState {
    Head,
    Body {
        body_len: usize,
        command: Command,
        checksum: sha256d::Checksum,
    },
}

impl fmt::Debug for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeState::Head => write!(f, "DecodeState::Head"),
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => f
                .debug_struct("DecodeState::Body")
                .field("body_len", &body_len)
                .field("command", &command)
                .field("checksum", &checksum)
                .finish(),
        }
    }
}

impl Decoder for Codec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        use Error::Parse;
        match self.state {
            DecodeState::Head => {
                if src.len() < HEADER_LEN {
                    trace!(?self.state, "waiting for a full header");
                    return Ok(None);
                }

                let header = src.split_to(HEADER_LEN);
                let mut header_reader = Cursor::new(&header);
                let magic = Magic(<[u8; 4]>::bitcoin_deserialize(&mut header_reader)?);
                let command = Command::bitcoin_deserialize(&mut header_reader)?;
                let body_len = header_reader.read_u32::<LittleEndian>()? as usize;
                let checksum =
                    sha256d::Checksum(<[u8; 4]>::bitcoin_deserialize(&mut header_reader)?);
                trace!(?self.state, ?magic, command = ?command, body_len, ?checksum, "read header");

                if magic != Magic::from(self.builder.network) {
                    return Err(Parse("supplied magic did not meet expectations"));
                }
                if body_len > self.builder.max_len {
                    return Err(Parse("body length exceeded maximum size"));
                }

                if let Some(label) = self.builder.metrics_label.clone() {
                    metrics::counter!("bytes.read", (body_len + HEADER_LEN) as u64, "addr" => label);
                }

                src.reserve(body_len + HEADER_LEN);

                self.state = DecodeState::Body {
                    body_len,
                    command,
                    checksum,
                };

                self.decode(src)
            }
            DecodeState::Body {
                body_len,
                command,
                checksum,
            } => {
                if src.len() < body_len {
                    trace!(?self.state, len = src.len(), "waiting for a full body");
                    return Ok(None);
                }

                let body = src.split_to(body_len);
                self.state = DecodeState::Head;

                if checksum != sha256d::Checksum::from(&body[..]) {
                    return Err(Parse(
                        "supplied message checksum does not match computed checksum",
                    ));
                }

                let mut body_reader = Cursor::new(&body);
                let msg = match command {
                    Command::Addr => {
                        Message::Addr(Vec::<MetaAddr>::bitcoin_deserialize(&mut body_reader)?)
                    }
                    Command::Version => {
                        Message::Version(Version::bitcoin_deserialize(&mut body_reader)?)
                    }
                    Command::Verack => Message::Verack,
                    Command::GetBlocks => self.read_getblocks(&mut body_reader)?,
                    Command::GetData => Message::GetData(
                        <Vec<InventoryHash>>::bitcoin_deserialize(&mut body_reader)?,
                    ),
                    Command::Block => {
                        Message::Block(<Arc<block::Block>>::bitcoin_deserialize(&mut body_reader)?)
                    }
                    Command::GetHeaders => self.read_getheaders(&mut body_reader)?,
                    Command::Headers => Message::Headers(
                        <Vec<block::CountedHeader>>::bitcoin_deserialize(&mut body_reader)?,
                    ),
                    Command::Inv => {
                        Message::Inv(<Vec<InventoryHash>>::bitcoin_deserialize(&mut body_reader)?)
                    }
                    Command::NotFound => Message::NotFound(
                        <Vec<InventoryHash>>::bitcoin_deserialize(&mut body_reader)?,
                    ),
                    Command::Tx => {
                        Message::Tx(<Arc<Transaction>>::bitcoin_deserialize(&mut body_reader)?)
                    }
                    Command::GetAddr => Message::GetAddr,
                    Command::Ping => Message::Ping(Nonce::bitcoin_deserialize(&mut body_reader)?),
                    Command::Pong => Message::Pong(Nonce::bitcoin_deserialize(&mut body_reader)?),
                };
                trace!("finished message decoding");
                Ok(Some(msg))
            }
        }
    }
}

impl Codec {
    fn read_getblocks<R: std::io::Read>(&self, mut reader: R) -> Result<Message, Error> {
        let received_version = ProtocolVersion::bitcoin_deserialize(&mut reader)?;
        let get_blocks = super::message::GetBlocks::bitcoin_deserialize(&mut reader)?;
        if self.builder.version == received_version {
            Ok(Message::GetBlocks(get_blocks))
        } else {
            Err(Error::Parse("getblocks version did not match negotiation"))
        }
    }

    fn read_getheaders<R: std::io::Read>(&self, mut reader: R) -> Result<Message, Error> {
        let received_version = ProtocolVersion::bitcoin_deserialize(&mut reader)?;
        let get_headers = super::message::GetHeaders::bitcoin_deserialize(&mut reader)?;
        if self.builder.version == received_version {
            Ok(Message::GetHeaders(get_headers))
        } else {
            Err(Error::Parse("getheaders version did not match negotiation"))
        }
    }
}

// XXX replace these interior unit tests with exterior integration tests + proptest
#[cfg(test)]
mod tests {
    use super::*;
    use futures::prelude::*;
    use tokio::runtime::Runtime;

    #[test]
    fn version_message_round_trip() {
        spv_test::init();
        use std::net::{IpAddr, Ipv4Addr, SocketAddr};
        let services = PeerServices::NODE_NETWORK;

        let rt = Runtime::new().unwrap();

        let v = Message::Version(Version::new(
            crate::constants::CURRENT_VERSION,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 6)), 8333),
            services,
            services,
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 6)), 8333),
            Nonce(0x9082_4908_8927_9238),
            "/Satoshi:0.7.2/".to_owned(),
            block::Height(540_000),
            true,
        ));

        use tokio_util::codec::{FramedRead, FramedWrite};
        let v_bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(&mut bytes, Codec::builder().finish());
                fw.send(v.clone())
                    .await
                    .expect("message should be serialized");
            }
            bytes
        });

        let v_parsed = rt.block_on(async {
            let mut fr = FramedRead::new(Cursor::new(&v_bytes), Codec::builder().finish());
            fr.next()
                .await
                .expect("a next message should be available")
                .expect("that message should deserialize")
        });

        assert_eq!(v, v_parsed);
    }

    #[test]
    fn max_msg_size_round_trip() {
        use std::sync::Arc;
        use spv_chain::serialization::BitcoinDeserializeInto;
        spv_test::init();

        let rt = Runtime::new().unwrap();

        let tx: Transaction = spv_test::vectors::DUMMY_TX1
            .bitcoin_deserialize_into()
            .unwrap();
        let msg = Message::Tx(Arc::new(tx));

        use tokio_util::codec::{FramedRead, FramedWrite};

        // The dummy transaction's body is 85 bytes.
        let size = 85;

        rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(
                    &mut bytes,
                    Codec::builder().with_max_body_len(size - 1).finish(),
                );
                fw.send(msg.clone()).await.expect_err(
                    "message should not encode as it is bigger than the max allowed value",
                );
            }
        });

        let msg_bytes = rt.block_on(async {
            let mut bytes = Vec::new();
            {
                let mut fw = FramedWrite::new(
                    &mut bytes,
                    Codec::builder().with_max_body_len(size).finish(),
                );
                fw.send(msg.clone())
                    .await
                    .expect("message should encode with the msg body size as max allowed value");
            }
            bytes
        });

        rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&msg_bytes),
                Codec::builder().with_max_body_len(size - 1).finish(),
            );
            fr.next()
                .await
                .expect("a next message should be available")
                .expect_err("message should not decode as it is bigger than the max allowed value")
        });

        rt.block_on(async {
            let mut fr = FramedRead::new(
                Cursor::new(&msg_bytes),
                Codec::builder().with_max_body_len(size).finish(),
            );
            fr.next()
                .await
                .expect("a next message should be available")
                .expect("message should decode with the msg body size as max allowed value")
        });
    }
}
