//! Definitions of network messages.
//!
//! Only the commands this node actually speaks or understands are
//! represented (§4.K "Supported commands"): `version`, `verack`, `ping`,
//! `pong`, `getaddr`, `addr`, `getblocks`, `inv`, `getheaders`, `headers`,
//! `getdata`, `block`, `tx`, `notfound`. Everything else (BIP37 bloom
//! filters, BIP152 compact blocks, `mempool`, `sendheaders`, `feefilter`) is
//! outside this profile's protocol surface; an unrecognized command is
//! logged and the peer is dropped rather than modeled here.

use std::{fmt, sync::Arc};

use spv_chain::block::{self, Block};
use spv_chain::transaction::Transaction;

use super::inv::InventoryHash;
use super::types::*;
use crate::meta_addr::MetaAddr;

mod version;
pub use version::Version;

mod get_blocks;
pub use get_blocks::GetBlocks;

mod get_headers;
pub use get_headers::GetHeaders;

use super::Command;

/// A Bitcoin network message.
///
/// The wire format of each variant is described on the [Bitcoin
/// wiki][btc_wiki_protocol]; this enum stores an internal representation
/// unlinked from that wire format; [`super::Codec`] is solely responsible
/// for translating between the two.
///
/// [btc_wiki_protocol]: https://en.bitcoin.it/wiki/Protocol_documentation
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Message {
    /// A `version` message: begins the handshake, analogous to a TLS
    /// `ClientHello`.
    Version(Version),

    /// A `verack` message, completing the handshake.
    Verack,

    /// A `ping` message, echoed back as `pong` with the same nonce.
    Ping(Nonce),

    /// A `pong` message, in response to a `ping`.
    Pong(Nonce),

    /// A `getaddr` message, requesting a sample of known peer addresses.
    GetAddr,

    /// An `addr` message, carrying a sample of known peer addresses.
    Addr(Vec<MetaAddr>),

    /// A `getblocks` message. This node serves no blocks, so an incoming
    /// one is acknowledged and ignored (§4.K).
    GetBlocks(GetBlocks),

    /// An `inv` message, advertising knowledge of one or more objects.
    Inv(Vec<InventoryHash>),

    /// A `getheaders` message, requesting headers following the last
    /// common block in the sender's locator.
    GetHeaders(GetHeaders),

    /// A `headers` message, in response to `getheaders`.
    Headers(Vec<block::CountedHeader>),

    /// A `getdata` message, requesting the content of specific objects
    /// previously advertised in an `inv`.
    GetData(Vec<InventoryHash>),

    /// A `block` message.
    Block(Arc<Block>),

    /// A `tx` message.
    Tx(Arc<Transaction>),

    /// A `notfound` message: objects requested in a `getdata` that the
    /// sender doesn't have.
    NotFound(Vec<InventoryHash>),
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Message::Version { .. } => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::GetBlocks { .. } => "getblocks",
            Message::Inv(_) => "inv",
            Message::GetHeaders { .. } => "getheaders",
            Message::Headers(_) => "headers",
            Message::GetData(_) => "getdata",
            Message::Block(_) => "block",
            Message::Tx(_) => "tx",
            Message::NotFound(_) => "notfound",
        })
    }
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version { .. } => Command::Version,
            Message::Verack => Command::Verack,
            Message::Ping(_) => Command::Ping,
            Message::Pong(_) => Command::Pong,
            Message::GetAddr => Command::GetAddr,
            Message::Addr(_) => Command::Addr,
            Message::GetBlocks { .. } => Command::GetBlocks,
            Message::Inv(_) => Command::Inv,
            Message::GetHeaders { .. } => Command::GetHeaders,
            Message::Headers(_) => Command::Headers,
            Message::GetData(_) => Command::GetData,
            Message::Block(_) => Command::Block,
            Message::Tx(_) => Command::Tx,
            Message::NotFound(_) => Command::NotFound,
        }
    }
}
