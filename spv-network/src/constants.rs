//! Protocol- and policy-level constants that aren't part of a coin profile
//! (those live in [`spv_chain::parameters`]) but are still fixed across the
//! whole network core (§4.K, §7).

use std::time::Duration;

use crate::protocol::external::types::ProtocolVersion;

/// The protocol version this node speaks. Bitcoin Core 0.7.2's.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(60_002);

/// The user-agent string advertised in `version` messages.
pub const USER_AGENT: &str = "/Satoshi:0.7.2/";

/// How long to wait for a TCP connection to complete.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a `getheaders` request may go without a `headers` reply before
/// the peer holding the sync lease is considered dead.
pub const HEADERS_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

/// How long to wait for an `inv` of blocks after sending `getblocks`.
pub const GETBLOCKS_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an in-progress block download may run before it's abandoned.
pub const BLOCK_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// How long an in-progress transaction download may run before it's
/// abandoned.
pub const TX_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// The largest peer clock skew this node tolerates before it stops trusting
/// a peer's declared time (but keeps the connection).
pub const MAX_PEER_CLOCK_SKEW: Duration = Duration::from_secs(70 * 60);

/// Minimum number of time samples before the median clock-skew check kicks
/// in.
pub const MIN_PEER_TIME_SAMPLES: usize = 5;

/// Grace period after handshake completion before the sync state machine
/// starts acting on this peer.
pub const SYNC_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How often the inventory state machine sweeps for timed-out in-flight
/// requests.
pub const INVENTORY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How long this node waits before rebroadcasting a transaction it
/// originated and that hasn't confirmed.
pub const TX_REBROADCAST_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// The number of inventory items this node will track as "in progress" at
/// once per peer (§6 inventory state machine).
pub const MAX_INVS_IN_PROGRESS: usize = 10;

/// The number of hash functions used by the broadcast-tx dedup bloom filter.
pub const BLOOM_FILTER_HASH_FUNCTIONS: usize = 32;

/// The size, in bits, of the broadcast-tx dedup bloom filter (2^23 bits,
/// about 1 MiB).
pub const BLOOM_FILTER_BITS: usize = 1 << 23;

/// The number of addresses returned in response to `getaddr`.
pub const GETADDR_SAMPLE_SIZE: usize = 10;

/// The address book bootstraps from DNS seeds once it holds fewer entries
/// than this.
pub const MIN_ADDRESS_BOOK_ENTRIES: usize = 5;

/// The default port DNS-seeded addresses are assumed to listen on, absent
/// other information (overridden per-network by
/// [`spv_chain::parameters::Params::default_port`]).
pub const DEFAULT_PEER_PORT: u16 = 8333;
