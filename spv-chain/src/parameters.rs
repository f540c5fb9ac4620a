//! The coin profile: every network-specific constant the header chain
//! engine, wallet, and network core validate or format against (§6 of the
//! node design).
//!
//! [`Network`] selects between the two profiles this node ships;
//! [`Network::params`] returns the full [`Params`] table for it. Activation
//! heights for individual soft forks live in [`network_upgrade`], and the
//! genesis block's fixed fields live in [`genesis`].

pub mod genesis;
pub mod network_upgrade;

use std::convert::TryFrom;

use chrono::{DateTime, TimeZone, Utc};
use primitive_types::U256;

use crate::{
    amount::{Amount, NonNegative},
    block,
    work::difficulty::CompactDifficulty,
};

/// Which of the two networks this node is configured for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(proptest_derive::Arbitrary))]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "Mainnet"),
            Network::Testnet => write!(f, "Testnet"),
        }
    }
}

/// A hard checkpoint the header chain engine trusts without validating the
/// headers leading up to it. Always falls on a retarget boundary, so the
/// very next retarget has a well-defined previous window.
#[derive(Copy, Clone, Debug)]
pub struct Checkpoint {
    pub height: block::Height,
    pub hash: block::Hash,
    pub time: DateTime<Utc>,
    pub bits: CompactDifficulty,
}

/// The full set of network-specific constants a coin profile carries.
#[derive(Clone, Debug)]
pub struct Params {
    pub network: Network,

    /// The four magic bytes that prefix every message on the wire.
    pub network_magic: [u8; 4],
    /// The TCP port peers listen on by default.
    pub default_port: u16,
    /// Hostnames seeded into the address book on first run.
    pub dns_seeds: &'static [&'static str],

    pub genesis_hash: block::Hash,
    pub genesis_time: DateTime<Utc>,
    pub genesis_bits: CompactDifficulty,

    /// An optional hard checkpoint the chain engine seeds alongside genesis.
    pub checkpoint: Option<Checkpoint>,

    /// The maximum serialized size of a block, in bytes.
    pub max_block_size: u64,
    /// The retarget window's target duration, in seconds.
    pub target_timespan: i64,
    /// The target spacing between blocks, in seconds.
    pub target_spacing: i64,
    /// The number of blocks averaged over for a retarget.
    pub averaging_window: usize,
    /// The loosest difficulty target ever valid on this network.
    pub difficulty_limit: U256,
    /// The number of historical block timestamps used to compute the
    /// median-time-past bound.
    pub median_time_span: usize,

    /// The node's own minimum relay fee, in satoshis per virtual kilobyte.
    pub min_relay_fee: Amount<NonNegative>,
    /// The minimum fee this node's transaction builder will ever pay,
    /// regardless of size, in satoshis per virtual kilobyte.
    pub min_fee: Amount<NonNegative>,
    /// The recommended-fee ceiling the transaction builder refuses to
    /// exceed; hitting it raises `TransactionTooExpensive`.
    pub max_fee: Amount<NonNegative>,
    /// Outputs below this value are refused in transactions this node builds.
    pub dust_limit: Amount<NonNegative>,
    /// How many confirmations a transaction needs before higher layers stop
    /// treating it as reorg-able.
    pub confirmation_depth: u32,

    /// The largest single data push a script evaluator will accept.
    pub max_script_element_size: usize,
    /// The maximum number of non-push opcodes executed per script.
    pub max_script_instructions: usize,

    /// Blocks between each halving of the block reward.
    pub subsidy_halving_interval: u32,
    /// The block reward paid before the first halving, in satoshis.
    pub initial_block_subsidy: Amount<NonNegative>,
}

impl Network {
    /// Returns the full coin profile for this network.
    pub fn params(self) -> Params {
        match self {
            Network::Mainnet => mainnet_params(),
            Network::Testnet => testnet_params(),
        }
    }
}

/// mainnet's all-ones difficulty limit, `0x00000000ffff0000000000000000000000000000000000000000000000000`.
fn mainnet_difficulty_limit() -> U256 {
    CompactDifficulty(0x1d00ffff)
        .to_expanded()
        .expect("mainnet's limit is a valid compact difficulty")
        .0
}

/// testnet's difficulty limit is the same order of magnitude as mainnet's,
/// just reachable by much weaker hardware.
fn testnet_difficulty_limit() -> U256 {
    CompactDifficulty(0x1d00ffff)
        .to_expanded()
        .expect("testnet's limit is a valid compact difficulty")
        .0
}

fn mainnet_params() -> Params {
    Params {
        network: Network::Mainnet,
        network_magic: [0xf9, 0xbe, 0xb4, 0xd9],
        default_port: 8333,
        dns_seeds: &[
            "seed.bitcoin.sipa.be",
            "dnsseed.bluematt.me",
            "dnsseed.bitcoin.dashjr.org",
            "seed.bitcoinstats.com",
        ],
        genesis_hash: genesis::genesis_hash(Network::Mainnet),
        genesis_time: Utc.timestamp(1_231_006_505, 0),
        genesis_bits: CompactDifficulty(0x1d00ffff),
        checkpoint: None,
        max_block_size: crate::block::serialize::MAX_BLOCK_BYTES,
        target_timespan: network_upgrade::POW_AVERAGING_WINDOW as i64 * 10 * 60,
        target_spacing: 10 * 60,
        averaging_window: network_upgrade::POW_AVERAGING_WINDOW,
        difficulty_limit: mainnet_difficulty_limit(),
        median_time_span: 11,
        min_relay_fee: Amount::try_from(1_000i64).expect("1000 sat/kvB is in range"),
        min_fee: Amount::try_from(10_000i64).expect("10000 sat/kvB is in range"),
        max_fee: Amount::try_from(1_000_000i64).expect("1000000 sat/kvB is in range"),
        dust_limit: Amount::try_from(546i64).expect("546 sat is in range"),
        confirmation_depth: 6,
        max_script_element_size: 520,
        max_script_instructions: 201,
        subsidy_halving_interval: 210_000,
        initial_block_subsidy: Amount::try_from(50_0000_0000i64).expect("50 BTC is in range"),
    }
}

fn testnet_params() -> Params {
    Params {
        network: Network::Testnet,
        network_magic: [0x0b, 0x11, 0x09, 0x07],
        default_port: 18333,
        dns_seeds: &[
            "testnet-seed.bitcoin.jonasschnelli.ch",
            "seed.tbtc.petertodd.org",
        ],
        genesis_hash: genesis::genesis_hash(Network::Testnet),
        genesis_time: Utc.timestamp(1_296_688_602, 0),
        genesis_bits: CompactDifficulty(0x1d00ffff),
        checkpoint: None,
        max_block_size: crate::block::serialize::MAX_BLOCK_BYTES,
        target_timespan: network_upgrade::POW_AVERAGING_WINDOW as i64 * 10 * 60,
        target_spacing: 10 * 60,
        averaging_window: network_upgrade::POW_AVERAGING_WINDOW,
        difficulty_limit: testnet_difficulty_limit(),
        median_time_span: 11,
        min_relay_fee: Amount::try_from(1_000i64).expect("1000 sat/kvB is in range"),
        min_fee: Amount::try_from(10_000i64).expect("10000 sat/kvB is in range"),
        max_fee: Amount::try_from(1_000_000i64).expect("1000000 sat/kvB is in range"),
        dust_limit: Amount::try_from(546i64).expect("546 sat is in range"),
        confirmation_depth: 3,
        max_script_element_size: 520,
        max_script_instructions: 201,
        subsidy_halving_interval: 210_000,
        initial_block_subsidy: Amount::try_from(50_0000_0000i64).expect("50 BTC is in range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_and_testnet_have_distinct_magics() {
        assert_ne!(
            Network::Mainnet.params().network_magic,
            Network::Testnet.params().network_magic
        );
    }

    #[test]
    fn testnet_confirms_faster() {
        assert!(
            Network::Testnet.params().confirmation_depth
                < Network::Mainnet.params().confirmation_depth
        );
    }

    #[test]
    fn genesis_hash_matches_network() {
        assert_eq!(
            Network::Mainnet.params().genesis_hash,
            genesis::genesis_hash(Network::Mainnet)
        );
    }
}
