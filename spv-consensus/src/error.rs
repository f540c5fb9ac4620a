//! Error types returned by this crate's block and transaction checks.

use chrono::{DateTime, Utc};
use thiserror::Error;

use spv_chain::{block, parameters::Network, work::difficulty::ExpandedDifficulty};

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("block contains duplicate transparent transaction hashes")]
    DuplicateTransaction,

    #[error("block {0:?} {1:?} has invalid difficulty threshold")]
    InvalidDifficulty(block::Height, block::Hash),

    #[error(
        "block {0:?} {1:?} difficulty threshold {2:?} is above the {3:?} difficulty limit {4:?}"
    )]
    TargetDifficultyLimit(
        block::Height,
        block::Hash,
        ExpandedDifficulty,
        Network,
        ExpandedDifficulty,
    ),

    #[error("block {0:?} {1:?} hash is above its difficulty threshold {2:?} on {3:?}")]
    DifficultyFilter(block::Height, block::Hash, ExpandedDifficulty, Network),

    #[error("block {0:?} {1:?} time is not later than the median of the last 11 blocks")]
    TimeTooOld(block::Height, block::Hash),

    #[error(
        "block {0:?} {1:?} does not meet the version supermajority threshold required to \
         activate a new block version"
    )]
    VersionSupermajority(block::Height, block::Hash),

    #[error(
        "block {0:?} {1:?} version {2} coinbase script does not begin with its serialized \
         block height, as BIP34 requires for this version"
    )]
    MissingCoinbaseHeight(block::Height, block::Hash, i32),

    #[error("block {0:?} {1:?} difficulty threshold {2:?} does not match the expected \
             retarget {3:?}")]
    BadDifficultyRetarget(
        block::Height,
        block::Hash,
        ExpandedDifficulty,
        ExpandedDifficulty,
    ),

    #[error("block merkle root {actual:?} does not match the header's {expected:?}")]
    BadMerkleRoot {
        actual: block::merkle::Root,
        expected: block::merkle::Root,
    },

    #[error(transparent)]
    Time(#[from] block::BlockTimeError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Subsidy(#[from] SubsidyError),
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("coinbase transaction must be the first transaction in its block")]
    CoinbasePosition,

    #[error("coinbase input found in a non-coinbase transaction")]
    CoinbaseInputFound,

    #[error("transaction lock time has not yet been reached")]
    LockedUntilAfterBlockTime(DateTime<Utc>),

    #[error("transaction script evaluation failed: {0}")]
    ScriptInvalid(String),

    #[error("transaction spends an output that is not in the UTXO set or mempool")]
    MissingInput,

    #[error("transaction spends more than the sum of its inputs")]
    ValueOverflow,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum SubsidyError {
    #[error("block has no coinbase transaction")]
    NoCoinbase,

    #[error("coinbase transaction pays more than the block subsidy plus fees")]
    SubsidyExceeded,
}
