//! Errors the header chain engine and transaction database can raise.

use thiserror::Error;

use spv_chain::{block, transaction};
use spv_consensus::BlockError;

#[derive(Error, Debug)]
pub enum StateError {
    /// A header batch's first header doesn't extend any link this engine
    /// already knows about (§4.E step 2).
    #[error("header batch does not connect to any known block: {0:?}")]
    DoesNotConnect(block::Hash),

    /// `bind_tx` was called for a transaction `save_tx` never stored.
    #[error("transaction {0:?} was never saved")]
    UnknownTransaction(transaction::Hash),

    /// A header within a batch doesn't chain to the header before it.
    #[error("header {0:?} does not reference the previous header in its batch")]
    BatchNotLinked(block::Hash),

    /// A link failed one of the stateful or stateless consensus checks and
    /// was dropped; its descendants (if any were already queued) are
    /// refused too.
    #[error(transparent)]
    Validation(#[from] BlockError),

    /// A header claims a timestamp more than two hours into the future.
    #[error(transparent)]
    Time(#[from] block::BlockTimeError),

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("(de)serialization error: {0}")]
    Codec(#[from] bincode::Error),
}
