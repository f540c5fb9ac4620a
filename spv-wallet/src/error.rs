//! Errors the wallet store and transaction builder can raise (§4.G, §4.I).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WalletError {
    /// `add(collection, item, ..)` was called with an item already present
    /// in that collection.
    #[error("item already present in collection {0:?}")]
    DuplicateWalletItem(&'static str),

    /// `get`/`update` named an item that isn't in the collection.
    #[error("item not found in collection {0:?}")]
    ItemNotFound(&'static str),

    /// The transaction builder's fee-funding loop ran out of spendable
    /// coins before covering the target amount.
    #[error("insufficient spendable funds to cover the requested amount")]
    InsufficientInputs,

    /// The recommended fee for the transaction as currently assembled
    /// exceeds the coin profile's `MAX_FEE`.
    #[error("transaction too expensive: fee {0} exceeds the maximum of {1}")]
    TransactionTooExpensive(i64, i64),

    /// `SIGHASH_SINGLE` was requested for an input with no matching output,
    /// or another sighash-layer failure while signing a built transaction.
    #[error(transparent)]
    SigHash(#[from] spv_chain::transaction::sighash::SigHashError),

    /// The on-disk wallet store (§6) could not be opened or written.
    #[error(transparent)]
    Sled(#[from] sled::Error),

    /// A persisted collection item, spend, or `creation_time` record failed
    /// to decode.
    #[error(transparent)]
    Codec(#[from] bincode::Error),
}
