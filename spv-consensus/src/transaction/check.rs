//! Transaction checks.

use chrono::{DateTime, Utc};

use spv_chain::{block, transaction::Transaction};

use crate::error::TransactionError;

/// A transaction must have at least one input and at least one output.
pub fn has_inputs_and_outputs(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        Err(TransactionError::NoInputs)
    } else if tx.outputs.is_empty() {
        Err(TransactionError::NoOutputs)
    } else {
        Ok(())
    }
}

/// A non-coinbase transaction must not contain a coinbase input, and a
/// coinbase transaction must be the first transaction of its block; both
/// checks are exposed here so the block-level check in
/// [`crate::block::check::coinbase_is_first`] can delegate to them per
/// transaction.
pub fn is_not_coinbase(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.contains_coinbase_input() {
        Err(TransactionError::CoinbaseInputFound)
    } else {
        Ok(())
    }
}

/// A transaction's locktime, interpreted either as a block height or a Unix
/// timestamp depending on its magnitude (`locktime < 500_000_000` means a
/// height), must already have passed for the transaction to be valid in a
/// block at `height` mined at `block_time`.
pub fn lock_time_has_passed(
    tx: &Transaction,
    height: block::Height,
    block_time: DateTime<Utc>,
) -> Result<(), TransactionError> {
    use spv_chain::transaction::LockTime;

    match tx.locktime {
        LockTime::Height(locked_height) => {
            if locked_height.0 > height.0 {
                return Err(TransactionError::LockedUntilAfterBlockTime(block_time));
            }
        }
        LockTime::Time(locked_time) => {
            if locked_time > block_time {
                return Err(TransactionError::LockedUntilAfterBlockTime(block_time));
            }
        }
    }
    Ok(())
}
