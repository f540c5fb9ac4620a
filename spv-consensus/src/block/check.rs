//! Consensus check functions (§4.E).
//!
//! Most of these are pure functions of a block and the coin profile; the
//! three that need chain history (median-time-past, version supermajority,
//! difficulty retarget) take that history as explicit slices supplied by the
//! header chain engine, rather than reaching into shared state themselves.

use chrono::{DateTime, Utc};

use spv_chain::{
    block::{Block, Hash, Header, Height},
    parameters::Network,
    transaction,
    transparent::Input,
    work::difficulty::{clamp_timespan, retarget, ExpandedDifficulty},
};

use crate::error::*;

use super::subsidy;

/// Returns `Ok(())` if there is exactly one coinbase transaction in `Block`,
/// and that coinbase transaction is the first transaction in the block.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition)?;
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound)?;
    }

    Ok(())
}

/// Returns `Ok(())` if `hash` passes the target difficulty limit
/// (`PoWLimit`) and the difficulty filter, based on the fields in `header`.
pub fn difficulty_is_valid(
    header: &Header,
    network: Network,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    let difficulty_threshold = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(*height, *hash))?;

    // These comparisons are u256 integer comparisons: a *greater* value
    // represents *less* work.

    // PoWLimit is context-free; it doesn't depend on any previous blocks.
    if difficulty_threshold > ExpandedDifficulty::target_difficulty_limit(network) {
        Err(BlockError::TargetDifficultyLimit(
            *height,
            *hash,
            difficulty_threshold,
            network,
            ExpandedDifficulty::target_difficulty_limit(network),
        ))?;
    }

    // The difficulty filter is also context-free: the header hash itself
    // must not exceed its own claimed target.
    if difficulty_threshold < *hash {
        Err(BlockError::DifficultyFilter(
            *height,
            *hash,
            difficulty_threshold,
            network,
        ))?;
    }

    Ok(())
}

/// The median of up to the last `median_time_span` predecessor timestamps,
/// in chain order (oldest first). Returns `None` if `predecessor_times` is
/// empty, e.g. for the genesis block.
pub fn median_time_past(predecessor_times: &[DateTime<Utc>]) -> Option<DateTime<Utc>> {
    if predecessor_times.is_empty() {
        return None;
    }
    let mut times: Vec<DateTime<Utc>> = predecessor_times.to_vec();
    times.sort();
    Some(times[times.len() / 2])
}

/// A block's time must be strictly later than the median of its
/// predecessors' times (`predecessor_times`, oldest first, already trimmed
/// to the coin profile's `median_time_span`).
pub fn time_is_not_too_old(
    header: &Header,
    predecessor_times: &[DateTime<Utc>],
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    match median_time_past(predecessor_times) {
        Some(mtp) if header.time <= mtp => Err(BlockError::TimeTooOld(*height, *hash)),
        _ => Ok(()),
    }
}

/// A block's version must meet the supermajority threshold required to be
/// the *minimum* version accepted at this point in the chain: if at least
/// `threshold` of the last `window` predecessor versions are already
/// `>= header.version`'s required successor version, a lower version is
/// rejected. `recent_versions` is ordered oldest-first and is the same
/// window the header chain engine already keeps for BIP34/66/65 activation
/// bookkeeping.
///
/// Returns `Ok(())` until `recent_versions` has accumulated a full window,
/// since the rule is meaningless before there's enough history to measure a
/// supermajority against.
pub fn version_supermajority_is_met(
    header: &Header,
    recent_versions: &[u32],
    required_version: u32,
    threshold: usize,
    window: usize,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    if header.version >= required_version || recent_versions.len() < window {
        return Ok(());
    }
    let met = recent_versions
        .iter()
        .rev()
        .take(window)
        .filter(|v| **v >= required_version)
        .count()
        >= threshold;
    if met {
        Err(BlockError::VersionSupermajority(*height, *hash))
    } else {
        Ok(())
    }
}

/// BIP34: a version-2-or-later block's coinbase input must begin with a
/// minimally-encoded push of the block's own height.
pub fn coinbase_height_is_valid(
    block: &Block,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    if block.header.version < 2 {
        return Ok(());
    }
    let coinbase = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let input = coinbase
        .inputs
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let encoded_height = match input {
        Input::Coinbase { data, .. } => data.parse_height(),
        Input::PrevOut { .. } => None,
    };
    match encoded_height {
        Some(encoded) if encoded == *height => Ok(()),
        _ => Err(BlockError::MissingCoinbaseHeight(
            *height,
            *hash,
            block.header.version as i32,
        )),
    }
}

/// Computes the difficulty target a header at `height` is expected to carry.
/// Outside a retarget boundary this is simply `previous_target`; on a
/// boundary (`retarget_window` is `Some`), it's the clamped proportional
/// adjustment (§4.E) between the window's first and last block times.
pub fn expected_difficulty(
    network: Network,
    previous_target: ExpandedDifficulty,
    retarget_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> ExpandedDifficulty {
    match retarget_window {
        None => previous_target,
        Some((first_block_time, last_block_time)) => {
            let target_timespan = network.params().target_timespan;
            let actual_timespan = (last_block_time - first_block_time).num_seconds();
            let clamped = clamp_timespan(actual_timespan, target_timespan);
            retarget(previous_target, clamped, target_timespan, network)
        }
    }
}

/// A header's difficulty threshold must match `expected_target`, the value
/// [`expected_difficulty`] computes from chain history.
pub fn difficulty_retarget_is_valid(
    header: &Header,
    expected_target: ExpandedDifficulty,
    height: &Height,
    hash: &Hash,
) -> Result<(), BlockError> {
    let actual = header
        .difficulty_threshold
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(*height, *hash))?;
    if actual != expected_target {
        return Err(BlockError::BadDifficultyRetarget(
            *height,
            *hash,
            actual,
            expected_target,
        ));
    }
    Ok(())
}

/// Returns `Ok(())` if the coinbase transaction's total output value does
/// not exceed the block subsidy for `height` on `network`.
///
/// This SPV profile never materializes the UTXO set (§1 Non-goals: "no full
/// block/UTXO validation"), so transaction fees paid into the coinbase can't
/// be computed here; the check is therefore `coinbase outputs <= subsidy`
/// rather than `<= subsidy + fees`, which is conservative (it can reject a
/// high-fee block a fully-validating node would accept) but never accepts a
/// block that inflates the currency.
pub fn subsidy_is_valid(block: &Block, network: Network) -> Result<(), BlockError> {
    let height = block.coinbase_height().ok_or(SubsidyError::NoCoinbase)?;
    let coinbase = block.transactions.get(0).ok_or(SubsidyError::NoCoinbase)?;

    let subsidy = subsidy::general::block_subsidy(height, network)
        .map_err(|_| SubsidyError::SubsidyExceeded)?;

    let total_out: i64 = coinbase
        .outputs
        .iter()
        .map(|output| output.value.satoshis())
        .sum();

    if total_out > subsidy.satoshis() {
        return Err(SubsidyError::SubsidyExceeded)?;
    }

    Ok(())
}

/// Returns `Ok(())` if `header.time` is no more than two hours in the
/// future, according to the node's local clock (`now`). Non-deterministic:
/// clocks vary between nodes, and a block rejected by this rule now may be
/// accepted once more time has passed.
pub fn time_is_valid_at(
    header: &Header,
    now: DateTime<Utc>,
    height: &Height,
    hash: &Hash,
) -> Result<(), spv_chain::block::BlockTimeError> {
    header.time_is_valid_at(now, height, hash)
}

/// Check Merkle root validity. `transaction_hashes` is a precomputed list of
/// transaction hashes.
pub fn merkle_root_validity(
    block: &Block,
    transaction_hashes: &[transaction::Hash],
) -> Result<(), BlockError> {
    let merkle_root = transaction_hashes.iter().cloned().collect();

    if block.header.merkle_root != merkle_root {
        return Err(BlockError::BadMerkleRoot {
            actual: merkle_root,
            expected: block.header.merkle_root,
        });
    }

    // Bitcoin's transaction Merkle trees are malleable, allowing blocks with
    // duplicate transactions to have the same Merkle root as blocks without
    // duplicate transactions (CVE-2012-2459). Duplicate transactions imply a
    // double-spend, so reject them as a defense-in-depth measure.
    use std::collections::HashSet;
    if transaction_hashes.len() != transaction_hashes.iter().collect::<HashSet<_>>().len() {
        return Err(BlockError::DuplicateTransaction);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_odd_window() {
        let t = |s| chrono::Utc.timestamp(s, 0);
        use chrono::TimeZone;
        let times = vec![t(10), t(30), t(20)];
        assert_eq!(median_time_past(&times), Some(t(20)));
    }

    #[test]
    fn median_of_empty_is_none() {
        assert_eq!(median_time_past(&[]), None);
    }

    #[test]
    fn supermajority_not_enforced_before_full_window() {
        use chrono::TimeZone;
        let header = Header::new(
            1,
            Hash([0u8; 32]),
            std::iter::empty().collect(),
            chrono::Utc.timestamp(0, 0),
            spv_chain::work::difficulty::CompactDifficulty(0x1d00ffff),
            0,
        );
        let recent = vec![1u32; 10];
        assert!(version_supermajority_is_met(
            &header,
            &recent,
            2,
            750,
            1000,
            &Height(10),
            &Hash([0u8; 32]),
        )
        .is_ok());
    }
}
