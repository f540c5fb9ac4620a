//! The transaction database (§4.F): a persistent `tx-<hex(hash)>` map of
//! every transaction this node has ever seen bound to a block, a
//! `watched_block_height` map from block-hash to main-chain height, and
//! conflict detection delegated to the wallet through [`ConflictPolicy`]
//! (the "(policy hook)" the design calls for, since this crate has no spend
//! index of its own to detect a conflicting spend with). A transaction's
//! depth is derived from the least nonzero height among the blocks it's
//! bound to, so a transaction seen in more than one block (an orphan and
//! its main-chain replacement, say) is depth-tracked correctly through a
//! reorg instead of collapsing to one shared height.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::warn;

use spv_chain::{block, transaction::{Hash as TxHash, Transaction}};

use crate::config::Config;
use crate::error::StateError;
use crate::sled_format::{hash_key, tx_key, TypedTree};

/// Everything kept about one transaction: its raw bytes, and which blocks
/// (if any) have been seen containing it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub in_blocks: HashSet<block::Hash>,
}

/// Delegates conflict detection to whatever tracks spends (the wallet):
/// "is there a transaction on the main chain, at or above `min_depth`
/// confirmations, that spends an input `tx` also spends?"
///
/// This is the policy hook spec.md's transaction database leaves open: the
/// database itself has no UTXO or spend index (§1 Non-goals), so it asks the
/// wallet instead of tracking spends itself.
pub trait ConflictPolicy: Send + Sync {
    fn has_conflicting_spend_at_depth(&self, tx: &Transaction, min_depth: u32) -> bool;
}

/// No watched transaction is ever conflicted. Used where nothing has wired
/// up a real spend index yet (e.g. a node start-up before the wallet store
/// finishes loading).
pub struct NeverConflicts;

impl ConflictPolicy for NeverConflicts {
    fn has_conflicting_spend_at_depth(&self, _tx: &Transaction, _min_depth: u32) -> bool {
        false
    }
}

struct Inner {
    txs: Tree,
    watched_heights: Tree,
    /// In-memory mirror of `txs`' keyspace, for a synchronous `has_tx`
    /// without a disk round trip on the hot path.
    known: HashSet<TxHash>,
    tip_height: block::Height,
}

/// The persistent `tx-<hex(hash)>` → `{raw-tx-bytes, in_blocks}` map and
/// `watched_block_height` map (§4.F), guarded by a single mutex: every
/// operation here is a read-modify-write over those two trees together, and
/// spec.md requires `bind_tx` to precede any `on_block_added` referencing
/// its block.
pub struct TransactionDb {
    _db: Db,
    inner: Mutex<Inner>,
}

impl TransactionDb {
    pub fn open(config: &Config, tip_height: block::Height) -> Result<TransactionDb, StateError> {
        let db = sled::open(config.txdb_path())?;
        let txs = db.open_tree("txs")?;
        let watched_heights = db.open_tree("watched_heights")?;

        let mut known = HashSet::new();
        for entry in txs.iter() {
            let (key, _) = entry?;
            if let Some(hex_hash) = key.strip_prefix(b"tx-") {
                if let Ok(hex_str) = std::str::from_utf8(hex_hash) {
                    if let Ok(hash) = hex_str.parse::<TxHash>() {
                        known.insert(hash);
                    }
                }
            }
        }

        Ok(TransactionDb {
            _db: db,
            inner: Mutex::new(Inner { txs, watched_heights, known, tip_height }),
        })
    }

    pub fn has_tx(&self, hash: &TxHash) -> bool {
        self.inner.lock().expect("txdb mutex poisoned").known.contains(hash)
    }

    /// Idempotently stores a transaction's raw bytes. Does not touch
    /// `in_blocks`; use [`TransactionDb::bind_tx`] to associate it with a
    /// block.
    pub fn save_tx(&self, transaction: Transaction) -> Result<TxHash, StateError> {
        let hash = transaction.hash();
        let mut inner = self.inner.lock().expect("txdb mutex poisoned");
        let key = tx_key(&hash);
        if inner.txs.typed_get::<TransactionRecord>(&key)?.is_none() {
            inner.txs.typed_insert(&key, &TransactionRecord { transaction, in_blocks: HashSet::new() })?;
            inner.known.insert(hash);
        }
        Ok(hash)
    }

    /// Records that `block_hash` contains `hash`, inserting a fresh
    /// `watched_block_height` entry for `block_hash` (at 0, meaning "not yet
    /// known to be on the main chain") the first time this transaction is
    /// bound to it.
    pub fn bind_tx(&self, hash: &TxHash, block_hash: block::Hash) -> Result<(), StateError> {
        let mut inner = self.inner.lock().expect("txdb mutex poisoned");
        let key = tx_key(hash);
        let mut record = inner
            .txs
            .typed_get::<TransactionRecord>(&key)?
            .ok_or_else(|| StateError::UnknownTransaction(*hash))?;

        record.in_blocks.insert(block_hash);
        inner.txs.typed_insert(&key, &record)?;

        let height_key = hash_key(&block_hash);
        if inner.watched_heights.typed_get::<block::Height>(&height_key)?.is_none() {
            inner.watched_heights.typed_insert(&height_key, &block::Height(0))?;
        }
        Ok(())
    }

    /// A block at `height` joined the main chain: its
    /// `watched_block_height` entry picks up `height` (§4.F).
    pub fn on_block_added(&self, block_hash: block::Hash, height: block::Height) -> Result<(), StateError> {
        let mut inner = self.inner.lock().expect("txdb mutex poisoned");
        inner.tip_height = height;
        let key = hash_key(&block_hash);
        inner.watched_heights.typed_insert(&key, &height)?;
        Ok(())
    }

    /// A block left the main chain (reorg): its `watched_block_height`
    /// entry reverts to 0 ("not on the main chain").
    pub fn on_block_removed(&self, block_hash: block::Hash) -> Result<(), StateError> {
        let mut inner = self.inner.lock().expect("txdb mutex poisoned");
        let key = hash_key(&block_hash);
        inner.watched_heights.typed_insert(&key, &block::Height(0))?;
        Ok(())
    }

    /// `tip - min(nonzero heights of hash's in_blocks) + 1`, or 0 with a
    /// warning if none of `hash`'s blocks has a nonzero watched height
    /// (§4.F) — e.g. every block it was seen in has since been reorged out,
    /// or it was bound to none yet.
    pub fn get_tx_depth(&self, hash: &TxHash) -> Result<u32, StateError> {
        let inner = self.inner.lock().expect("txdb mutex poisoned");
        let record = inner.txs.typed_get::<TransactionRecord>(&tx_key(hash))?;
        let in_blocks = record.as_ref().map(|record| &record.in_blocks);

        let mut min_height = None;
        for block_hash in in_blocks.into_iter().flatten() {
            if let Some(height) = inner.watched_heights.typed_get::<block::Height>(&hash_key(block_hash))? {
                if !height.is_min() {
                    min_height = Some(match min_height {
                        Some(current) if current <= height => current,
                        _ => height,
                    });
                }
            }
        }

        match min_height {
            Some(height) => Ok((inner.tip_height - height + 1).max(0) as u32),
            None => {
                warn!(%hash, "depth requested for a transaction with no watched height");
                Ok(0)
            }
        }
    }

    /// A known transaction is conflicted if it has no `in_blocks` entry on
    /// the main chain, yet `policy` reports a spend conflicting with it
    /// confirmed at least `min_depth` deep (§4.F).
    pub fn is_conflicted(
        &self,
        hash: &TxHash,
        policy: &dyn ConflictPolicy,
        min_depth: u32,
    ) -> Result<bool, StateError> {
        let inner = self.inner.lock().expect("txdb mutex poisoned");
        let record = match inner.txs.typed_get::<TransactionRecord>(&tx_key(hash))? {
            Some(record) => record,
            None => return Ok(false),
        };
        let mut on_main_chain = false;
        for block_hash in &record.in_blocks {
            if let Some(height) = inner.watched_heights.typed_get::<block::Height>(&hash_key(block_hash))? {
                if !height.is_min() {
                    on_main_chain = true;
                    break;
                }
            }
        }
        if on_main_chain {
            return Ok(false);
        }
        Ok(policy.has_conflicting_spend_at_depth(&record.transaction, min_depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spv_chain::transparent::{Input, Output};
    use spv_chain::transaction::LockTime;
    use tempdir::TempDir;

    fn fresh_db() -> (TempDir, TransactionDb) {
        let dir = TempDir::new("spv-state-txdb").unwrap();
        let config = Config::with_cache_dir(dir.path(), spv_chain::parameters::Network::Mainnet);
        let db = TransactionDb::open(&config, block::Height(100)).unwrap();
        (dir, db)
    }

    fn dummy_tx(lock: u32) -> Transaction {
        Transaction::new(1, Vec::<Input>::new(), Vec::<Output>::new(), LockTime::Height(block::Height(lock)))
    }

    #[test]
    fn save_is_idempotent_and_visible_in_has_tx() {
        spv_test::init();
        let (_dir, db) = fresh_db();
        let tx = dummy_tx(0);
        let hash = db.save_tx(tx.clone()).unwrap();
        let hash_again = db.save_tx(tx).unwrap();
        assert_eq!(hash, hash_again);
        assert!(db.has_tx(&hash));
    }

    #[test]
    fn bind_then_block_added_sets_depth() {
        spv_test::init();
        let (_dir, db) = fresh_db();
        let tx = dummy_tx(1);
        let hash = db.save_tx(tx).unwrap();
        let block_hash = block::Hash([7; 32]);
        db.bind_tx(&hash, block_hash).unwrap();
        db.on_block_added(block_hash, block::Height(95)).unwrap();
        // Five more blocks connect on top before the tip reaches 100.
        db.on_block_added(block::Hash([8; 32]), block::Height(100)).unwrap();
        assert_eq!(db.get_tx_depth(&hash).unwrap(), 100 - 95 + 1);
    }

    #[test]
    fn depth_survives_a_reorg_when_the_tx_is_in_two_blocks() {
        spv_test::init();
        let (_dir, db) = fresh_db();
        let tx = dummy_tx(6);
        let hash = db.save_tx(tx).unwrap();

        let orphan = block::Hash([11; 32]);
        let main_chain = block::Hash([12; 32]);
        db.bind_tx(&hash, orphan).unwrap();
        db.bind_tx(&hash, main_chain).unwrap();

        db.on_block_added(orphan, block::Height(90)).unwrap();
        db.on_block_added(main_chain, block::Height(100)).unwrap();
        // The orphan is reorged out after the main-chain block is already
        // watched at 100; that 100 must survive independently of orphan's
        // now-zeroed entry.
        db.on_block_removed(orphan).unwrap();

        assert_eq!(db.get_tx_depth(&hash).unwrap(), 100 - 100 + 1);
    }

    #[test]
    fn depth_is_zero_for_unwatched_transaction() {
        spv_test::init();
        let (_dir, db) = fresh_db();
        let tx = dummy_tx(2);
        let hash = db.save_tx(tx).unwrap();
        assert_eq!(db.get_tx_depth(&hash).unwrap(), 0);
    }

    #[test]
    fn block_removed_reverts_watched_height() {
        spv_test::init();
        let (_dir, db) = fresh_db();
        let tx = dummy_tx(3);
        let hash = db.save_tx(tx).unwrap();
        let block_hash = block::Hash([9; 32]);
        db.bind_tx(&hash, block_hash).unwrap();
        db.on_block_added(block_hash, block::Height(90)).unwrap();
        db.on_block_removed(block_hash).unwrap();
        assert_eq!(db.get_tx_depth(&hash).unwrap(), 0);
    }

    #[test]
    fn unconflicted_transaction_with_no_conflicting_spend() {
        spv_test::init();
        let (_dir, db) = fresh_db();
        let tx = dummy_tx(4);
        let hash = db.save_tx(tx).unwrap();
        assert!(!db.is_conflicted(&hash, &NeverConflicts, 1).unwrap());
    }
}
