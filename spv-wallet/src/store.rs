//! The wallet store: named collections of watched items, plus the dedicated
//! spend index (§4.G).
//!
//! Items are kept as their serialized bytes rather than as a type parameter
//! per collection: the wallet holds public keys, addresses, redemption
//! scripts, and stealth keys side by side under different collection names,
//! and a single `HashMap<&str, HashMap<Vec<u8>, Metadata>>` lets every
//! monitor share the same store without the wallet crate needing to know
//! each monitor's item type.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use spv_chain::amount::{Amount, NonNegative};
use spv_chain::transaction::{self, Transaction};
use spv_chain::transparent::{OutPoint, Script};

use crate::error::WalletError;
use crate::monitor::{apply_actions, Monitor};

/// A tagged-object metadata blob attached to a watched item or spend.
pub type Metadata = serde_json::Value;

/// Identifies a spend by the outpoint it represents; two spends for the same
/// outpoint are the same spend, which is what makes `add_spend` idempotent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpendId(pub OutPoint);

/// A coin the wallet knows how to spend, or is tracking as spent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spend {
    pub outpoint: OutPoint,
    pub amount: Amount<NonNegative>,
    pub lock_script: Script,
    pub category: String,
    /// Set once a transaction spending this outpoint is known, even before
    /// that transaction is confirmed (§4.H: "records a pending spend even
    /// when we have not yet seen the funding transaction").
    pub spent_by: Option<transaction::Hash>,
}

impl Spend {
    pub fn id(&self) -> SpendId {
        SpendId(self.outpoint)
    }

    pub fn is_spent(&self) -> bool {
        self.spent_by.is_some()
    }

    pub fn is_spendable(&self) -> bool {
        !self.is_spent()
    }
}

#[derive(Default)]
struct Collection {
    items: HashMap<Vec<u8>, Metadata>,
}

/// The wallet's set of named collections and its spend index.
#[derive(Default)]
pub struct WalletStore {
    collections: HashMap<&'static str, Collection>,
    spends: HashMap<SpendId, Spend>,
    spend_order: Vec<SpendId>,
    balance: HashMap<String, i64>,
    balance_spends: HashSet<SpendId>,
    monitors: Vec<Box<dyn Monitor>>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_monitor(&mut self, monitor: Box<dyn Monitor>) {
        self.monitors.push(monitor);
    }

    /// Adds `item` to `collection`, failing if it's already present.
    /// Returns any transactions monitors asked to have saved as a side
    /// effect (forward these to the transaction database; this crate keeps
    /// none of its own).
    pub fn add(
        &mut self,
        collection: &'static str,
        item: Vec<u8>,
        metadata: Metadata,
    ) -> Result<Vec<Transaction>, WalletError> {
        let bucket = self.collections.entry(collection).or_default();
        if bucket.items.contains_key(&item) {
            return Err(WalletError::DuplicateWalletItem(collection));
        }
        bucket.items.insert(item.clone(), metadata.clone());
        let mut actions = Vec::new();
        for monitor in &mut self.monitors {
            actions.extend(monitor.on_new_item(collection, &item, &metadata));
        }
        Ok(apply_actions(self, actions))
    }

    /// Replaces `item`'s metadata in `collection` in place.
    pub fn update(
        &mut self,
        collection: &'static str,
        item: &[u8],
        metadata: Metadata,
    ) -> Result<(), WalletError> {
        let bucket = self
            .collections
            .get_mut(collection)
            .ok_or(WalletError::ItemNotFound(collection))?;
        let slot = bucket
            .items
            .get_mut(item)
            .ok_or(WalletError::ItemNotFound(collection))?;
        *slot = metadata;
        Ok(())
    }

    pub fn get(&self, collection: &'static str, item: &[u8]) -> Option<&Metadata> {
        self.collections.get(collection)?.items.get(item)
    }

    pub fn len(&self, collection: &'static str) -> usize {
        self.collections.get(collection).map(|c| c.items.len()).unwrap_or(0)
    }

    /// Offers every already-stored item and spend to `monitor`, the way a
    /// freshly-loaded wallet rebuilds a monitor's in-memory index.
    pub fn replay_to(&self, monitor: &mut dyn Monitor) {
        for (&collection, bucket) in &self.collections {
            for (item, metadata) in &bucket.items {
                monitor.on_new_item(collection, item, metadata);
            }
        }
        for id in &self.spend_order {
            monitor.on_new_spend(&self.spends[id]);
        }
    }

    fn adjust_balance(&mut self, spend: &Spend, sign: i64) {
        *self.balance.entry(spend.category.clone()).or_insert(0) +=
            sign * spend.amount.satoshis();
        if spend.is_spendable() {
            self.balance_spends.insert(spend.id());
        } else {
            self.balance_spends.remove(&spend.id());
        }
    }

    /// Idempotent insert: a spend already tracked under the same outpoint is
    /// left untouched.
    pub fn add_spend(&mut self, spend: Spend) -> Vec<Transaction> {
        let id = spend.id();
        if self.spends.contains_key(&id) {
            return Vec::new();
        }
        self.spend_order.push(id);
        *self.balance.entry(spend.category.clone()).or_insert(0) += spend.amount.satoshis();
        if spend.is_spendable() {
            self.balance_spends.insert(id);
        }
        let mut actions = Vec::new();
        for monitor in &mut self.monitors {
            actions.extend(monitor.on_new_spend(&spend));
        }
        self.spends.insert(id, spend);
        apply_actions(self, actions)
    }

    /// Replaces a spend in place, preserving its position in the
    /// insertion-ordered index, and re-derives `balance`/`balance_spends`
    /// from the new value. Inserts a new entry if the outpoint wasn't
    /// already tracked.
    pub fn update_spend(&mut self, spend: Spend) -> Vec<Transaction> {
        let id = spend.id();
        match self.spends.get(&id).cloned() {
            Some(old) => {
                self.adjust_balance(&old, -1);
                self.adjust_balance(&spend, 1);
                let mut actions = Vec::new();
                for monitor in &mut self.monitors {
                    actions.extend(monitor.on_new_spend(&spend));
                }
                self.spends.insert(id, spend);
                apply_actions(self, actions)
            }
            None => self.add_spend(spend),
        }
    }

    pub fn spend(&self, id: SpendId) -> Option<&Spend> {
        self.spends.get(&id)
    }

    /// All tracked spends, in insertion order.
    pub fn spends(&self) -> impl Iterator<Item = &Spend> {
        self.spend_order.iter().map(move |id| &self.spends[id])
    }

    pub fn balance(&self, category: &str) -> i64 {
        *self.balance.get(category).unwrap_or(&0)
    }

    /// Offers `tx` to every monitor and applies whatever actions they return,
    /// surfacing any transactions a monitor wants saved.
    pub fn dispatch_tx(&mut self, tx: &Transaction) -> Vec<Transaction> {
        let mut actions = Vec::new();
        for monitor in &mut self.monitors {
            actions.extend(monitor.on_tx(tx));
        }
        apply_actions(self, actions)
    }

    /// Offers a newly-connected block to every monitor.
    pub fn dispatch_block(&mut self, block: &spv_chain::block::Block) -> Vec<Transaction> {
        let mut actions = Vec::new();
        for monitor in &mut self.monitors {
            actions.extend(monitor.on_block(block));
        }
        apply_actions(self, actions)
    }
}
