//! The payment-monitor callback interface (§4.H).
//!
//! A monitor watches the wallet's collections and spend index for items it
//! cares about and rebuilds its own in-memory lookup structures from them.
//! `on_new_item`/`on_new_spend` fire both when the wallet is freshly loaded
//! (via [`crate::store::WalletStore::replay_to`]) and whenever a matching
//! item is added at runtime, so a monitor's state is always derivable by
//! replaying the store from scratch.
//!
//! A monitor never touches the store directly: [`WalletStore`] owns the
//! monitors, so a monitor holding a handle back to its owner would need a
//! borrow the type system can't grant. Instead a monitor returns the side
//! effects it wants ([`MonitorAction`]) and the store applies them once the
//! callback returns (spec.md §4.H: "monitors call `wallet.add_spend`... and
//! `txdb.save_tx` as side effects").

use spv_chain::block::Block;
use spv_chain::transaction::Transaction;

use crate::store::{Metadata, Spend, WalletStore};

/// A side effect a monitor wants applied after its callback returns.
pub enum MonitorAction {
    AddSpend(Spend),
    UpdateSpend(Spend),
    /// Forwarded by the caller to the transaction database; this crate has
    /// no txdb of its own to apply it to.
    SaveTx(Box<Transaction>),
    /// Adds a new item to one of the wallet's own collections, e.g. the
    /// stealth-address monitor handing a freshly-derived one-time private
    /// key to [`crate::monitors::pkh::PkhMonitor`] to watch from now on.
    /// A duplicate item is silently ignored, same as a direct
    /// [`WalletStore::add`] call.
    WatchItem {
        collection: &'static str,
        item: Vec<u8>,
        metadata: Metadata,
    },
}

/// Something that watches wallet state for payments it recognizes.
pub trait Monitor: Send {
    /// A new item was added to `collection`. Monitors that don't care about
    /// `collection` should ignore the call.
    fn on_new_item(&mut self, collection: &str, item: &[u8], metadata: &Metadata) -> Vec<MonitorAction> {
        let _ = (collection, item, metadata);
        Vec::new()
    }

    /// A new spend entered the index, or an existing one was replaced.
    fn on_new_spend(&mut self, spend: &Spend) -> Vec<MonitorAction> {
        let _ = spend;
        Vec::new()
    }

    /// A transaction was seen, whether or not it's confirmed yet.
    fn on_tx(&mut self, tx: &Transaction) -> Vec<MonitorAction> {
        let _ = tx;
        Vec::new()
    }

    /// A block was connected to the best chain.
    fn on_block(&mut self, block: &Block) -> Vec<MonitorAction> {
        let _ = block;
        Vec::new()
    }
}

/// Applies the actions a monitor callback returned to `store`.
pub(crate) fn apply_actions(store: &mut WalletStore, actions: Vec<MonitorAction>) -> Vec<Transaction> {
    let mut to_save = Vec::new();
    for action in actions {
        match action {
            MonitorAction::AddSpend(spend) => to_save.extend(store.add_spend(spend)),
            MonitorAction::UpdateSpend(spend) => to_save.extend(store.update_spend(spend)),
            MonitorAction::SaveTx(tx) => to_save.push(*tx),
            MonitorAction::WatchItem { collection, item, metadata } => {
                if let Ok(saved) = store.add(collection, item, metadata) {
                    to_save.extend(saved);
                }
            }
        }
    }
    to_save
}
