//! The built-in payment monitors (§4.H): pay-to-pubkey-hash/pay-to-pubkey,
//! pay-to-script-hash multisig, and stealth addresses.

pub mod multisig;
pub mod pkh;
pub mod stealth;

pub use multisig::MultisigMonitor;
pub use pkh::PkhMonitor;
pub use stealth::StealthMonitor;

use std::collections::HashMap;

use spv_chain::amount::{Amount, NonNegative};
use spv_chain::transaction;
use spv_chain::transparent::{OutPoint, Script};

use crate::monitor::MonitorAction;
use crate::store::Spend;

/// Shared bookkeeping for a monitor that can recognize either side of a
/// spend, the funding output or the spending input, before the other has
/// been seen: "records a pending spend even when we have not yet seen the
/// funding transaction" (§4.H). Each monitor keeps its own instance, since
/// the `category` a monitor assigns is how the wallet tells monitors'
/// spends apart.
#[derive(Default)]
pub(crate) struct PendingSpends {
    by_outpoint: HashMap<OutPoint, Spend>,
}

impl PendingSpends {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, outpoint: OutPoint, category: &str) -> (&mut Spend, bool) {
        let is_new = !self.by_outpoint.contains_key(&outpoint);
        let spend = self.by_outpoint.entry(outpoint).or_insert_with(|| Spend {
            outpoint,
            amount: Amount::<NonNegative>::zero(),
            lock_script: Script(Vec::new()),
            category: category.to_string(),
            spent_by: None,
        });
        (spend, is_new)
    }

    /// The funding output for `outpoint` was recognized.
    pub(crate) fn observe_output(
        &mut self,
        outpoint: OutPoint,
        amount: Amount<NonNegative>,
        lock_script: Script,
        category: &str,
    ) -> MonitorAction {
        let (spend, is_new) = self.entry(outpoint, category);
        spend.amount = amount;
        spend.lock_script = lock_script;
        let spend = spend.clone();
        if is_new {
            MonitorAction::AddSpend(spend)
        } else {
            MonitorAction::UpdateSpend(spend)
        }
    }

    /// A spending input referencing `outpoint` was recognized.
    pub(crate) fn observe_spend(
        &mut self,
        outpoint: OutPoint,
        spent_by: transaction::Hash,
        category: &str,
    ) -> MonitorAction {
        let (spend, is_new) = self.entry(outpoint, category);
        spend.spent_by = Some(spent_by);
        let spend = spend.clone();
        if is_new {
            MonitorAction::AddSpend(spend)
        } else {
            MonitorAction::UpdateSpend(spend)
        }
    }

    /// Replays an already-known spend (via [`crate::monitor::Monitor::on_new_spend`])
    /// into the cache, so a later output/input observation merges with it
    /// instead of starting fresh.
    pub(crate) fn remember(&mut self, spend: &Spend) {
        self.by_outpoint.insert(spend.outpoint, spend.clone());
    }
}
