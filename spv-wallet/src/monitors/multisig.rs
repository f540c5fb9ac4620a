//! Watches pay-to-script-hash redemption scripts shaped as a bare
//! `OP_n <pubkey>...<pubkey> OP_m OP_CHECKMULTISIG` multisig (§4.H).

use std::collections::{HashMap, HashSet};

use spv_chain::transaction::Transaction;
use spv_chain::transparent::{Address, Input, Script, ToAddressWithNetwork};
use spv_script::opcodes::{OP_0, OP_1, OP_16, OP_CHECKMULTISIG, OP_EQUAL, OP_HASH160};
use spv_script::parse_script;

use crate::monitor::{Monitor, MonitorAction};
use crate::monitors::PendingSpends;
use crate::store::{Metadata, Spend};

/// The collection this monitor watches for newly-added redemption scripts.
pub const WATCHED_SCRIPTS: &str = "multisig_scripts";

const CATEGORY: &str = "multisig";

/// Decodes an `OP_1`..`OP_16` small-integer push.
fn small_int(opcode: u8) -> Option<usize> {
    if (OP_1..=OP_16).contains(&opcode) {
        Some((opcode - OP_1) as usize + 1)
    } else {
        None
    }
}

/// `OP_n <pubkey>...<pubkey> OP_m OP_CHECKMULTISIG`, with `1 <= n <= m <= 16`
/// and `m` pubkey pushes of compressed or uncompressed length.
fn is_valid_redeem_script(bytes: &[u8]) -> bool {
    let items = match parse_script(bytes) {
        Ok(items) => items,
        Err(_) => return false,
    };
    if items.len() < 4 {
        return false;
    }
    if items.last().map(|i| i.opcode) != Some(OP_CHECKMULTISIG) {
        return false;
    }
    let m = match small_int(items[items.len() - 2].opcode) {
        Some(m) => m,
        None => return false,
    };
    let n = match small_int(items[0].opcode) {
        Some(n) => n,
        None => return false,
    };
    if n == 0 || n > m || m > 16 {
        return false;
    }
    let pubkeys = &items[1..items.len() - 2];
    pubkeys.len() == m
        && pubkeys
            .iter()
            .all(|item| matches!(item.data.as_ref().map(Vec::len), Some(33) | Some(65)))
}

#[derive(Default)]
pub struct MultisigMonitor {
    by_script_hash: HashMap<[u8; 20], Vec<u8>>,
    known_redeem_scripts: HashSet<Vec<u8>>,
    pending: PendingSpends,
}

impl MultisigMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn watch(&mut self, redeem_script: Vec<u8>) {
        if !is_valid_redeem_script(&redeem_script) {
            return;
        }
        let address = Script(redeem_script.clone()).to_address(spv_chain::parameters::Network::Mainnet);
        // The script hash itself doesn't depend on network, only the
        // address's base58check prefix does; either network's derivation
        // yields the same 20-byte hash.
        if let Address::PayToScriptHash { script_hash, .. } = address {
            self.by_script_hash.insert(script_hash, redeem_script.clone());
        }
        self.known_redeem_scripts.insert(redeem_script);
    }

    /// `OP_HASH160 <20 bytes> OP_EQUAL`.
    fn recognizes_output(&self, script: &Script) -> bool {
        let items = match parse_script(&script.0) {
            Ok(items) => items,
            Err(_) => return false,
        };
        match items.as_slice() {
            [hash160, push, equal] if hash160.opcode == OP_HASH160 && equal.opcode == OP_EQUAL => push
                .data
                .as_ref()
                .filter(|data| data.len() == 20)
                .map(|data| {
                    let mut hash = [0u8; 20];
                    hash.copy_from_slice(data);
                    self.by_script_hash.contains_key(&hash)
                })
                .unwrap_or(false),
            _ => false,
        }
    }

    /// `OP_0 <sig>...<sig> <redemption_script>`.
    fn recognizes_unlock(&self, script: &Script) -> bool {
        let items = match parse_script(&script.0) {
            Ok(items) => items,
            Err(_) => return false,
        };
        match items.as_slice() {
            [zero, rest @ .., redeem] if zero.opcode == OP_0 && rest.iter().all(|i| i.data.is_some()) => redeem
                .data
                .as_ref()
                .map(|data| self.known_redeem_scripts.contains(data))
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl Monitor for MultisigMonitor {
    fn on_new_item(&mut self, collection: &str, item: &[u8], _metadata: &Metadata) -> Vec<MonitorAction> {
        if collection == WATCHED_SCRIPTS {
            self.watch(item.to_vec());
        }
        Vec::new()
    }

    fn on_new_spend(&mut self, spend: &Spend) -> Vec<MonitorAction> {
        if spend.category == CATEGORY {
            self.pending.remember(spend);
        }
        Vec::new()
    }

    fn on_tx(&mut self, tx: &Transaction) -> Vec<MonitorAction> {
        let hash = tx.hash();
        let mut actions = Vec::new();

        for (index, output) in tx.outputs.iter().enumerate() {
            if self.recognizes_output(&output.lock_script) {
                let outpoint = spv_chain::transparent::OutPoint { hash, index: index as u32 };
                actions.push(self.pending.observe_output(
                    outpoint,
                    output.value,
                    output.lock_script.clone(),
                    CATEGORY,
                ));
            }
        }

        for input in &tx.inputs {
            if let Input::PrevOut { outpoint, unlock_script, .. } = input {
                if self.recognizes_unlock(unlock_script) {
                    actions.push(self.pending.observe_spend(*outpoint, hash, CATEGORY));
                }
            }
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_redeem_script() -> Vec<u8> {
        let mut bytes = vec![OP_1];
        bytes.push(33);
        bytes.extend_from_slice(&[0x02; 33]);
        bytes.push(33);
        bytes.extend_from_slice(&[0x03; 33]);
        bytes.push(OP_1 + 1); // OP_2
        bytes.push(OP_CHECKMULTISIG);
        bytes
    }

    #[test]
    fn validates_a_well_formed_redeem_script() {
        spv_test::init();
        assert!(is_valid_redeem_script(&sample_redeem_script()));
    }

    #[test]
    fn rejects_a_redeem_script_with_too_many_signatures_required() {
        spv_test::init();
        let mut bytes = sample_redeem_script();
        bytes[0] = OP_16; // n = 16 > m = 2
        assert!(!is_valid_redeem_script(&bytes));
    }

    #[test]
    fn recognizes_the_p2sh_output_for_a_watched_script() {
        spv_test::init();
        let mut monitor = MultisigMonitor::new();
        let redeem = sample_redeem_script();
        monitor.watch(redeem.clone());

        let address = Script(redeem).to_address(spv_chain::parameters::Network::Mainnet);
        let hash = match address {
            Address::PayToScriptHash { script_hash, .. } => script_hash,
            _ => unreachable!(),
        };
        let mut script_bytes = vec![OP_HASH160, 20];
        script_bytes.extend_from_slice(&hash);
        script_bytes.push(OP_EQUAL);

        assert!(monitor.recognizes_output(&Script(script_bytes)));
    }
}
