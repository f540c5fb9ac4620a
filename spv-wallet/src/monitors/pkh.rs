//! Watches private keys for pay-to-pubkey-hash and pay-to-pubkey payments
//! (§4.H). Each watched key is derived into both its compressed and
//! uncompressed addresses, since either may have been paid to.

use std::collections::HashMap;

use secp256k1::PublicKey;

use spv_chain::transaction::Transaction;
use spv_chain::transparent::{keys::PrivateKey, Address, Input, Script, ToAddressWithNetwork};
use spv_script::opcodes::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use spv_script::parse_script;

use crate::monitor::{Monitor, MonitorAction};
use crate::monitors::PendingSpends;
use crate::store::{Metadata, Spend};

/// The collection this monitor watches for newly-added private keys,
/// encoded as WIF strings (§6 "Address codec").
pub const WATCHED_KEYS: &str = "pkh_keys";

const CATEGORY: &str = "pkh";

#[derive(Default)]
pub struct PkhMonitor {
    by_pub_key_hash: HashMap<[u8; 20], PrivateKey>,
    by_pub_key_bytes: HashMap<Vec<u8>, PrivateKey>,
    pending: PendingSpends,
}

impl PkhMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn watch(&mut self, key: PrivateKey) {
        let pubkey = key.public_key();
        for compressed in [true, false] {
            let address = if compressed {
                pubkey.to_address(key.network)
            } else {
                pubkey.to_address_uncompressed(key.network)
            };
            if let Address::PayToPublicKeyHash { pub_key_hash, .. } = address {
                self.by_pub_key_hash.insert(pub_key_hash, key);
            }
        }
        self.by_pub_key_bytes.insert(pubkey.serialize().to_vec(), key);
        self.by_pub_key_bytes.insert(pubkey.serialize_uncompressed().to_vec(), key);
    }

    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`, or a bare
    /// pubkey push followed by `OP_CHECKSIG`.
    fn recognizes_output(&self, script: &Script) -> bool {
        let items = match parse_script(&script.0) {
            Ok(items) => items,
            Err(_) => return false,
        };
        match items.as_slice() {
            [dup, hash160, push, equalverify, checksig]
                if dup.opcode == OP_DUP
                    && hash160.opcode == OP_HASH160
                    && equalverify.opcode == OP_EQUALVERIFY
                    && checksig.opcode == OP_CHECKSIG =>
            {
                push.data
                    .as_ref()
                    .filter(|data| data.len() == 20)
                    .map(|data| {
                        let mut hash = [0u8; 20];
                        hash.copy_from_slice(data);
                        self.by_pub_key_hash.contains_key(&hash)
                    })
                    .unwrap_or(false)
            }
            [push, checksig] if checksig.opcode == OP_CHECKSIG => push
                .data
                .as_ref()
                .map(|data| self.by_pub_key_bytes.contains_key(data))
                .unwrap_or(false),
            _ => false,
        }
    }

    /// `<sig> <pubkey>`, the canonical P2PKH signature script.
    fn recognizes_unlock(&self, script: &Script) -> bool {
        let items = match parse_script(&script.0) {
            Ok(items) => items,
            Err(_) => return false,
        };
        match items.as_slice() {
            [sig, pubkey] if sig.data.is_some() => pubkey
                .data
                .as_ref()
                .map(|data| self.by_pub_key_bytes.contains_key(data))
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl Monitor for PkhMonitor {
    fn on_new_item(&mut self, collection: &str, item: &[u8], _metadata: &Metadata) -> Vec<MonitorAction> {
        if collection != WATCHED_KEYS {
            return Vec::new();
        }
        if let Ok(wif) = std::str::from_utf8(item) {
            if let Ok(key) = PrivateKey::from_wif(wif) {
                self.watch(key);
            }
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
    use spv_chain::amount::{Amount, NonNegative};
    use spv_chain::parameters::Network;
    use spv_chain::transaction::LockTime;
    use spv_chain::transparent::{Output, OutPoint};
    use std::convert::TryFrom;

    fn script_bytes(items: &[u8]) -> Vec<u8> {
        items.to_vec()
    }

    fn p2pkh_script(hash: [u8; 20]) -> Script {
        let mut bytes = vec![OP_DUP, OP_HASH160, 20];
        bytes.extend_from_slice(&hash);
        bytes.push(OP_EQUALVERIFY);
        bytes.push(OP_CHECKSIG);
        Script(script_bytes(&bytes))
    }

    fn scalar_one() -> secp256k1::SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        secp256k1::SecretKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn recognizes_a_payment_to_a_watched_key() {
        spv_test::init();
        let key = PrivateKey::new(scalar_one(), Network::Mainnet, true);
        let mut monitor = PkhMonitor::new();
        monitor.watch(key);

        let address = key.public_key().to_address(Network::Mainnet);
        let hash = match address {
            Address::PayToPublicKeyHash { pub_key_hash, .. } => pub_key_hash,
            _ => unreachable!(),
        };

        let tx = Transaction::new(
            1,
            Vec::new(),
            vec![Output {
                value: Amount::<NonNegative>::try_from(5_000i64).unwrap(),
                lock_script: p2pkh_script(hash),
            }],
            LockTime::default(),
        );

        let actions = monitor.on_tx(&tx);
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            MonitorAction::AddSpend(spend) => {
                assert_eq!(spend.outpoint, OutPoint { hash: tx.hash(), index: 0 });
                assert_eq!(spend.amount.satoshis(), 5_000);
            }
            _ => panic!("expected AddSpend"),
        }
    }

    #[test]
    fn ignores_an_unrelated_output() {
        spv_test::init();
        let monitor = PkhMonitor::new();
        assert!(!monitor.recognizes_output(&p2pkh_script([9; 20])));
    }
}
