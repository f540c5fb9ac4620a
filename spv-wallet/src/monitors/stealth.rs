//! Watches stealth-flagged private keys for one-time payments (§4.H).
//!
//! A sender broadcasts an ephemeral public key `E` in an `OP_RETURN` output
//! and pays the one-time address `hash160(d*G + h*G)`, where
//! `h = SHA256(d*E)`, in a second, standard P2PKH output of the same
//! transaction. This monitor recomputes that address against every
//! ephemeral key it sees, for every key it watches; on a match it derives
//! the one-time private key `d + h mod n` (§4.B's `add_scalar`) and hands it
//! to [`crate::monitors::pkh::PkhMonitor`] to watch from then on, via
//! [`MonitorAction::WatchItem`].

use secp256k1::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};

use spv_chain::transaction::Transaction;
use spv_chain::transparent::{
    keys::{add_points, add_scalar, multiply_point, public_from_private, PrivateKey},
    Address, OutPoint, Script, ToAddressWithNetwork,
};
use spv_script::opcodes::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160, OP_RETURN};
use spv_script::parse_script;

use crate::monitor::{Monitor, MonitorAction};
use crate::monitors::pkh;
use crate::store::{Metadata, Spend};

/// The collection this monitor watches for newly-added scanning keys.
pub const WATCHED_KEYS: &str = "stealth_keys";

const CATEGORY: &str = "stealth";

#[derive(Default)]
pub struct StealthMonitor {
    keys: Vec<PrivateKey>,
}

impl StealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Every `OP_RETURN <33-byte compressed pubkey>` output's pushed key.
fn ephemeral_keys(tx: &Transaction) -> Vec<PublicKey> {
    tx.outputs
        .iter()
        .filter_map(|output| {
            let items = parse_script(&output.lock_script.0).ok()?;
            match items.as_slice() {
                [op_return, push] if op_return.opcode == OP_RETURN => {
                    PublicKey::from_slice(push.data.as_ref()?).ok()
                }
                _ => None,
            }
        })
        .collect()
}

/// `d + h mod n` and the matching one-time public key, or `None` if the
/// shared secret happened to hash to an invalid scalar (astronomically
/// unlikely, but `SecretKey::from_slice` can fail).
fn one_time_key(d: &PrivateKey, ephemeral: &PublicKey) -> Option<(SecretKey, PublicKey)> {
    let shared_point = multiply_point(ephemeral, &d.secret);
    let digest = Sha256::digest(&shared_point.serialize()[..]);
    let h = SecretKey::from_slice(&digest).ok()?;
    let h_point = public_from_private(&h);
    let one_time_public = add_points(&d.public_key(), &h_point).ok()?;
    let one_time_secret = add_scalar(&d.secret, &h).ok()?;
    Some((one_time_secret, one_time_public))
}

/// `OP_DUP OP_HASH160 <expected> OP_EQUALVERIFY OP_CHECKSIG`.
fn pays_pub_key_hash(script: &Script, expected: &[u8; 20]) -> bool {
    let items = match parse_script(&script.0) {
        Ok(items) => items,
        Err(_) => return false,
    };
    matches!(
        items.as_slice(),
        [dup, hash160, push, equalverify, checksig]
            if dup.opcode == OP_DUP
                && hash160.opcode == OP_HASH160
                && equalverify.opcode == OP_EQUALVERIFY
                && checksig.opcode == OP_CHECKSIG
                && push.data.as_deref() == Some(expected.as_slice())
    )
}

impl Monitor for StealthMonitor {
    fn on_new_item(&mut self, collection: &str, item: &[u8], _metadata: &Metadata) -> Vec<MonitorAction> {
        if collection != WATCHED_KEYS {
            return Vec::new();
        }
        if let Ok(wif) = std::str::from_utf8(item) {
            if let Ok(key) = PrivateKey::from_wif(wif) {
                self.keys.push(key);
            }
        }
        Vec::new()
    }

    fn on_tx(&mut self, tx: &Transaction) -> Vec<MonitorAction> {
        let ephemerals = ephemeral_keys(tx);
        if ephemerals.is_empty() || self.keys.is_empty() {
            return Vec::new();
        }

        let hash = tx.hash();
        let mut actions = Vec::new();

        for key in &self.keys {
            for ephemeral in &ephemerals {
                let (one_time_secret, one_time_public) = match one_time_key(key, ephemeral) {
                    Some(pair) => pair,
                    None => continue,
                };
                let target = match one_time_public.to_address(key.network) {
                    Address::PayToPublicKeyHash { pub_key_hash, .. } => pub_key_hash,
                    _ => continue,
                };

                for (index, output) in tx.outputs.iter().enumerate() {
                    if !pays_pub_key_hash(&output.lock_script, &target) {
                        continue;
                    }

                    actions.push(MonitorAction::AddSpend(Spend {
                        outpoint: OutPoint { hash, index: index as u32 },
                        amount: output.value,
                        lock_script: output.lock_script.clone(),
                        category: CATEGORY.to_string(),
                        spent_by: None,
                    }));

                    let one_time = PrivateKey::new(one_time_secret, key.network, true);
                    actions.push(MonitorAction::WatchItem {
                        collection: pkh::WATCHED_KEYS,
                        item: one_time.to_wif().into_bytes(),
                        metadata: Metadata::Null,
                    });
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
    use spv_chain::transparent::Output;
    use std::convert::TryFrom;

    fn scalar(byte: u8) -> SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        SecretKey::from_slice(&bytes).unwrap()
    }

    fn p2pkh_script(hash: [u8; 20]) -> Script {
        let mut bytes = vec![OP_DUP, OP_HASH160, 20];
        bytes.extend_from_slice(&hash);
        bytes.push(OP_EQUALVERIFY);
        bytes.push(OP_CHECKSIG);
        Script(bytes)
    }

    #[test]
    fn recognizes_a_payment_to_its_own_one_time_address() {
        spv_test::init();
        let scanning_key = PrivateKey::new(scalar(1), Network::Mainnet, true);
        let ephemeral_secret = scalar(2);
        let ephemeral_public = public_from_private(&ephemeral_secret);

        let (_, one_time_public) = one_time_key(&scanning_key, &ephemeral_public).unwrap();
        let target = match one_time_public.to_address(Network::Mainnet) {
            Address::PayToPublicKeyHash { pub_key_hash, .. } => pub_key_hash,
            _ => unreachable!(),
        };

        let mut monitor = StealthMonitor::new();
        monitor.keys.push(scanning_key);

        let mut op_return = vec![OP_RETURN, 33];
        op_return.extend_from_slice(&ephemeral_public.serialize());

        let tx = Transaction::new(
            1,
            Vec::new(),
            vec![
                Output {
                    value: Amount::<NonNegative>::try_from(0i64).unwrap(),
                    lock_script: Script(op_return),
                },
                Output {
                    value: Amount::<NonNegative>::try_from(10_000i64).unwrap(),
                    lock_script: p2pkh_script(target),
                },
            ],
            LockTime::default(),
        );

        let actions = monitor.on_tx(&tx);
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], MonitorAction::AddSpend(_)));
        assert!(matches!(actions[1], MonitorAction::WatchItem { .. }));
    }
}
