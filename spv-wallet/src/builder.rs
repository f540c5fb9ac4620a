//! The transaction builder (§4.I).
//!
//! A builder collects output processors (plain outputs, or a change output
//! that absorbs whatever is left over), an optional set of explicitly
//! chosen spends, and a planner that turns any [`Spend`] the coin selector
//! picks into a [`PlannedInput`] carrying the capability that signs for it.
//! `finish` runs the fee loop, asks [`select_spends`] for more inputs until
//! it balances, and signs every input in place.

use std::collections::HashSet;
use std::convert::TryFrom;

use spv_chain::amount::{Amount, NonNegative};
use spv_chain::compactint::CompactInt;
use spv_chain::parameters::Params;
use spv_chain::transaction::sighash::{signature_hash, SigHashFlags};
use spv_chain::transaction::{LockTime, Transaction};
use spv_chain::transparent::{Input, OutPoint, Output, Script};

use crate::error::WalletError;
use crate::select::select_spends;
use crate::store::{Spend, SpendId, WalletStore};

/// Produces a fixed set of payment outputs.
pub trait OutputProducer {
    fn produce(&self) -> Vec<Output>;
}

/// Produces the zero-amount placeholder for a change output; `finish` fills
/// in its real value (or drops it) once the fee loop settles.
pub trait ChangeProducer {
    fn change_output(&self) -> Output;
}

enum Processor {
    Outputs(Box<dyn OutputProducer>),
    Change(Box<dyn ChangeProducer>),
}

/// Builds the final signed [`Input`] for one input, given the transaction
/// being assembled, that input's index within it, and the SIGHASH digest
/// computed for [`PlannedInput::sign_flags`]. Captures whatever signing
/// material (a private key, a set of cosigners) the spend needs — the
/// "input creator" capability §4.I step 9 describes.
pub type InputSigner = Box<dyn Fn(&Transaction, usize, &[u8; 32]) -> Input>;

/// A spend lined up to be an input, together with the capability that signs
/// for it and the information the fee loop needs before it's signed.
pub struct PlannedInput {
    pub outpoint: OutPoint,
    pub amount: Amount<NonNegative>,
    pub prevout_script: Script,
    pub sequence: u32,
    pub sign_flags: SigHashFlags,
    /// The final signature script's expected size, for fee estimation
    /// before the real script exists.
    pub estimated_script_len: usize,
    pub signer: InputSigner,
}

/// A [`PlannedInput`] for a standard pay-to-pubkey-hash spend, signing with
/// `key` under `SIGHASH_ALL`.
pub fn p2pkh_planned_input(spend: &Spend, key: spv_chain::transparent::keys::PrivateKey) -> PlannedInput {
    let pubkey_bytes = if key.compressed {
        key.public_key().serialize().to_vec()
    } else {
        key.public_key().serialize_uncompressed().to_vec()
    };
    let outpoint = spend.outpoint;

    PlannedInput {
        outpoint: spend.outpoint,
        amount: spend.amount,
        prevout_script: spend.lock_script.clone(),
        sequence: 0xFFFF_FFFF,
        sign_flags: SigHashFlags::ALL,
        estimated_script_len: 1 + 72 + 1 + pubkey_bytes.len(),
        signer: Box::new(move |tx, index, digest| {
            let signature = spv_chain::transparent::keys::sign(&key.secret, digest)
                .expect("a valid digest and scalar never fail to sign");
            let mut der = signature.serialize_der().to_vec();
            der.push(SigHashFlags::ALL.to_byte());

            let mut script = Vec::with_capacity(1 + der.len() + 1 + pubkey_bytes.len());
            script.push(der.len() as u8);
            script.extend_from_slice(&der);
            script.push(pubkey_bytes.len() as u8);
            script.extend_from_slice(&pubkey_bytes);

            let _ = (tx, index);
            Input::PrevOut {
                outpoint,
                unlock_script: Script(script),
                sequence: 0xFFFF_FFFF,
            }
        }),
    }
}

/// Collects output processors and a spend plan, and assembles a signed
/// transaction from them (§4.I).
pub struct TransactionBuilder<'a> {
    wallet: &'a WalletStore,
    params: Params,
    processors: Vec<Processor>,
    explicit_inputs: Vec<PlannedInput>,
    categories: Vec<String>,
    planner: Box<dyn Fn(&Spend) -> PlannedInput + 'a>,
    seed: u64,
}

impl<'a> TransactionBuilder<'a> {
    /// `planner` turns any [`Spend`] [`select_spends`] picks (drawn from
    /// `categories`) into a [`PlannedInput`]; it is never consulted for
    /// explicitly-added inputs, which already arrive pre-planned.
    pub fn new(
        wallet: &'a WalletStore,
        params: Params,
        categories: Vec<String>,
        planner: Box<dyn Fn(&Spend) -> PlannedInput + 'a>,
        seed: u64,
    ) -> Self {
        TransactionBuilder {
            wallet,
            params,
            processors: Vec::new(),
            explicit_inputs: Vec::new(),
            categories,
            planner,
            seed,
        }
    }

    pub fn add_output_producer(&mut self, producer: Box<dyn OutputProducer>) {
        self.processors.push(Processor::Outputs(producer));
    }

    pub fn add_change_producer(&mut self, producer: Box<dyn ChangeProducer>) {
        self.processors.push(Processor::Change(producer));
    }

    pub fn add_explicit_input(&mut self, input: PlannedInput) {
        self.explicit_inputs.push(input);
    }

    /// Runs the §4.I procedure: produce outputs, seed the input set with
    /// any explicit spends, loop the fee calculation against `select_spends`
    /// until it balances, settle the change output, then sign every input.
    pub fn finish(mut self, shuffle_inputs: bool, shuffle_outputs: bool) -> Result<Transaction, WalletError> {
        if shuffle_outputs {
            shuffle(&mut self.processors, self.seed);
        }

        let mut outputs = Vec::new();
        let mut change_indices = Vec::new();
        for processor in &self.processors {
            match processor {
                Processor::Outputs(p) => outputs.extend(p.produce()),
                Processor::Change(p) => {
                    change_indices.push(outputs.len());
                    outputs.push(p.change_output());
                }
            }
        }

        let mut inputs = std::mem::take(&mut self.explicit_inputs);
        let mut excluded: HashSet<SpendId> =
            inputs.iter().map(|i| SpendId(i.outpoint)).collect();
        let categories: Vec<&str> = self.categories.iter().map(String::as_str).collect();

        loop {
            let total_output: i64 = outputs.iter().map(|o| o.value.satoshis()).sum();
            let total_input: i64 = inputs.iter().map(|i| i.amount.satoshis()).sum();

            let size = estimated_size(&inputs, &outputs);
            let size_kb = ((size + 999) / 1000).max(1) as i64;
            let dust_limit = self.params.dust_limit.satoshis();

            let mut recommended_fee = std::cmp::max(
                size_kb * self.params.min_fee.satoshis(),
                size_kb * self.params.min_relay_fee.satoshis(),
            );
            if outputs.iter().any(|o| o.value.satoshis() < dust_limit) {
                recommended_fee = recommended_fee.max(self.params.min_fee.satoshis());
            }
            if recommended_fee > self.params.max_fee.satoshis() {
                return Err(WalletError::TransactionTooExpensive(
                    recommended_fee,
                    self.params.max_fee.satoshis(),
                ));
            }

            if total_input < total_output + recommended_fee {
                let shortfall = total_output + recommended_fee - total_input;
                let selected = select_spends(self.wallet, &categories, shortfall, &excluded, dust_limit, self.seed);
                if selected.is_empty() {
                    return Err(WalletError::InsufficientInputs);
                }
                for id in selected {
                    excluded.insert(id);
                    if let Some(spend) = self.wallet.spend(id) {
                        inputs.push((self.planner)(spend));
                    }
                }
                continue;
            }

            let surplus = total_input - total_output - recommended_fee;
            settle_change(&mut outputs, &change_indices, surplus)?;
            break;
        }

        if shuffle_inputs {
            shuffle(&mut inputs, self.seed);
        }

        let placeholder_inputs: Vec<Input> = inputs
            .iter()
            .map(|i| Input::PrevOut {
                outpoint: i.outpoint,
                unlock_script: Script(Vec::new()),
                sequence: i.sequence,
            })
            .collect();
        let skeleton = Transaction::new(1, placeholder_inputs, outputs, LockTime::default());

        let mut signed_inputs = Vec::with_capacity(inputs.len());
        for (index, planned) in inputs.iter().enumerate() {
            let digest = signature_hash(&skeleton, index, &planned.prevout_script, planned.sign_flags)?;
            signed_inputs.push((planned.signer)(&skeleton, index, &digest));
        }

        Ok(Transaction::new(skeleton.version, signed_inputs, skeleton.outputs, skeleton.locktime))
    }
}

/// Settles the change output(s) once the fee loop balances: drops them all
/// if there's no surplus, otherwise funds the first and drops any extra
/// ones (§4.I step 6/7 only ever expects at most one, but a caller adding
/// several change processors shouldn't panic).
fn settle_change(outputs: &mut Vec<Output>, change_indices: &[usize], surplus: i64) -> Result<(), WalletError> {
    if surplus == 0 {
        let drop: HashSet<usize> = change_indices.iter().copied().collect();
        let mut kept = Vec::with_capacity(outputs.len());
        for (i, output) in outputs.drain(..).enumerate() {
            if !drop.contains(&i) {
                kept.push(output);
            }
        }
        *outputs = kept;
        return Ok(());
    }

    match change_indices.first() {
        Some(&first) => {
            outputs[first].value = Amount::<NonNegative>::try_from(surplus)
                .map_err(|_| WalletError::TransactionTooExpensive(surplus, Amount::<NonNegative>::zero().satoshis()))?;
            let drop: HashSet<usize> = change_indices[1..].iter().copied().collect();
            let mut kept = Vec::with_capacity(outputs.len());
            for (i, output) in outputs.drain(..).enumerate() {
                if !drop.contains(&i) {
                    kept.push(output);
                }
            }
            *outputs = kept;
            Ok(())
        }
        // No change processor registered: the surplus is simply an extra fee.
        None => Ok(()),
    }
}

fn estimated_size(inputs: &[PlannedInput], outputs: &[Output]) -> usize {
    let mut size = 4 + CompactInt::size(inputs.len());
    for input in inputs {
        size += OutPoint::len() + 4 + CompactInt::size(input.estimated_script_len) + input.estimated_script_len;
    }
    size += CompactInt::size(outputs.len());
    for output in outputs {
        size += output.len();
    }
    size + 4
}

/// A coprime-step shuffle in the same style as [`crate::select::select_spends`]'s
/// visitation order: deterministic given `seed`, with no external RNG
/// dependency.
fn shuffle<T>(items: &mut [T], seed: u64) {
    let len = items.len();
    if len < 2 {
        return;
    }
    let mut step = 1 + (seed as usize % len);
    while gcd(step, len) != 1 {
        step += 1;
    }
    let mut order: Vec<usize> = (0..len).map(|i| (i * step) % len).collect();
    // Apply the permutation via repeated swaps so it works in place on `[T]`.
    for i in 0..len {
        while order[i] != i {
            let j = order[i];
            items.swap(i, j);
            order.swap(i, j);
        }
    }
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spv_chain::parameters::Network;
    use spv_chain::transaction::Hash as TxHash;
    use spv_chain::transparent::keys::PrivateKey;

    struct FixedOutput(Output);

    impl OutputProducer for FixedOutput {
        fn produce(&self) -> Vec<Output> {
            vec![self.0.clone()]
        }
    }

    struct PlainChange(Script);

    impl ChangeProducer for PlainChange {
        fn change_output(&self) -> Output {
            Output { value: Amount::<NonNegative>::zero(), lock_script: self.0.clone() }
        }
    }

    fn scalar(byte: u8) -> secp256k1::SecretKey {
        let mut bytes = [0u8; 32];
        bytes[31] = byte;
        secp256k1::SecretKey::from_slice(&bytes).unwrap()
    }

    #[test]
    fn balances_exactly_with_one_explicit_input_and_no_change() {
        spv_test::init();
        let wallet = WalletStore::new();
        let key = PrivateKey::new(scalar(7), Network::Mainnet, true);
        let params = Network::Mainnet.params();

        let payment = Output {
            value: Amount::<NonNegative>::try_from(10_000i64).unwrap(),
            lock_script: Script(vec![0; 25]),
        };

        let spend = Spend {
            outpoint: OutPoint { hash: TxHash([1; 32]), index: 0 },
            amount: Amount::<NonNegative>::try_from(10_000i64 + 100_000).unwrap(),
            lock_script: Script(vec![1; 25]),
            category: "pkh".to_string(),
            spent_by: None,
        };

        let mut builder = TransactionBuilder::new(
            &wallet,
            params,
            vec!["pkh".to_string()],
            Box::new(|spend| p2pkh_planned_input(spend, key)),
            42,
        );
        builder.add_output_producer(Box::new(FixedOutput(payment)));
        builder.add_change_producer(Box::new(PlainChange(Script(vec![2; 25]))));
        builder.add_explicit_input(p2pkh_planned_input(&spend, key));

        let tx = builder.finish(false, false).unwrap();
        assert_eq!(tx.inputs.len(), 1);
        assert!(tx.outputs.len() >= 1);
    }

    #[test]
    fn fails_with_insufficient_inputs_when_nothing_is_spendable() {
        spv_test::init();
        let wallet = WalletStore::new();
        let params = Network::Mainnet.params();

        let payment = Output {
            value: Amount::<NonNegative>::try_from(10_000i64).unwrap(),
            lock_script: Script(vec![0; 25]),
        };

        let builder = TransactionBuilder::new(
            &wallet,
            params,
            vec!["pkh".to_string()],
            Box::new(|spend: &Spend| {
                let key = PrivateKey::new(scalar(1), Network::Mainnet, true);
                p2pkh_planned_input(spend, key)
            }),
            1,
        );
        let mut builder = builder;
        builder.add_output_producer(Box::new(FixedOutput(payment)));

        let result = builder.finish(false, false);
        assert!(matches!(result, Err(WalletError::InsufficientInputs)));
    }
}
