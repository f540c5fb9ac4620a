//! Coin selection (§4.G `select_spends`).

use std::collections::HashSet;

use crate::store::{SpendId, WalletStore};

/// A coprime-modulus step size lets us walk every index in `0..len` exactly
/// once without allocating a shuffled copy: `gcd(step, len) == 1` guarantees
/// `(start + i * step) % len` cycles through the full range before repeating.
fn visitation_order(len: usize, seed: u64) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut step = 1 + (seed as usize % len.max(1));
    while gcd(step, len) != 1 {
        step += 1;
    }
    let start = (seed as usize / len.max(1)) % len;
    (0..len).map(|i| (start + i * step) % len).collect()
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Selects spends from `categories` (excluding anything in `exclude`) whose
/// total is at least `target`, preferring a tight subset over a single
/// oversized coin. Returns an empty vector if nothing can cover `target`.
pub fn select_spends(
    store: &WalletStore,
    categories: &[&str],
    target: i64,
    exclude: &HashSet<SpendId>,
    dust_limit: i64,
    seed: u64,
) -> Vec<SpendId> {
    let candidates: Vec<SpendId> = {
        let all: Vec<_> = store.spends().collect();
        let order = visitation_order(all.len(), seed);
        order
            .into_iter()
            .map(|i| all[i])
            .filter(|s| {
                s.is_spendable()
                    && categories.contains(&s.category.as_str())
                    && !exclude.contains(&s.id())
            })
            .map(|s| s.id())
            .collect()
    };

    let threshold = target + dust_limit;
    let mut below: Vec<SpendId> = Vec::new();
    let mut smallest_over: Option<SpendId> = None;

    for &id in &candidates {
        let amount = amount_of(store, id);
        if amount == target {
            return vec![id];
        }
        if amount < threshold {
            below.push(id);
        } else if smallest_over
            .map(|cur| amount < amount_of(store, cur))
            .unwrap_or(true)
        {
            smallest_over = Some(id);
        }
    }

    let below_total: i64 = below.iter().map(|id| amount_of(store, *id)).sum();
    if below_total == target {
        return below;
    }
    if below_total < target {
        return smallest_over.into_iter().collect();
    }

    below.sort_by_key(|id| amount_of(store, *id));
    let approximated = approximate_subset(store, &below, target, dust_limit);

    match (approximated, smallest_over) {
        (Some(subset), Some(over)) => {
            let subset_total: i64 = subset.iter().map(|id| amount_of(store, *id)).sum();
            if subset_total > amount_of(store, over) {
                vec![over]
            } else {
                subset
            }
        }
        (Some(subset), None) => subset,
        (None, Some(over)) => vec![over],
        (None, None) => Vec::new(),
    }
}

fn amount_of(store: &WalletStore, id: SpendId) -> i64 {
    store.spend(id).map(|s| s.amount.satoshis()).unwrap_or(0)
}

/// 1000-iteration subset-sum approximation: each round starts from "every
/// candidate selected" and runs two passes flipping membership, keeping
/// whichever reachable total is closest to (but not under) `target` across
/// all rounds. Retries against `target + dust_limit` if nothing lands
/// exactly on `target`.
fn approximate_subset(
    store: &WalletStore,
    below: &[SpendId],
    target: i64,
    dust_limit: i64,
) -> Option<Vec<SpendId>> {
    if below.is_empty() {
        return None;
    }

    let mut best: Option<(i64, Vec<bool>)> = None;
    let mut rng_state: u64 = 0x2545_f491_4f6c_dd1d ^ below.len() as u64;

    for _ in 0..1000 {
        let mut selected = vec![true; below.len()];
        for _pass in 0..2 {
            for flag in selected.iter_mut() {
                rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
                let coin = (rng_state >> 33) & 1 == 0;
                *flag = coin;
            }
        }

        let total: i64 = below
            .iter()
            .zip(&selected)
            .filter(|(_, &s)| s)
            .map(|(id, _)| amount_of(store, *id))
            .sum();

        if total < target {
            continue;
        }

        let better = match &best {
            None => true,
            Some((best_total, _)) => total < *best_total,
        };
        if better {
            best = Some((total, selected));
        }
    }

    if best.is_none() {
        return approximate_subset_against(store, below, target + dust_limit);
    }

    best.map(|(_, selected)| {
        below
            .iter()
            .zip(selected)
            .filter(|(_, s)| *s)
            .map(|(id, _)| *id)
            .collect()
    })
}

fn approximate_subset_against(
    store: &WalletStore,
    below: &[SpendId],
    target: i64,
) -> Option<Vec<SpendId>> {
    let total: i64 = below.iter().map(|id| amount_of(store, *id)).sum();
    if total < target {
        return None;
    }
    Some(below.to_vec())
}
