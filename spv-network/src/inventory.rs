//! The inventory state machine: deciding whether to request an advertised
//! object, tracking what's in flight, and deduplicating transactions this
//! node has already seen or originated (§4.K, §6).

use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};

use spv_chain::transaction;

use crate::constants;

/// Whether an advertised object should be requested right now.
#[derive(Debug, Eq, PartialEq)]
pub enum RequestDecision {
    /// Request it immediately.
    Go,
    /// Never request it (already have it, or it's known-bad).
    Dont,
    /// Can't decide yet — too many requests already in flight for this
    /// peer. Try again once one completes or times out.
    Wait,
}

/// An object currently requested from a peer but not yet delivered.
struct InFlight {
    requested_at: Instant,
}

/// A simple counting bloom filter used only to deduplicate transaction
/// hashes this node has already broadcast or received, so it doesn't
/// re-request or re-relay the same transaction to every peer that
/// advertises it. This is an internal bookkeeping structure, unrelated to
/// the wire-protocol BIP37 filter (which this profile doesn't implement).
pub struct TxDedupFilter {
    bits: Vec<bool>,
    seeds: Vec<u64>,
}

impl TxDedupFilter {
    pub fn new() -> TxDedupFilter {
        // Fixed, distinct odd multipliers for each of the k hash functions;
        // any independent family works, since this filter only ever
        // suppresses redundant network traffic, never gates consensus.
        let seeds = (0..constants::BLOOM_FILTER_HASH_FUNCTIONS as u64)
            .map(|i| 0x9E3779B97F4A7C15u64.wrapping_mul(2 * i + 1))
            .collect();
        TxDedupFilter {
            bits: vec![false; constants::BLOOM_FILTER_BITS],
            seeds,
        }
    }

    fn indices(&self, hash: &transaction::Hash) -> impl Iterator<Item = usize> + '_ {
        let key = u64::from_le_bytes(hash.0[0..8].try_into().unwrap());
        self.seeds
            .iter()
            .map(move |seed| (key.wrapping_mul(*seed) as usize) % self.bits.len())
    }

    pub fn contains(&self, hash: &transaction::Hash) -> bool {
        self.indices(hash).all(|i| self.bits[i])
    }

    pub fn insert(&mut self, hash: &transaction::Hash) {
        for i in self.indices(hash).collect::<Vec<_>>() {
            self.bits[i] = true;
        }
    }
}

impl Default for TxDedupFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-peer inventory tracking: what's in flight, and the dedup filter for
/// transactions this node originated and may need to rebroadcast.
pub struct InventoryTracker {
    in_flight: HashMap<transaction::Hash, InFlight>,
    seen: TxDedupFilter,
    /// Hashes this node originated and is tracking for rebroadcast until
    /// they confirm.
    pending_rebroadcast: HashSet<transaction::Hash>,
}

impl InventoryTracker {
    pub fn new() -> InventoryTracker {
        InventoryTracker {
            in_flight: HashMap::new(),
            seen: TxDedupFilter::new(),
            pending_rebroadcast: HashSet::new(),
        }
    }

    /// Decide whether a transaction advertised in an `inv` should be
    /// requested via `getdata` (§6).
    pub fn will_request_tx(&self, hash: &transaction::Hash) -> RequestDecision {
        if self.seen.contains(hash) {
            return RequestDecision::Dont;
        }
        if self.in_flight.len() >= constants::MAX_INVS_IN_PROGRESS {
            return RequestDecision::Wait;
        }
        RequestDecision::Go
    }

    pub fn mark_requested(&mut self, hash: transaction::Hash) {
        self.in_flight.insert(hash, InFlight { requested_at: Instant::now() });
    }

    /// Record a transaction as delivered (or otherwise resolved), so it's
    /// no longer in flight and won't be re-requested.
    pub fn mark_delivered(&mut self, hash: &transaction::Hash) {
        self.in_flight.remove(hash);
        self.seen.insert(hash);
    }

    /// Drop in-flight requests that have been outstanding longer than
    /// `constants::TX_DOWNLOAD_TIMEOUT`, so a peer that never answers
    /// doesn't permanently occupy a request slot.
    pub fn sweep_timeouts(&mut self) {
        let deadline = constants::TX_DOWNLOAD_TIMEOUT;
        self.in_flight
            .retain(|_, in_flight| in_flight.requested_at.elapsed() < deadline);
    }

    /// Register a transaction this node originated, so it gets
    /// rebroadcast if it hasn't confirmed after
    /// `constants::TX_REBROADCAST_INTERVAL`.
    pub fn track_for_rebroadcast(&mut self, hash: transaction::Hash) {
        self.seen.insert(&hash);
        self.pending_rebroadcast.insert(hash);
    }

    pub fn confirm(&mut self, hash: &transaction::Hash) {
        self.pending_rebroadcast.remove(hash);
    }

    pub fn pending_rebroadcasts(&self) -> impl Iterator<Item = &transaction::Hash> {
        self.pending_rebroadcast.iter()
    }
}

impl Default for InventoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_filter_recognizes_inserted_hash() {
        let mut filter = TxDedupFilter::new();
        let hash = transaction::Hash([7; 32]);
        assert!(!filter.contains(&hash));
        filter.insert(&hash);
        assert!(filter.contains(&hash));
    }

    #[test]
    fn tracker_stops_requesting_delivered_tx() {
        let mut tracker = InventoryTracker::new();
        let hash = transaction::Hash([1; 32]);
        assert_eq!(tracker.will_request_tx(&hash), RequestDecision::Go);
        tracker.mark_requested(hash);
        tracker.mark_delivered(&hash);
        assert_eq!(tracker.will_request_tx(&hash), RequestDecision::Dont);
    }

    #[test]
    fn tracker_waits_once_in_flight_limit_reached() {
        let mut tracker = InventoryTracker::new();
        for i in 0..constants::MAX_INVS_IN_PROGRESS {
            let hash = transaction::Hash([i as u8; 32]);
            assert_eq!(tracker.will_request_tx(&hash), RequestDecision::Go);
            tracker.mark_requested(hash);
        }
        let overflow = transaction::Hash([255; 32]);
        assert_eq!(tracker.will_request_tx(&overflow), RequestDecision::Wait);
    }
}
