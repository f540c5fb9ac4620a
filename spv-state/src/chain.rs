//! The header chain engine (§4.E): a map from block hash to [`BlockLink`],
//! an orphan index for headers whose predecessor hasn't arrived yet, and
//! `select_best_chain`'s reorg walk.
//!
//! Everything here is driven by [`ChainState::connect_headers`]: a caller
//! (the network core's sync state machine) hands over a batch of headers in
//! chain order and gets back the ordered `block_removed`/`block_added`
//! events a reorg produced, or the validation error that stopped the batch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Tree;
use tracing::{debug, info, warn};

use spv_chain::{
    block::{self, Header},
    parameters::{network_upgrade::NetworkUpgrade, Checkpoint, Network},
    work::difficulty::{ExpandedDifficulty, Work},
};
use spv_consensus::block::check;

use crate::config::Config;
use crate::error::StateError;
use crate::sled_format::{height_key, TypedTree};

/// How many past block times feed the median-time-past rule.
const MEDIAN_TIME_SPAN: usize = 11;
/// Blocks between each difficulty retarget.
const WORK_INTERVAL: usize = 2016;
/// How many past headers the version-supermajority gate and the persistent
/// ring buffer keep around.
const VERSION_WINDOW: usize = 1000;

/// `(required version, threshold, window)` for a version-supermajority gate,
/// one per soft fork that bumps the minimum block version. Bitcoin Core
/// shipped BIP34/BIP66 at a 750/1000 threshold and tightened to 950/1000 for
/// BIP65; testnet halves the window and keeps the same ratios.
fn version_gates(network: Network) -> [(u32, usize, usize); 3] {
    match network {
        Network::Mainnet => [(2, 750, VERSION_WINDOW), (3, 750, VERSION_WINDOW), (4, 950, VERSION_WINDOW)],
        Network::Testnet => [(2, 51, 100), (3, 51, 100), (4, 75, 100)],
    }
}

mod work_bytes {
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use spv_chain::work::difficulty::Work;

    pub fn serialize<S: Serializer>(work: &Work, ser: S) -> Result<S::Ok, S::Error> {
        let mut bytes = [0u8; 32];
        work.0.to_little_endian(&mut bytes);
        bytes.serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Work, D::Error> {
        let bytes = <[u8; 32]>::deserialize(de)?;
        Ok(Work(U256::from_little_endian(&bytes)))
    }
}

/// One entry in the chain index: a header plus everything derived from its
/// position in the chain. `hash` is cached at insertion time rather than
/// recomputed from `header`, since the synthetic header an on-disk
/// checkpoint is seeded with doesn't carry a real Merkle root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockLink {
    pub header: Header,
    pub hash: block::Hash,
    pub height: block::Height,
    #[serde(with = "work_bytes")]
    pub cumulative_work: Work,
    pub connected: bool,
    pub main_chain: bool,
}

/// A `block_added`/`block_removed` event emitted by a reorg (§4.E step 4),
/// in closest-to-fork-first order.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    BlockAdded { header: Header, height: block::Height },
    BlockRemoved { header: Header, height: block::Height },
}

/// The header chain engine.
pub struct ChainState {
    network: Network,
    tree: Tree,
    links: HashMap<block::Hash, BlockLink>,
    /// Headers waiting on a predecessor that hasn't arrived yet, indexed by
    /// the hash of that missing predecessor.
    orphans: HashMap<block::Hash, Vec<Header>>,
    /// The best chain, in height order, starting at `base_height`.
    main_chain: Vec<block::Hash>,
    base_height: block::Height,
    tip: block::Hash,
    checkpoint: Option<Checkpoint>,
    /// True until the tip is recent enough that the caller should switch
    /// from headers-only sync to downloading full blocks (§4.E).
    pub needs_headers: bool,
    sync_block_start: Option<block::Height>,
}

impl ChainState {
    /// Opens (or creates) the chain index under `config`'s cache directory,
    /// seeding genesis and `network`'s hard checkpoint (if any) on a fresh
    /// database.
    pub fn new(
        config: &Config,
        network: Network,
        wallet_creation_time: DateTime<Utc>,
    ) -> Result<ChainState, StateError> {
        let db = sled::open(config.chain_db_path())?;
        let tree = db.open_tree("links")?;
        let params = network.params();

        let mut state = ChainState {
            network,
            tree,
            links: HashMap::new(),
            orphans: HashMap::new(),
            main_chain: Vec::new(),
            base_height: block::Height::MIN,
            tip: params.genesis_hash,
            checkpoint: params.checkpoint,
            needs_headers: true,
            sync_block_start: None,
        };

        if state.load_from_disk()? {
            info!(tip = %state.tip, height = %state.tip_height(), "loaded chain state from disk");
        } else {
            state.seed_genesis();
            state.persist_ring_buffer()?;
            info!("seeded fresh chain state at genesis");
        }

        state.update_needs_headers(wallet_creation_time);
        Ok(state)
    }

    fn seed_genesis(&mut self) {
        let params = self.network.params();
        let genesis_header = Header::new(
            1,
            spv_chain::parameters::genesis::GENESIS_PREVIOUS_BLOCK_HASH,
            std::iter::empty().collect(),
            params.genesis_time,
            params.genesis_bits,
            0,
        );
        let genesis = BlockLink {
            header: genesis_header,
            hash: params.genesis_hash,
            height: block::Height::MIN,
            cumulative_work: params
                .genesis_bits
                .to_expanded()
                .expect("coin profile genesis bits are valid")
                .to_work(),
            connected: true,
            main_chain: true,
        };
        self.tip = params.genesis_hash;
        self.base_height = block::Height::MIN;
        self.main_chain = vec![params.genesis_hash];
        self.links.insert(params.genesis_hash, genesis);

        // Checkpoints are seeded alongside genesis with a placeholder
        // header: its only job is to carry `difficulty_threshold` and
        // `time` forward for the next retarget, since nothing before it is
        // ever revalidated.
        if let Some(checkpoint) = self.checkpoint {
            let link = BlockLink {
                header: Header::new(
                    0,
                    block::Hash([0; 32]),
                    std::iter::empty().collect(),
                    checkpoint.time,
                    checkpoint.bits,
                    0,
                ),
                hash: checkpoint.hash,
                height: checkpoint.height,
                cumulative_work: checkpoint
                    .bits
                    .to_expanded()
                    .expect("checkpoint bits are valid")
                    .to_work(),
                connected: true,
                main_chain: true,
            };
            self.tip = checkpoint.hash;
            self.base_height = checkpoint.height;
            self.main_chain = vec![checkpoint.hash];
            self.links.insert(checkpoint.hash, link);
        }
    }

    fn load_from_disk(&mut self) -> Result<bool, StateError> {
        let meta: Option<(block::Height, block::Hash)> = self.tree.typed_get(b"meta")?;
        let base_height = match meta {
            Some((base_height, _tip)) => base_height,
            None => return Ok(false),
        };
        self.base_height = base_height;

        let mut height = base_height;
        loop {
            match self.tree.typed_get::<BlockLink>(&height_key(height))? {
                Some(link) => {
                    self.tip = link.hash;
                    self.main_chain.push(link.hash);
                    self.links.insert(link.hash, link);
                    height = height + 1;
                }
                None => break,
            }
        }
        Ok(!self.main_chain.is_empty())
    }

    /// Rewrites the on-disk ring buffer of the last `max(100, WORK_INTERVAL)`
    /// links on the best chain (§4.E "Persistence").
    fn persist_ring_buffer(&mut self) -> Result<(), StateError> {
        let keep = WORK_INTERVAL.max(100);
        let start = self.main_chain.len().saturating_sub(keep);

        self.tree.typed_insert(b"meta", &(self.chain_height_at(start), self.tip))?;
        for (offset, hash) in self.main_chain.iter().enumerate().skip(start) {
            let height = self.chain_height_at(offset);
            self.tree.typed_insert(&height_key(height), &self.links[hash])?;
        }
        Ok(())
    }

    fn chain_height_at(&self, offset: usize) -> block::Height {
        block::Height(self.base_height.0 + offset as u32)
    }

    pub fn tip(&self) -> block::Hash {
        self.tip
    }

    pub fn tip_height(&self) -> block::Height {
        self.links.get(&self.tip).map(|l| l.height).unwrap_or(block::Height::MIN)
    }

    pub fn tip_work(&self) -> Work {
        self.links.get(&self.tip).map(|l| l.cumulative_work).unwrap_or_default()
    }

    pub fn contains(&self, hash: &block::Hash) -> bool {
        self.links.contains_key(hash)
    }

    pub fn get(&self, hash: &block::Hash) -> Option<&BlockLink> {
        self.links.get(hash)
    }

    /// A block locator: the tip, then predecessors at exponentially
    /// doubling steps, down to genesis (§6 "Block locator").
    pub fn locator(&self) -> Vec<block::Hash> {
        let mut hashes = Vec::new();
        let mut step = 1usize;
        let mut index = self.main_chain.len();
        loop {
            if index == 0 {
                break;
            }
            index = index.saturating_sub(step);
            hashes.push(self.main_chain[index]);
            if hashes.len() > 10 {
                step *= 2;
            }
            if index == 0 {
                break;
            }
        }
        hashes
    }

    /// User-configurable height past which the engine switches from
    /// headers-only to full-block sync, regardless of wallet creation time.
    pub fn set_sync_block_start(&mut self, height: block::Height) {
        self.sync_block_start = Some(height);
    }

    fn update_needs_headers(&mut self, wallet_creation_time: DateTime<Utc>) {
        let tip_header = &self.links[&self.tip].header;
        let recent_enough = Utc::now() - tip_header.time < chrono::Duration::hours(24)
            && tip_header.time >= wallet_creation_time;
        let reached_start = self
            .sync_block_start
            .map(|start| self.tip_height() >= start)
            .unwrap_or(false);
        self.needs_headers = !(recent_enough || reached_start);
    }

    /// Ingest a batch of headers arriving in chain order (§4.E).
    pub fn connect_headers(
        &mut self,
        headers: Vec<Header>,
        now: DateTime<Utc>,
        wallet_creation_time: DateTime<Utc>,
    ) -> Result<Vec<ChainEvent>, StateError> {
        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let hashes: Vec<block::Hash> = headers.iter().map(block::Hash::from).collect();

        // Step 1: the batch must be internally linked.
        for (window, hash_window) in headers.windows(2).zip(hashes.windows(2)) {
            if window[1].previous_block_hash != hash_window[0] {
                return Err(StateError::BatchNotLinked(hash_window[1]));
            }
        }

        // Step 2: the first header must extend a link we already know.
        let first = &headers[0];
        if !self.links.contains_key(&first.previous_block_hash) {
            return Err(StateError::DoesNotConnect(first.previous_block_hash));
        }

        let mut events = Vec::new();
        for (header, hash) in headers.into_iter().zip(hashes) {
            if let Err(error) = self.connect_one(header, hash, now) {
                warn!(%error, "dropping invalid header and its descendants");
                continue;
            }
            events.extend(self.select_best_chain(hash)?);
        }

        self.update_needs_headers(wallet_creation_time);
        Ok(events)
    }

    /// Validates and inserts one header (§4.E step 3), then attempts to
    /// connect any orphans that were waiting on it.
    fn connect_one(&mut self, header: Header, hash: block::Hash, now: DateTime<Utc>) -> Result<(), StateError> {
        if self.links.contains_key(&hash) {
            return Ok(());
        }

        let prev = match self.links.get(&header.previous_block_hash) {
            Some(prev) if prev.connected => prev.clone(),
            _ => {
                self.orphans
                    .entry(header.previous_block_hash)
                    .or_default()
                    .push(header);
                return Ok(());
            }
        };

        let height = prev.height + 1;
        check::time_is_valid_at(&header, now, &height, &hash)?;

        let predecessor_times = self.predecessor_times(&prev.hash, MEDIAN_TIME_SPAN);
        check::time_is_not_too_old(&header, &predecessor_times, &height, &hash)?;

        let expected_target = self.expected_difficulty(&prev, &header);
        check::difficulty_retarget_is_valid(&header, expected_target, &height, &hash)?;
        check::difficulty_is_valid(&header, self.network, &height, &hash)?;

        for (required_version, threshold, window) in version_gates(self.network) {
            let recent_versions = self.predecessor_versions(&prev.hash, window);
            check::version_supermajority_is_met(
                &header,
                &recent_versions,
                required_version,
                threshold,
                window,
                &height,
                &hash,
            )?;
        }

        let work = header
            .difficulty_threshold
            .to_expanded()
            .expect("difficulty_is_valid already rejected an invalid encoding")
            .to_work();

        let link = BlockLink {
            header,
            hash,
            height,
            cumulative_work: prev.cumulative_work + work,
            connected: true,
            main_chain: false,
        };
        self.links.insert(hash, link);
        debug!(%hash, %height, "connected header");

        if let Some(waiting) = self.orphans.remove(&hash) {
            for orphan in waiting {
                let orphan_hash = block::Hash::from(&orphan);
                self.connect_one(orphan, orphan_hash, now)?;
            }
        }

        Ok(())
    }

    /// Returns `expected_next_work(prev, header.time)` (§4.E): unchanged
    /// outside a retarget boundary, recomputed at one, with testnet's
    /// minimum-difficulty exception layered on top.
    fn expected_difficulty(&self, prev: &BlockLink, header: &Header) -> ExpandedDifficulty {
        if self.network == Network::Testnet
            && NetworkUpgrade::is_testnet_min_difficulty_block(
                self.network,
                prev.height + 1,
                header.time,
                prev.header.time,
            )
        {
            return ExpandedDifficulty::target_difficulty_limit(self.network);
        }

        let height = prev.height + 1;
        if height.0 as usize % WORK_INTERVAL != 0 {
            // Outside a retarget boundary the target carries over, unless
            // the previous block itself was a testnet minimum-difficulty
            // exception, in which case we fall back to the last
            // non-exception bits on this chain.
            if self.network == Network::Testnet {
                return self.last_non_min_difficulty_target(&prev.hash);
            }
            return prev
                .header
                .difficulty_threshold
                .to_expanded()
                .expect("a connected link always carries a valid target");
        }

        let window_start = self.nth_ancestor(&prev.hash, WORK_INTERVAL - 1);
        let previous_target = window_start
            .header
            .difficulty_threshold
            .to_expanded()
            .expect("a connected link always carries a valid target");
        check::expected_difficulty(
            self.network,
            previous_target,
            Some((window_start.header.time, prev.header.time)),
        )
    }

    fn last_non_min_difficulty_target(&self, from: &block::Hash) -> ExpandedDifficulty {
        let limit = ExpandedDifficulty::target_difficulty_limit(self.network);
        let mut cursor = self.links.get(from);
        while let Some(link) = cursor {
            let target = link
                .header
                .difficulty_threshold
                .to_expanded()
                .expect("a connected link always carries a valid target");
            if target != limit || link.height.0 as usize % WORK_INTERVAL == 0 {
                return target;
            }
            cursor = self.links.get(&link.header.previous_block_hash);
        }
        limit
    }

    fn nth_ancestor(&self, from: &block::Hash, n: usize) -> BlockLink {
        let mut cursor = self.links[from].clone();
        for _ in 0..n {
            match self.links.get(&cursor.header.previous_block_hash) {
                Some(parent) => cursor = parent.clone(),
                None => break,
            }
        }
        cursor
    }

    fn predecessor_times(&self, from: &block::Hash, count: usize) -> Vec<DateTime<Utc>> {
        let mut times = Vec::with_capacity(count);
        let mut cursor = self.links.get(from);
        while times.len() < count {
            match cursor {
                Some(link) => {
                    times.push(link.header.time);
                    cursor = self.links.get(&link.header.previous_block_hash);
                }
                None => break,
            }
        }
        times.reverse();
        times
    }

    fn predecessor_versions(&self, from: &block::Hash, count: usize) -> Vec<u32> {
        let mut versions = Vec::with_capacity(count);
        let mut cursor = self.links.get(from);
        while versions.len() < count {
            match cursor {
                Some(link) => {
                    versions.push(link.header.version);
                    cursor = self.links.get(&link.header.previous_block_hash);
                }
                None => break,
            }
        }
        versions.reverse();
        versions
    }

    /// §4.E step 4: if `candidate` beats the tip's cumulative work, walk
    /// both branches back to their fork point and emit ordered reorg
    /// events.
    fn select_best_chain(&mut self, candidate: block::Hash) -> Result<Vec<ChainEvent>, StateError> {
        let candidate_link = self.links[&candidate].clone();
        let tip_link = self.links[&self.tip].clone();

        if candidate_link.cumulative_work <= tip_link.cumulative_work {
            return Ok(Vec::new());
        }

        let mut old_branch = vec![tip_link.clone()];
        let mut new_branch = vec![candidate_link.clone()];
        let mut old_cursor = tip_link;
        let mut new_cursor = candidate_link;

        while old_cursor.height > new_cursor.height {
            old_cursor = self.links[&old_cursor.header.previous_block_hash].clone();
            old_branch.push(old_cursor.clone());
        }
        while new_cursor.height > old_cursor.height {
            new_cursor = self.links[&new_cursor.header.previous_block_hash].clone();
            new_branch.push(new_cursor.clone());
        }
        while old_cursor.hash != new_cursor.hash {
            old_cursor = self.links[&old_cursor.header.previous_block_hash].clone();
            old_branch.push(old_cursor.clone());
            new_cursor = self.links[&new_cursor.header.previous_block_hash].clone();
            new_branch.push(new_cursor.clone());
        }
        // `old_cursor`/`new_cursor` both now sit at the fork point, which is
        // not itself removed or added.
        old_branch.pop();
        new_branch.pop();

        let mut events = Vec::new();
        // Closest-to-fork-first: both vectors were built tip-outward, so
        // they're already in closest-to-fork-first order for removal and
        // need reversing for addition.
        for removed in &old_branch {
            if let Some(link) = self.links.get_mut(&removed.hash) {
                link.main_chain = false;
            }
            events.push(ChainEvent::BlockRemoved { header: removed.header, height: removed.height });
        }
        for added in new_branch.iter().rev() {
            if let Some(link) = self.links.get_mut(&added.hash) {
                link.main_chain = true;
            }
            events.push(ChainEvent::BlockAdded { header: added.header, height: added.height });
        }

        let fork_height = old_cursor.height;
        let fork_offset = (fork_height - self.base_height) as usize;
        self.main_chain.truncate(fork_offset + 1);
        for added in new_branch.iter().rev() {
            self.main_chain.push(added.hash);
        }
        self.tip = candidate;

        self.persist_ring_buffer()?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spv_chain::{parameters::Network, work::difficulty::CompactDifficulty};
    use tempdir::TempDir;

    fn fresh_state(network: Network) -> (TempDir, ChainState) {
        let dir = TempDir::new("spv-state-chain").unwrap();
        let config = Config::with_cache_dir(dir.path(), network);
        let state = ChainState::new(&config, network, Utc::now()).unwrap();
        (dir, state)
    }

    #[test]
    fn seeds_genesis_as_tip() {
        spv_test::init();
        let (_dir, state) = fresh_state(Network::Mainnet);
        assert_eq!(state.tip_height(), block::Height::MIN);
        assert_eq!(state.tip(), Network::Mainnet.params().genesis_hash);
    }

    #[test]
    fn rejects_a_batch_that_does_not_connect() {
        spv_test::init();
        let (_dir, mut state) = fresh_state(Network::Mainnet);
        let header = Header::new(
            1,
            block::Hash([0xAB; 32]),
            std::iter::empty().collect(),
            Utc::now(),
            CompactDifficulty(0x1d00ffff),
            0,
        );
        let result = state.connect_headers(vec![header], Utc::now(), Utc::now());
        assert!(matches!(result, Err(StateError::DoesNotConnect(_))));
    }

    #[test]
    fn locator_starts_at_tip() {
        spv_test::init();
        let (_dir, state) = fresh_state(Network::Mainnet);
        assert_eq!(state.locator().first(), Some(&state.tip()));
    }
}
