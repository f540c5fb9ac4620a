//! Wires the header chain engine, transaction database, wallet, and network
//! core together (§9 "actor/task per subsystem"): each lives behind its own
//! lock (or, for the transaction database, its own internal one) and peer
//! sessions are independent tasks that drive them via message passing
//! rather than sharing one global lock.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use spv_chain::block;
use spv_chain::parameters::{Network, Params};
use spv_network::{
    constants,
    inventory::{InventoryTracker, RequestDecision},
    peer::{self, Peer, PeerError},
    protocol::external::{
        message::{GetBlocks, GetHeaders},
        types::{Codec, Nonce, PeerServices, Version},
        Command, InventoryHash, Message,
    },
    sync::{self, SyncAction},
    AddressBook, MetaAddr,
};
use spv_state::{ChainState, TransactionDb};
use spv_wallet::{MultisigMonitor, PersistentWalletStore, PkhMonitor, StealthMonitor};

use crate::config::NodeConfig;

/// The subsystems a peer session reads from and writes into. Each is
/// independently locked; a session never holds more than one lock at a
/// time across an `.await` point.
pub struct Node {
    pub network: Network,
    pub params: Params,
    pub chain: Mutex<ChainState>,
    pub txdb: TransactionDb,
    pub wallet: Mutex<PersistentWalletStore>,
    pub address_book: Mutex<AddressBook>,
    pub peer_goal: usize,
    pub creation_time: chrono::DateTime<chrono::Utc>,
}

impl Node {
    pub fn open(config: &NodeConfig) -> color_eyre::Result<Node> {
        if config.resync {
            info!("--resync: dropping chain index, transaction database, and wallet spend state");
            let _ = std::fs::remove_dir_all(config.state.chain_db_path());
            let _ = std::fs::remove_dir_all(config.state.txdb_path());
            let _ = std::fs::remove_dir_all(config.wallet_db_path());
        }

        let (mut wallet, creation_time) = PersistentWalletStore::open(config.wallet_db_path())?;
        wallet.register_monitor(Box::new(PkhMonitor::new()));
        wallet.register_monitor(Box::new(MultisigMonitor::new()));
        wallet.register_monitor(Box::new(StealthMonitor::new()));

        let chain = ChainState::new(&config.state, config.network, creation_time)?;
        let txdb = TransactionDb::open(&config.state, chain.tip_height())?;

        let address_book_path = config.state.cache_dir.join("peers.dat");
        let mut address_book = AddressBook::open(&address_book_path)?;
        if address_book.len() < constants::MIN_ADDRESS_BOOK_ENTRIES {
            if let Err(error) = address_book.seed_from_dns(config.network) {
                warn!(%error, "DNS seed lookup failed");
            }
        }

        if config.runtime.tor {
            warn!(
                proxy = ?config.runtime.tor_proxy,
                "--tor requested, but this build dials peers directly; a SOCKS proxy layer is not wired up"
            );
        }

        Ok(Node {
            network: config.network,
            params: config.network.params(),
            chain: Mutex::new(chain),
            txdb,
            wallet: Mutex::new(wallet),
            address_book: Mutex::new(address_book),
            peer_goal: config.runtime.peer_goal,
            creation_time,
        })
    }

    /// Runs forever, maintaining `peer_goal` outbound connections.
    pub async fn run(self: Arc<Node>) {
        let mut slots = Vec::new();
        for _ in 0..self.peer_goal {
            slots.push(tokio::spawn(self.clone().maintain_slot()));
        }
        for slot in slots {
            let _ = slot.await;
        }
    }

    /// One outbound connection slot: picks an address, runs a session to
    /// completion, then waits briefly and tries again. Several of these run
    /// concurrently to keep `peer_goal` peers connected.
    async fn maintain_slot(self: Arc<Node>) {
        loop {
            let candidate = self.pick_address().await;
            match candidate {
                Some(addr) => {
                    if let Err(error) = self.clone().run_session(addr).await {
                        debug!(%addr, %error, "peer session ended");
                        let mut book = self.address_book.lock().await;
                        let _ = book.remove(&addr);
                    }
                }
                None => sleep(Duration::from_secs(5)).await,
            }
        }
    }

    async fn pick_address(&self) -> Option<SocketAddr> {
        let mut book = self.address_book.lock().await;
        if book.len() < constants::MIN_ADDRESS_BOOK_ENTRIES {
            let _ = book.seed_from_dns(self.network);
        }
        book.addrs().into_iter().map(|meta| meta.addr).next()
    }

    async fn run_session(self: Arc<Node>, addr: SocketAddr) -> Result<(), PeerError> {
        let our_version = self.version_for(addr).await;
        let codec = Codec::builder().for_network(self.network).finish();
        let mut peer = Peer::connect(addr, our_version, codec).await?;

        {
            let mut book = self.address_book.lock().await;
            let _ = book.upsert(MetaAddr::new(addr, peer::unix_now()));
        }

        let mut inventory = InventoryTracker::new();
        let mut lease = sync::SyncLease::new();
        let peer_best_block = peer.info.best_block;

        self.request_next_step(&mut peer, &mut lease, peer_best_block, true).await?;

        loop {
            let message = match peer.recv().await? {
                Some(message) => message,
                None => return Ok(()),
            };

            match message {
                Message::Ping(nonce) => peer.handle_ping(nonce).await?,
                Message::Pong(_) => {}
                Message::GetAddr => {
                    let sample = {
                        let book = self.address_book.lock().await;
                        book.addrs().into_iter().take(constants::GETADDR_SAMPLE_SIZE).collect()
                    };
                    peer.send(Message::Addr(sample)).await?;
                }
                Message::Addr(addrs) => {
                    let mut book = self.address_book.lock().await;
                    for meta in addrs {
                        let _ = book.upsert(meta);
                    }
                }
                Message::Headers(counted_headers) => {
                    let caught_up = counted_headers.len() < 2000;
                    let headers: Vec<block::Header> =
                        counted_headers.into_iter().map(|counted| counted.header).collect();
                    self.ingest_headers(headers).await;
                    lease.release(addr);
                    self.request_next_step(&mut peer, &mut lease, peer_best_block, caught_up).await?;
                }
                Message::Inv(items) => {
                    let mut wanted = Vec::new();
                    for item in items {
                        if let InventoryHash::Tx(hash) = item {
                            if inventory.will_request_tx(&hash) == RequestDecision::Go {
                                inventory.mark_requested(hash);
                                wanted.push(InventoryHash::Tx(hash));
                            }
                        }
                    }
                    if !wanted.is_empty() {
                        peer.send(Message::GetData(wanted)).await?;
                    }
                }
                Message::Tx(tx) => {
                    let hash = tx.hash();
                    inventory.mark_delivered(&hash);
                    self.ingest_transaction((*tx).clone()).await;
                }
                Message::Block(block) => {
                    self.ingest_block(&block).await;
                }
                Message::GetBlocks(_) | Message::GetHeaders(_) | Message::GetData(_) => {
                    // This node serves no blocks or transactions (§4.K).
                }
                Message::NotFound(_) => {}
                Message::Version(_) | Message::Verack => {
                    warn!(%addr, "unexpected repeated handshake message");
                    return Err(PeerError::HandshakeViolation(Command::Version));
                }
            }

            inventory.sweep_timeouts();
        }
    }

    async fn version_for(&self, addr: SocketAddr) -> Version {
        let our_addr: SocketAddr = "0.0.0.0:0".parse().expect("valid socket address literal");
        let tip_height = self.chain.lock().await.tip_height();
        Version::new(
            constants::CURRENT_VERSION,
            addr,
            PeerServices::NODE_NETWORK,
            PeerServices::empty(),
            our_addr,
            peer::random_nonce(),
            constants::USER_AGENT.to_string(),
            tip_height,
            true,
        )
    }

    /// Decides and sends the next sync message for a peer, given whether
    /// the most recent `headers` reply (or the initial handshake) caught up
    /// with that peer's advertised best block.
    async fn request_next_step(
        &self,
        peer: &mut Peer,
        lease: &mut sync::SyncLease,
        peer_best_block: block::Height,
        headers_caught_up: bool,
    ) -> Result<(), PeerError> {
        let (tip_height, locator) = {
            let chain = self.chain.lock().await;
            (chain.tip_height(), chain.locator())
        };

        match sync::next_action(tip_height, peer_best_block, locator, headers_caught_up) {
            SyncAction::RequestHeaders(locator) => {
                if lease.may_acquire(peer.info.addr) {
                    lease.acquire(peer.info.addr);
                    peer.send(Message::GetHeaders(GetHeaders::new(locator, None))).await?;
                }
            }
            SyncAction::RequestBlocks(locator) => {
                peer.send(Message::GetBlocks(GetBlocks::new(locator, None))).await?;
            }
            SyncAction::Idle => {}
        }
        Ok(())
    }

    async fn ingest_headers(&self, headers: Vec<block::Header>) {
        let now = chrono::Utc::now();

        let events = {
            let mut chain = self.chain.lock().await;
            match chain.connect_headers(headers, now, self.creation_time) {
                Ok(events) => events,
                Err(error) => {
                    warn!(%error, "rejected header batch");
                    return;
                }
            }
        };

        for event in events {
            match event {
                spv_state::ChainEvent::BlockAdded { header, height } => {
                    let hash = block::Hash::from(&header);
                    if let Err(error) = self.txdb.on_block_added(hash, height) {
                        warn!(%error, "transaction database failed to process a new block");
                    }
                }
                spv_state::ChainEvent::BlockRemoved { header, .. } => {
                    let hash = block::Hash::from(&header);
                    if let Err(error) = self.txdb.on_block_removed(hash) {
                        warn!(%error, "transaction database failed to process a removed block");
                    }
                }
            }
        }
    }

    async fn ingest_transaction(&self, tx: spv_chain::transaction::Transaction) {
        let mut wallet = self.wallet.lock().await;
        match wallet.dispatch_tx(&tx) {
            Ok(to_save) => {
                for saved in to_save {
                    if let Err(error) = self.txdb.save_tx(saved) {
                        warn!(%error, "failed to persist a monitor-requested transaction");
                    }
                }
            }
            Err(error) => warn!(%error, "wallet failed to process a transaction"),
        }
    }

    async fn ingest_block(&self, block: &spv_chain::block::Block) {
        for tx in &block.transactions {
            self.ingest_transaction((**tx).clone()).await;
        }
        let mut wallet = self.wallet.lock().await;
        if let Err(error) = wallet.dispatch_block(block) {
            warn!(%error, "wallet failed to process a block");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config as RuntimeConfig;

    fn test_config(dir: &tempdir::TempDir) -> NodeConfig {
        NodeConfig {
            runtime: RuntimeConfig::default(),
            state: spv_state::Config::with_cache_dir(dir.path(), Network::Mainnet),
            network: Network::Mainnet,
            resync: false,
        }
    }

    #[tokio::test]
    async fn freshly_opened_node_starts_at_genesis_with_no_peers() {
        spv_test::init();
        let dir = tempdir::TempDir::new("spv-node").unwrap();
        let config = test_config(&dir);

        let node = Node::open(&config).unwrap();
        assert_eq!(node.chain.lock().await.tip_height(), block::Height::MIN);
        assert_eq!(node.peer_goal, 8);
    }

    #[tokio::test]
    async fn version_for_reports_the_real_tip_height() {
        spv_test::init();
        let dir = tempdir::TempDir::new("spv-node").unwrap();
        let config = test_config(&dir);
        let node = Node::open(&config).unwrap();

        let addr: SocketAddr = "127.0.0.1:8333".parse().unwrap();
        let version = node.version_for(addr).await;
        assert_eq!(version.best_block, block::Height::MIN);
        assert_eq!(version.user_agent, constants::USER_AGENT);
    }

    #[tokio::test]
    async fn reopening_a_node_preserves_its_wallet_creation_time() {
        spv_test::init();
        let dir = tempdir::TempDir::new("spv-node").unwrap();
        let config = test_config(&dir);

        let first = Node::open(&config).unwrap();
        let creation_time = first.creation_time;
        drop(first);

        let second = Node::open(&config).unwrap();
        assert_eq!(second.creation_time.timestamp(), creation_time.timestamp());
    }
}
