//! The blockchain sync state machine: acquiring a lease to drive header
//! download from one peer at a time, then falling back to `getblocks` once
//! headers have caught up but the peer's advertised tip is still ahead
//! (§4.K, §6).

use std::{net::SocketAddr, time::Instant};

use spv_chain::block;

use crate::constants;

/// The header-download lease: at most one peer drives header sync at a
/// time, so this node doesn't send `getheaders` to every peer at once and
/// then have to reconcile N racing replies.
pub struct SyncLease {
    holder: Option<LeaseState>,
}

struct LeaseState {
    peer: SocketAddr,
    requested_at: Instant,
}

impl SyncLease {
    pub fn new() -> SyncLease {
        SyncLease { holder: None }
    }

    /// Whether `peer` may send `getheaders` right now: either nobody holds
    /// the lease, or `peer` already does and the request hasn't timed out
    /// (so it can retry without waiting out a whole new acquisition round).
    pub fn may_acquire(&self, peer: SocketAddr) -> bool {
        match &self.holder {
            None => true,
            Some(state) => {
                state.peer == peer
                    || state.requested_at.elapsed() > constants::HEADERS_REQUEST_TIMEOUT
            }
        }
    }

    pub fn acquire(&mut self, peer: SocketAddr) {
        self.holder = Some(LeaseState { peer, requested_at: Instant::now() });
    }

    /// Release the lease, e.g. once a `headers` reply has been processed
    /// (whether or not it advanced the tip) or the peer disconnected.
    pub fn release(&mut self, peer: SocketAddr) {
        if let Some(state) = &self.holder {
            if state.peer == peer {
                self.holder = None;
            }
        }
    }

    pub fn holder(&self) -> Option<SocketAddr> {
        self.holder.as_ref().map(|s| s.peer)
    }
}

impl Default for SyncLease {
    fn default() -> Self {
        Self::new()
    }
}

/// What this node should do next for a given peer, once the grace period
/// after handshake has elapsed.
#[derive(Debug, Eq, PartialEq)]
pub enum SyncAction {
    /// Send `getheaders` with the given locator.
    RequestHeaders(Vec<block::Hash>),
    /// Headers are caught up to our best guess of the chain, but the
    /// peer's advertised tip is still ahead: send `getblocks` and wait for
    /// an `inv` of blocks.
    RequestBlocks(Vec<block::Hash>),
    /// Nothing to do: this peer is caught up, or isn't worth syncing from.
    Idle,
}

/// Decide the next sync action for a peer, given our current best chain tip
/// and the peer's advertised best block height (from its `version`
/// message).
///
/// `headers_caught_up` is true once a `headers` reply came back with fewer
/// than the maximum batch size, the conventional signal (inherited from
/// Bitcoin Core) that there's nothing more to request by header alone.
pub fn next_action(
    our_tip_height: block::Height,
    peer_best_block: block::Height,
    locator: Vec<block::Hash>,
    headers_caught_up: bool,
) -> SyncAction {
    if peer_best_block.0 <= our_tip_height.0 {
        return SyncAction::Idle;
    }
    if !headers_caught_up {
        return SyncAction::RequestHeaders(locator);
    }
    SyncAction::RequestBlocks(locator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, last)), 8333)
    }

    #[test]
    fn lease_blocks_second_peer_until_released() {
        let mut lease = SyncLease::new();
        let a = addr(1);
        let b = addr(2);

        assert!(lease.may_acquire(a));
        lease.acquire(a);
        assert!(!lease.may_acquire(b));

        lease.release(a);
        assert!(lease.may_acquire(b));
    }

    #[test]
    fn idle_when_peer_not_ahead() {
        let action = next_action(block::Height(100), block::Height(100), vec![], true);
        assert_eq!(action, SyncAction::Idle);
    }

    #[test]
    fn requests_headers_before_caught_up() {
        let locator = vec![block::Hash([0; 32])];
        let action = next_action(
            block::Height(100),
            block::Height(200),
            locator.clone(),
            false,
        );
        assert_eq!(action, SyncAction::RequestHeaders(locator));
    }

    #[test]
    fn requests_blocks_once_headers_caught_up_but_peer_still_ahead() {
        let locator = vec![block::Hash([0; 32])];
        let action = next_action(
            block::Height(100),
            block::Height(200),
            locator.clone(),
            true,
        );
        assert_eq!(action, SyncAction::RequestBlocks(locator));
    }
}
