//! Peer transport and identity seams for the peer-to-peer path.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tether_protocol::ChangeMessage;

/// Transport that carries change messages between peer devices.
///
/// Delivery is fire-and-forget: a successful return means the message was
/// handed to the transport, not that any peer applied it.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Broadcasts a change to every device in the organization.
    async fn broadcast_to_org(&self, org_id: &str, message: &ChangeMessage) -> SyncResult<()>;

    /// Sends a change to one specific peer.
    async fn send_to_peer(&self, peer_did: &str, message: &ChangeMessage) -> SyncResult<()>;
}

/// Source of this device's decentralized identifier.
pub trait IdentityProvider: Send + Sync {
    /// The DID used to author changes and stamp vector clocks.
    fn default_did(&self) -> SyncResult<String>;
}

/// An identity provider with a fixed DID.
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    did: String,
}

impl StaticIdentity {
    /// Creates a provider that always returns `did`.
    pub fn new(did: impl Into<String>) -> Self {
        Self { did: did.into() }
    }
}

impl IdentityProvider for StaticIdentity {
    fn default_did(&self) -> SyncResult<String> {
        Ok(self.did.clone())
    }
}

/// An in-memory peer transport for tests.
///
/// Records every broadcast; failures are scripted as a queue consumed one
/// send at a time.
#[derive(Default)]
pub struct MockPeerTransport {
    broadcasts: Mutex<Vec<(String, ChangeMessage)>>,
    direct: Mutex<Vec<(String, ChangeMessage)>>,
    failures: Mutex<VecDeque<SyncError>>,
}

impl MockPeerTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next send to fail with `error`.
    pub fn fail_next(&self, error: SyncError) {
        self.failures.lock().push_back(error);
    }

    /// All successful broadcasts so far, as `(org_id, message)` pairs.
    pub fn broadcasts(&self) -> Vec<(String, ChangeMessage)> {
        self.broadcasts.lock().clone()
    }

    /// All successful direct sends so far, as `(peer_did, message)` pairs.
    pub fn direct_sends(&self) -> Vec<(String, ChangeMessage)> {
        self.direct.lock().clone()
    }

    fn take_failure(&self) -> Option<SyncError> {
        self.failures.lock().pop_front()
    }
}

#[async_trait]
impl PeerTransport for MockPeerTransport {
    async fn broadcast_to_org(&self, org_id: &str, message: &ChangeMessage) -> SyncResult<()> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.broadcasts
            .lock()
            .push((org_id.to_string(), message.clone()));
        Ok(())
    }

    async fn send_to_peer(&self, peer_did: &str, message: &ChangeMessage) -> SyncResult<()> {
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.direct
            .lock()
            .push((peer_did.to_string(), message.clone()));
        Ok(())
    }
}
