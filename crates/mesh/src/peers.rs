//! The shared table of peers discovered on the broadcast domain.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use meshlink_core::id::parse_host_port;
use meshlink_core::{CoreError, NodeIdentity, PeerId};

/// A remote node known through the discovery protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDescriptor {
    pub id: PeerId,
    pub addr: IpAddr,
    pub port: u16,
}

impl PeerDescriptor {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self {
            id: PeerId::new(addr, port),
            addr,
            port,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl FromStr for PeerDescriptor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, port) = parse_host_port(s)?;
        Ok(Self::new(addr, port))
    }
}

impl From<&NodeIdentity> for PeerDescriptor {
    fn from(identity: &NodeIdentity) -> Self {
        Self::new(identity.addr(), identity.port())
    }
}

/// Concurrent-safe map from peer id to descriptor.
///
/// Written only by the discovery listener, read from anywhere. Cloning
/// the table clones the handle; all clones share the same entries.
/// Entries are never removed: a peer that goes silent stays listed.
#[derive(Debug)]
pub struct PeerTable {
    peers: Arc<RwLock<HashMap<PeerId, PeerDescriptor>>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or overwrite the descriptor for a peer.
    ///
    /// Idempotent: re-announcing an identical descriptor changes
    /// nothing. A peer that came back on a new port overwrites its old
    /// entry in place. Returns true when the id was not known before,
    /// so callers can log only fresh discoveries.
    pub async fn upsert(&self, descriptor: PeerDescriptor) -> bool {
        let mut peers = self.peers.write().await;
        peers.insert(descriptor.id.clone(), descriptor).is_none()
    }

    pub async fn get(&self, id: &PeerId) -> Option<PeerDescriptor> {
        let peers = self.peers.read().await;
        peers.get(id).cloned()
    }

    /// Point-in-time copy of every known descriptor, in no particular
    /// order.
    pub async fn snapshot(&self) -> Vec<PeerDescriptor> {
        let peers = self.peers.read().await;
        peers.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PeerTable {
    fn clone(&self) -> Self {
        Self {
            peers: Arc::clone(&self.peers),
        }
    }
}
