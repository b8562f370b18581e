//! UDP broadcast peer discovery.
//!
//! Two long-lived tasks per node: the announcer broadcasts the node's
//! own id on a fixed cadence, the listener decodes everyone else's
//! announcements into the shared [`PeerTable`]. Both are best-effort;
//! a failed send or receive is logged and the loop carries on.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshlink_core::NodeIdentity;

use crate::error::{MeshError, Result};
use crate::peers::{PeerDescriptor, PeerTable};

/// Well-known UDP port announcements are exchanged on.
pub const DISCOVERY_PORT: u16 = 9876;

/// Cadence of self-announcements.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(2);

/// Where to listen and where to announce.
///
/// Protocol constants in production. Tests rewire this to loopback so
/// several nodes can coexist in one process; the public surface never
/// exposes it.
#[derive(Debug, Clone)]
pub(crate) struct DiscoveryConfig {
    pub listen_port: u16,
    pub announce_to: SocketAddr,
    pub interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            listen_port: DISCOVERY_PORT,
            announce_to: SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DISCOVERY_PORT),
            interval: ANNOUNCE_INTERVAL,
        }
    }
}

/// The discovery protocol instance for one node.
pub struct Discovery {
    identity: NodeIdentity,
    table: PeerTable,
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(identity: NodeIdentity, table: PeerTable) -> Self {
        Self::with_config(identity, table, DiscoveryConfig::default())
    }

    pub(crate) fn with_config(
        identity: NodeIdentity,
        table: PeerTable,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            identity,
            table,
            config,
        }
    }

    /// Bind both sockets and spawn the announcer and listener tasks.
    ///
    /// Bind failures are fatal startup errors; once running, the tasks
    /// only stop when `shutdown` flips to true, at which point their
    /// sockets are dropped.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> Result<Vec<JoinHandle<()>>> {
        let announce_bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
        let announce_socket =
            UdpSocket::bind(announce_bind)
                .await
                .map_err(|source| MeshError::Bind {
                    addr: announce_bind,
                    source,
                })?;
        announce_socket
            .set_broadcast(true)
            .map_err(|source| MeshError::Bind {
                addr: announce_bind,
                source,
            })?;

        let listen_addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, self.config.listen_port).into();
        let listen_socket = UdpSocket::bind(listen_addr)
            .await
            .map_err(|source| MeshError::Bind {
                addr: listen_addr,
                source,
            })?;

        let announcer = tokio::spawn(run_announcer(
            announce_socket,
            self.identity.id().to_string(),
            self.config.announce_to,
            self.config.interval,
            shutdown.clone(),
        ));
        let listener = tokio::spawn(run_listener(
            listen_socket,
            self.identity.clone(),
            self.table.clone(),
            shutdown,
        ));

        info!(
            "discovery running: announcing {} to {} every {:?}",
            self.identity,
            self.config.announce_to,
            self.config.interval
        );
        Ok(vec![announcer, listener])
    }
}

async fn run_announcer(
    socket: UdpSocket,
    id: String,
    target: SocketAddr,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            _ = ticker.tick() => {
                // Fire-and-forget; the next tick retries.
                if let Err(e) = socket.send_to(id.as_bytes(), target).await {
                    warn!("announce to {} failed: {}", target, e);
                }
            }
        }
    }
    debug!("announcer stopped");
}

async fn run_listener(
    socket: UdpSocket,
    identity: NodeIdentity,
    table: PeerTable,
    mut shutdown: watch::Receiver<bool>,
) {
    let own_id = identity.id();
    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    let Some(descriptor) = decode_announcement(&buf[..len]) else {
                        // Arbitrary subnet noise lands here; not an error.
                        debug!("discarding malformed announcement from {}", src);
                        continue;
                    };
                    if descriptor.id == own_id {
                        continue;
                    }
                    let id = descriptor.id.clone();
                    if table.upsert(descriptor).await {
                        info!("discovered peer {}", id);
                    }
                }
                Err(e) => warn!("announcement recv failed: {}", e),
            },
        }
    }
    debug!("listener stopped");
}

/// Decode one datagram into a peer descriptor.
///
/// Announcements are UTF-8 `<ip>:<port>` text; a trailing newline is
/// tolerated since line-oriented senders exist. Anything that does not
/// parse yields `None`.
fn decode_announcement(payload: &[u8]) -> Option<PeerDescriptor> {
    let text = std::str::from_utf8(payload).ok()?;
    text.trim_end().parse().ok()
}
