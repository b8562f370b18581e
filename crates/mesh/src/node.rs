//! A single node: identity, discovery, peer table, messenger.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use meshlink_core::{NodeIdentity, PeerId};

use crate::discovery::{Discovery, DiscoveryConfig};
use crate::error::{MeshError, Result};
use crate::messenger::{Messenger, Payload, RequestContext};
use crate::peers::{PeerDescriptor, PeerTable};

/// One node on the broadcast domain.
///
/// Owns every piece of per-node state explicitly; any number of nodes
/// can live in one process. Construction is cheap; nothing touches the
/// network until [`Node::start`].
pub struct Node {
    identity: NodeIdentity,
    table: PeerTable,
    messenger: Messenger,
    discovery_config: DiscoveryConfig,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    started: bool,
}

impl Node {
    pub fn new(identity: NodeIdentity) -> Self {
        Self::with_discovery_config(identity, DiscoveryConfig::default())
    }

    pub(crate) fn with_discovery_config(
        identity: NodeIdentity,
        discovery_config: DiscoveryConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let messenger = Messenger::new(identity.clone());
        Self {
            identity,
            table: PeerTable::new(),
            messenger,
            discovery_config,
            shutdown_tx,
            tasks: Vec::new(),
            started: false,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Start announcing, listening, and serving.
    ///
    /// Any socket that cannot be bound aborts the whole start; the node
    /// never runs half-initialized.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(MeshError::AlreadyStarted);
        }

        // Fresh signal per start so a node can be started again after a
        // clean shutdown.
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = shutdown_tx;

        let discovery = Discovery::with_config(
            self.identity.clone(),
            self.table.clone(),
            self.discovery_config.clone(),
        );
        let mut tasks = discovery.start(shutdown_rx.clone()).await?;
        tasks.push(self.messenger.serve(shutdown_rx).await?);

        self.tasks = tasks;
        self.started = true;
        info!("node {} started", self.identity);
        Ok(())
    }

    /// Register a request handler; see [`Messenger::register`].
    pub async fn register<F>(&self, path: &str, handler: F)
    where
        F: Fn(Payload, RequestContext) -> Payload + Send + Sync + 'static,
    {
        self.messenger.register(path, handler).await;
    }

    /// Every peer discovered so far.
    pub async fn peers(&self) -> Vec<PeerDescriptor> {
        self.table.snapshot().await
    }

    pub async fn peer(&self, id: &PeerId) -> Option<PeerDescriptor> {
        self.table.get(id).await
    }

    /// Send a request to a discovered peer; see [`Messenger::send`].
    pub async fn send(
        &self,
        peer: &PeerDescriptor,
        path: &str,
        payload: Payload,
    ) -> Result<Payload> {
        self.messenger.send(peer, path, payload).await
    }

    /// Signal every loop to stop and wait for the sockets to be
    /// released.
    pub async fn shutdown(&mut self) {
        if !self.started {
            return;
        }
        // A send error means every task already exited on its own.
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("task ended abnormally: {}", e);
            }
        }
        self.started = false;
        info!("node {} stopped", self.identity);
    }
}
