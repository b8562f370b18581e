use std::net::SocketAddr;
use thiserror::Error;

use meshlink_core::PeerId;

/// Errors that can occur in discovery and peer messaging.
///
/// Startup failures (binds) are fatal to the caller; everything raised
/// from a `send` is scoped to that one exchange and leaves the node's
/// loops running.
#[derive(Error, Debug)]
pub enum MeshError {
    /// A discovery or serving socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The peer was unreachable, refused the connection, or timed out
    #[error("connection to peer {peer} failed: {source}")]
    ConnectionFailed {
        peer: PeerId,
        #[source]
        source: reqwest::Error,
    },

    /// The peer answered with a non-success status
    #[error("peer {peer} answered with status {status}")]
    PeerStatus {
        peer: PeerId,
        status: reqwest::StatusCode,
    },

    /// The peer's response body did not decode into a payload object
    #[error("malformed response from peer {peer}")]
    MalformedResponse { peer: PeerId },

    /// The node was started more than once
    #[error("node already started")]
    AlreadyStarted,
}

/// Convenience Result type for mesh operations
pub type Result<T> = std::result::Result<T, MeshError>;
