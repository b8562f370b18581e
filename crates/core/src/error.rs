use thiserror::Error;

/// Errors that can occur while establishing a node's network identity.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No non-loopback IPv4 address could be determined for this host
    #[error("no usable local address found")]
    NoAddressFound,

    /// Port 0 is not a valid node port
    #[error("invalid port: 0")]
    InvalidPort,

    /// A peer id string did not parse as `<ip>:<port>`
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),
}

/// Convenience Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
