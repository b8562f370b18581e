use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Identity of a node on the broadcast domain.
///
/// Derived once at startup from the node's reachable address and its
/// serving port, and immutable for the node's lifetime. The `id` is the
/// canonical `<ip>:<port>` rendering, unique on the subnet by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    addr: IpAddr,
    port: u16,
}

impl NodeIdentity {
    /// Port 0 is the OS wildcard and never a reachable serving port.
    pub fn new(addr: IpAddr, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(CoreError::InvalidPort);
        }
        Ok(Self { addr, port })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn id(&self) -> PeerId {
        PeerId::new(self.addr, self.port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Canonical `<ip>:<port>` id of a node, own or remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self(format!("{}:{}", addr, port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, port) = parse_host_port(s)?;
        Ok(Self::new(addr, port))
    }
}

/// Split an id string into its address and port.
///
/// The wire format is exactly `<ip>:<port>` with a single colon, so
/// IPv6 literals do not parse here. The port may be any integer that
/// fits a u16, including 0; nodes constructing their own identity are
/// held to the stricter rule in [`NodeIdentity::new`].
pub fn parse_host_port(s: &str) -> Result<(IpAddr, u16)> {
    let mut parts = s.split(':');
    let (host, port) = match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) => (host, port),
        _ => return Err(CoreError::InvalidPeerId(s.to_string())),
    };
    let addr: IpAddr = host
        .parse()
        .map_err(|_| CoreError::InvalidPeerId(s.to_string()))?;
    let port: u16 = port
        .parse()
        .map_err(|_| CoreError::InvalidPeerId(s.to_string()))?;
    Ok((addr, port))
}
