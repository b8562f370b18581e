//! Local address resolution and port selection.

use rand::Rng;
use std::net::{IpAddr, UdpSocket};

use crate::error::{CoreError, Result};

/// Determine this host's non-loopback IPv4 address.
///
/// Binds an unconnected UDP socket and "connects" it to a public
/// address, then reads back the local address the OS picked for that
/// route. No packet is ever sent; UDP connect only sets the default
/// destination. Hosts with no usable interface get
/// [`CoreError::NoAddressFound`].
pub fn resolve_local_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(|_| CoreError::NoAddressFound)?;
    socket
        .connect("8.8.8.8:80")
        .map_err(|_| CoreError::NoAddressFound)?;
    let addr = socket
        .local_addr()
        .map_err(|_| CoreError::NoAddressFound)?
        .ip();
    if addr.is_loopback() || addr.is_unspecified() {
        return Err(CoreError::NoAddressFound);
    }
    Ok(addr)
}

/// Pick a pseudo-random port in [1024, 65535).
///
/// The port is not probed for availability; a later bind may still fail
/// with address-in-use, which callers surface so the application can
/// draw a new port and retry.
pub fn ephemeral_port() -> u16 {
    rand::thread_rng().gen_range(1024..65535)
}
