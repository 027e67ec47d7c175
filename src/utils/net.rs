use crate::error::{BlockchainError, Result};
use log::warn;
use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};

/// Best guess at the site-local IPv4 address other nodes can reach us on.
///
/// Connecting a UDP socket sends nothing; it only asks the OS which interface
/// it would route through. Falls back to loopback when there is no route.
pub fn local_ipv4() -> IpAddr {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| socket.connect((Ipv4Addr::new(10, 254, 254, 254), 1)).map(|_| socket))
        .and_then(|socket| socket.local_addr());

    match probe {
        Ok(addr) if !addr.ip().is_unspecified() && !addr.ip().is_loopback() => addr.ip(),
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            warn!("Could not detect local address, using loopback: {e}");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Ask the OS for a free TCP port
pub fn find_free_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))
        .map_err(|e| BlockchainError::Network(format!("Unable to find free port: {e}")))?;
    Ok(listener.local_addr()?.port())
}
