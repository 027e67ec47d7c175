use crate::error::{BlockchainError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::RwLock;

/// A remote node, identified by address and port
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Peer {
    address: String,
    port: u16,
}

impl Peer {
    pub fn new(address: impl Into<String>, port: u16) -> Peer {
        Peer {
            address: address.into(),
            port,
        }
    }

    pub fn get_address(&self) -> &str {
        self.address.as_str()
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn parse_socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| BlockchainError::Network(format!("Invalid peer address {self}: {e}")))
    }
}

impl From<SocketAddr> for Peer {
    fn from(addr: SocketAddr) -> Self {
        Peer::new(addr.ip().to_string(), addr.port())
    }
}

impl FromStr for Peer {
    type Err = BlockchainError;

    /// Parses `address:port`
    fn from_str(s: &str) -> Result<Self> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| BlockchainError::Network(format!("Expected address:port, got {s}")))?;
        if address.is_empty() {
            return Err(BlockchainError::Network(format!("Missing address in {s}")));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| BlockchainError::Network(format!("Invalid port in {s}: {e}")))?;
        Ok(Peer::new(address, port))
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Known peers of a node. Registering the same (address, port) twice is a no-op.
///
/// Entries are never evicted. Inbound sessions register the remote socket
/// address, ephemeral port included, so every accepted connection adds one
/// entry and the set grows with the number of connections over the node's
/// lifetime.
pub struct PeerRegistry {
    inner: RwLock<BTreeSet<Peer>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            inner: RwLock::new(BTreeSet::new()),
        }
    }

    /// Returns true when the peer was not known before
    pub fn add_peer(&self, peer: Peer) -> Result<bool> {
        let mut inner = self.inner.write()?;
        Ok(inner.insert(peer))
    }

    pub fn get_peers(&self) -> Result<Vec<Peer>> {
        Ok(self.inner.read()?.iter().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.inner.read()?.is_empty())
    }
}
