use crate::error::{BlockchainError, Result};
use crate::network::Peer;
use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub const DISCOVERY_REQUEST_TAG: &str = "DISCOVER_NODE_REQUEST";
pub const DISCOVERY_RESPONSE_TAG: &str = "DISCOVER_NODE_RESPONSE";

const DATAGRAM_BUFFER_SIZE: usize = 1024;
/// How often the responder wakes up to look at its shutdown flag
const RESPONDER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Multicast peer discovery on the local network.
///
/// `discover` runs one announce-and-listen cycle. `respond` answers other
/// nodes' announcements until told to stop. Both are best-effort: socket
/// errors are logged and end the cycle, they never reach the node.
#[derive(Debug, Clone)]
pub struct DiscoveryService {
    group: Ipv4Addr,
    port: u16,
    timeout: Duration,
    local: Peer,
}

/// A decoded `<tag>:<address>:<port>` datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub tag: String,
    pub peer: Peer,
}

/// Decode `<tag>:<address>:<port>`. Anything else is not an announcement.
pub fn parse_announcement(message: &str) -> Option<Announcement> {
    let parts: Vec<&str> = message.trim().split(':').collect();
    if parts.len() != 3 || parts[0].is_empty() || parts[1].is_empty() {
        return None;
    }
    let port = parts[2].parse::<u16>().ok()?;
    Some(Announcement {
        tag: parts[0].to_string(),
        peer: Peer::new(parts[1], port),
    })
}

impl DiscoveryService {
    pub fn new(group: Ipv4Addr, port: u16, timeout: Duration, local: Peer) -> DiscoveryService {
        DiscoveryService {
            group,
            port,
            timeout,
            local,
        }
    }

    fn request_message(&self) -> String {
        format!(
            "{DISCOVERY_REQUEST_TAG}:{}:{}",
            self.local.get_address(),
            self.local.get_port()
        )
    }

    fn response_message(&self) -> String {
        format!(
            "{DISCOVERY_RESPONSE_TAG}:{}:{}",
            self.local.get_address(),
            self.local.get_port()
        )
    }

    /// Announce ourselves to the group and collect answers until the listen
    /// window passes without a datagram. `on_peer` is called once per answer.
    pub fn discover<F: FnMut(&Peer)>(&self, mut on_peer: F) -> Vec<Peer> {
        let mut found = Vec::new();
        if let Err(e) = self.run_discovery(&mut found, &mut on_peer) {
            error!("Error during peer discovery: {e}");
        }
        info!("Discovery cycle finished with {} peer(s)", found.len());
        found
    }

    fn run_discovery<F: FnMut(&Peer)>(&self, found: &mut Vec<Peer>, on_peer: &mut F) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| BlockchainError::Network(format!("Failed to bind discovery socket: {e}")))?;
        socket
            .join_multicast_v4(&self.group, &Ipv4Addr::UNSPECIFIED)
            .map_err(|e| BlockchainError::Network(format!("Failed to join {}: {e}", self.group)))?;

        let message = self.request_message();
        socket
            .send_to(message.as_bytes(), (self.group, self.port))
            .map_err(|e| BlockchainError::Network(format!("Failed to send announcement: {e}")))?;
        info!(
            "Sent {message} to {}:{}, listening for peer responses",
            self.group, self.port
        );

        socket.set_read_timeout(Some(self.timeout))?;
        let result = self.collect_responses(&socket, found, on_peer);

        if let Err(e) = socket.leave_multicast_v4(&self.group, &Ipv4Addr::UNSPECIFIED) {
            debug!("Failed to leave {}: {e}", self.group);
        }
        result
    }

    fn collect_responses<F: FnMut(&Peer)>(
        &self,
        socket: &UdpSocket,
        found: &mut Vec<Peer>,
        on_peer: &mut F,
    ) -> Result<()> {
        let mut buffer = [0u8; DATAGRAM_BUFFER_SIZE];
        loop {
            let (len, src) = match socket.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(())
                }
                Err(e) => {
                    return Err(BlockchainError::Network(format!(
                        "Failed to receive discovery response: {e}"
                    )))
                }
            };

            let message = String::from_utf8_lossy(&buffer[..len]);
            info!("Received response from {src}: {message}");
            match parse_announcement(&message) {
                Some(announcement) if announcement.peer == self.local => {}
                Some(announcement) => {
                    if !found.contains(&announcement.peer) {
                        on_peer(&announcement.peer);
                        found.push(announcement.peer);
                    }
                }
                None => warn!("Ignoring malformed discovery datagram from {src}"),
            }
        }
    }

    /// Answer announcements from other nodes until `shutdown` is raised.
    ///
    /// Binds the well-known discovery port, so only one responder per host
    /// can run; a bind failure is returned and the caller logs it.
    pub fn respond<F: FnMut(&Peer)>(&self, shutdown: &AtomicBool, on_announce: F) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port)).map_err(|e| {
            BlockchainError::Network(format!(
                "Failed to bind discovery port {}: {e}",
                self.port
            ))
        })?;
        if let Err(e) = socket.join_multicast_v4(&self.group, &Ipv4Addr::UNSPECIFIED) {
            warn!(
                "Failed to join {} ({e}), only unicast announcements will be answered",
                self.group
            );
        }
        info!("Discovery responder listening on port {}", self.port);
        self.serve_announcements(&socket, shutdown, on_announce)
    }

    fn serve_announcements<F: FnMut(&Peer)>(
        &self,
        socket: &UdpSocket,
        shutdown: &AtomicBool,
        mut on_announce: F,
    ) -> Result<()> {
        socket.set_read_timeout(Some(RESPONDER_POLL_INTERVAL))?;
        let response = self.response_message();
        let mut buffer = [0u8; DATAGRAM_BUFFER_SIZE];

        while !shutdown.load(Ordering::SeqCst) {
            let (len, src) = match socket.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => {
                    error!("Discovery responder receive failed: {e}");
                    thread::sleep(RESPONDER_POLL_INTERVAL);
                    continue;
                }
            };

            let message = String::from_utf8_lossy(&buffer[..len]);
            let Some(announcement) = parse_announcement(&message) else {
                warn!("Ignoring malformed discovery datagram from {src}");
                continue;
            };
            if announcement.tag != DISCOVERY_REQUEST_TAG || announcement.peer == self.local {
                continue;
            }

            debug!("Answering discovery request from {src}");
            if let Err(e) = socket.send_to(response.as_bytes(), src) {
                error!("Failed to answer discovery request from {src}: {e}");
            }
            on_announce(&announcement.peer);
        }

        info!("Discovery responder stopped");
        Ok(())
    }
}
