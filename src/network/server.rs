use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::network::Peer;
use crate::node::Node;
use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const TCP_TIMEOUT: u64 = 5000;
const SESSION_READ_TIMEOUT: u64 = 10_000;
/// Requests longer than this are cut off and answered as they are
const MAX_REQUEST_LINES: usize = 100;

const STATUS_PATH: &str = "GET /status";
const CHAIN_PATH: &str = "GET /chain";

/// What a peer asked for in its first request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    Chain,
    Unknown(String),
}

impl Request {
    pub fn parse(first_line: &str) -> Request {
        if first_line.starts_with(STATUS_PATH) {
            Request::Status
        } else if first_line.starts_with(CHAIN_PATH) {
            Request::Chain
        } else {
            Request::Unknown(first_line.to_string())
        }
    }
}

/// Accepts inbound connections and runs one [`PeerSession`] thread per connection
pub struct Server {
    listener: TcpListener,
    node: Arc<Node>,
    shutdown: Arc<AtomicBool>,
}

/// Stops a running [`Server`] from another thread
#[derive(Clone)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // accept() only returns on a connection, so make one
        let mut wake_addr = self.addr;
        if wake_addr.ip().is_unspecified() {
            wake_addr.set_ip([127, 0, 0, 1].into());
        }
        if let Err(e) = TcpStream::connect_timeout(&wake_addr, Duration::from_millis(TCP_TIMEOUT))
        {
            debug!("Wake-up connection to {wake_addr} failed: {e}");
        }
    }
}

impl Server {
    pub fn bind<A: ToSocketAddrs + std::fmt::Debug>(addr: A, node: Arc<Node>) -> Result<Server> {
        let listener = TcpListener::bind(&addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr:?}: {e}")))?;
        Ok(Server {
            listener,
            node,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> Result<ServerHandle> {
        Ok(ServerHandle {
            addr: self.local_addr()?,
            shutdown: Arc::clone(&self.shutdown),
        })
    }

    /// Accept connections until the handle asks us to stop
    pub fn serve(&self) -> Result<()> {
        info!("Server listening on {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match stream {
                Ok(stream) => {
                    let peer_addr = match stream.peer_addr() {
                        Ok(addr) => addr,
                        Err(e) => {
                            error!("Failed to get peer address: {e}");
                            continue;
                        }
                    };
                    info!("New connection accepted from {peer_addr}");

                    let session = PeerSession::new(stream, peer_addr, Arc::clone(&self.node));
                    thread::spawn(move || {
                        if let Err(e) = session.run() {
                            error!("Error handling connection from {peer_addr}: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// One inbound conversation: register the peer, answer one request, close.
pub struct PeerSession {
    stream: TcpStream,
    peer_addr: SocketAddr,
    node: Arc<Node>,
}

impl PeerSession {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, node: Arc<Node>) -> PeerSession {
        PeerSession {
            stream,
            peer_addr,
            node,
        }
    }

    pub fn run(self) -> Result<()> {
        let result = self.converse();
        let _ = self.stream.shutdown(Shutdown::Both);
        result
    }

    fn converse(&self) -> Result<()> {
        // Keyed by the remote ephemeral port: each connection counts as a peer
        self.node.register_peer(Peer::from(self.peer_addr))?;

        self.stream
            .set_read_timeout(Some(Duration::from_millis(SESSION_READ_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;
        self.stream
            .set_write_timeout(Some(Duration::from_millis(TCP_TIMEOUT)))
            .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;

        let lines = self.read_request()?;
        let Some(first_line) = lines.first() else {
            warn!("Empty request from {}, closing", self.peer_addr);
            return Ok(());
        };
        debug!("Received request from {}: {lines:?}", self.peer_addr);

        let response = match Request::parse(first_line) {
            Request::Status => http_response("200 OK", "text/plain", &self.node.status_report()?),
            Request::Chain => {
                http_response("200 OK", "application/json", &self.node.chain_json()?)
            }
            Request::Unknown(line) => {
                info!("Unknown request from {}: {line}", self.peer_addr);
                http_response("404 Not Found", "text/plain", "404 Not Found\n")
            }
        };

        let mut writer = &self.stream;
        writer
            .write_all(response.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| {
                BlockchainError::Network(format!("Failed to respond to {}: {e}", self.peer_addr))
            })
    }

    /// Lines up to the first blank line or end of stream
    fn read_request(&self) -> Result<Vec<String>> {
        let mut reader = BufReader::new(&self.stream);
        let mut lines = Vec::new();
        while lines.len() < MAX_REQUEST_LINES {
            let mut line = String::new();
            let read = reader.read_line(&mut line).map_err(|e| {
                BlockchainError::Network(format!("Failed to read from {}: {e}", self.peer_addr))
            })?;
            let line = line.trim_end_matches(&['\r', '\n'][..]);
            if read == 0 || line.is_empty() {
                break;
            }
            lines.push(line.to_string());
        }
        Ok(lines)
    }
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Send a single request to a peer and return (status line, body)
fn send_request(peer: &Peer, request_line: &str) -> Result<(String, String)> {
    let addr = peer.parse_socket_addr()?;
    let mut stream = TcpStream::connect_timeout(&addr, Duration::from_millis(TCP_TIMEOUT))
        .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
    stream
        .set_read_timeout(Some(Duration::from_millis(SESSION_READ_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set read timeout: {e}")))?;
    stream
        .set_write_timeout(Some(Duration::from_millis(TCP_TIMEOUT)))
        .map_err(|e| BlockchainError::Network(format!("Failed to set write timeout: {e}")))?;

    write!(stream, "{request_line} HTTP/1.1\r\nHost: {peer}\r\n\r\n")
        .map_err(|e| BlockchainError::Network(format!("Failed to send request to {addr}: {e}")))?;

    let mut raw = String::new();
    stream
        .read_to_string(&mut raw)
        .map_err(|e| BlockchainError::Network(format!("Failed to read response from {addr}: {e}")))?;

    let (head, body) = raw.split_once("\r\n\r\n").ok_or_else(|| {
        BlockchainError::Network(format!("Malformed response from {addr}"))
    })?;
    let status = head.lines().next().unwrap_or_default().to_string();
    Ok((status, body.to_string()))
}

fn expect_ok(peer: &Peer, status: &str) -> Result<()> {
    if status.split_whitespace().nth(1) == Some("200") {
        Ok(())
    } else {
        Err(BlockchainError::Network(format!(
            "Peer {peer} answered with {status}"
        )))
    }
}

/// Ask a peer for its status page
pub fn query_status(peer: &Peer) -> Result<String> {
    let (status, body) = send_request(peer, STATUS_PATH)?;
    expect_ok(peer, &status)?;
    Ok(body)
}

/// Download a peer's full chain
pub fn fetch_chain(peer: &Peer) -> Result<Vec<Block>> {
    let (status, body) = send_request(peer, CHAIN_PATH)?;
    expect_ok(peer, &status)?;
    Ok(serde_json::from_str(&body)?)
}
