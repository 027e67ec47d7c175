//! Test utilities for node testing

use crate::config::Config;
use crate::core::Block;
use crate::error::Result;
use crate::node::{Node, NodeHandle};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Loopback config with its chain file under `dir`
pub fn test_config(dir: &Path, difficulty: usize) -> Config {
    Config::default()
        .with_node_address("127.0.0.1")
        .with_chain_file(dir.join("chain.txt"))
        .with_difficulty(difficulty)
        .with_discovery_timeout(Duration::from_millis(200))
}

/// A node with only its TCP server running
pub fn start_test_node(dir: &Path, difficulty: usize) -> Result<(Arc<Node>, NodeHandle)> {
    let node = Node::new(test_config(dir, difficulty))?;
    let handle = node.start_server()?;
    Ok((node, handle))
}

/// Write `request` as-is and read until the server closes the connection
pub fn send_raw_request(addr: SocketAddr, request: &str) -> Result<String> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    stream.write_all(request.as_bytes())?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    Ok(response)
}

/// A block mined at `difficulty` on top of `tail`
pub fn mine_on(tail: &Block, data: &str, difficulty: usize) -> Result<Block> {
    let mut block = Block::new(tail.get_hash().to_string(), data, None)?;
    block.mine(difficulty)?;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use tempfile::tempdir;

    fn loopback(handle: &NodeHandle) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, handle.local_addr().port()))
    }

    #[test]
    fn test_status_over_raw_socket() {
        let dir = tempdir().unwrap();
        let (node, handle) = start_test_node(dir.path(), 1).unwrap();

        let response =
            send_raw_request(loopback(&handle), "GET /status HTTP/1.1\r\n\r\n").unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: text/plain"));
        assert!(response.contains("Connected Peers: 1\n"));
        assert!(response.contains("Blockchain Data\n"));

        handle.shutdown();
        assert_eq!(node.peer_count().unwrap(), 1);
    }

    #[test]
    fn test_unknown_request_gets_404() {
        let dir = tempdir().unwrap();
        let (_node, handle) = start_test_node(dir.path(), 1).unwrap();

        let response =
            send_raw_request(loopback(&handle), "GET /nothing HTTP/1.1\r\n\r\n").unwrap();
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(response.ends_with("404 Not Found\n"));

        handle.shutdown();
    }

    #[test]
    fn test_empty_request_closes_without_response() {
        let dir = tempdir().unwrap();
        let (node, handle) = start_test_node(dir.path(), 1).unwrap();

        let response = send_raw_request(loopback(&handle), "\r\n").unwrap();
        assert!(response.is_empty());
        // The peer is still registered
        assert_eq!(node.peer_count().unwrap(), 1);

        handle.shutdown();
    }

    #[test]
    fn test_mine_on_links_to_tail() {
        let dir = tempdir().unwrap();
        let node = Node::new(test_config(dir.path(), 1)).unwrap();
        let tail = node.chain_snapshot().unwrap().pop().unwrap();

        let block = mine_on(&tail, "next", 1).unwrap();
        assert!(node.submit_block(block).unwrap());
    }
}
