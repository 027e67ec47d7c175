//! Ledger integration tests
//!
//! Runs real nodes on loopback with temporary chain files and checks the
//! behaviour peers rely on: linkage, persistence, sync and the status page.

use meshledger::{
    fetch_chain, query_status, Block, BlockchainError, Chain, ChainStore, Config, Node, NodeHandle,
    Peer,
};
use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn config(dir: &Path, difficulty: usize) -> Config {
    Config::default()
        .with_node_address("127.0.0.1")
        .with_chain_file(dir.join("chain.txt"))
        .with_difficulty(difficulty)
        .with_discovery_timeout(Duration::from_millis(200))
}

fn start(config: Config) -> (Arc<Node>, NodeHandle, Peer) {
    let node = Node::new(config).unwrap();
    let handle = node.start_server().unwrap();
    let peer = Peer::new("127.0.0.1", handle.local_addr().port());
    (node, handle, peer)
}

fn raw_request(peer: &Peer, request: &str) -> String {
    let mut stream = TcpStream::connect(peer.parse_socket_addr().unwrap()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn test_new_node_persists_genesis() {
    let dir = tempdir().unwrap();
    let node = Node::new(config(dir.path(), 2)).unwrap();

    let blocks = node.chain_snapshot().unwrap();
    assert_eq!(blocks.len(), 1);
    assert!(blocks[0].is_genesis());
    assert!(blocks[0].get_hash().starts_with("00"));

    let contents = fs::read_to_string(dir.path().join("chain.txt")).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.contains(";Genesis Block;"));
}

#[test]
fn test_blocks_only_extend_their_own_tail() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let a = Node::new(config(dir_a.path(), 1)).unwrap();
    let b = Node::new(config(dir_b.path(), 1)).unwrap();

    // Independent genesis blocks, so A's block does not link onto B
    let block = a.mine("from a", None, None).unwrap();
    assert!(!b.submit_block(block.clone()).unwrap());
    assert_eq!(b.chain_len().unwrap(), 1);

    // Once B shares A's history the same block is accepted
    assert!(b.adopt_chain(a.chain_snapshot().unwrap()).unwrap());
    let next = a.mine("again", None, None).unwrap();
    assert!(b.submit_block(next).unwrap());
    assert_eq!(b.chain_snapshot().unwrap(), a.chain_snapshot().unwrap());
}

#[test]
fn test_block_mined_on_shared_genesis_is_accepted() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let a = Node::new(config(dir_a.path(), 1)).unwrap();

    // B starts from A's genesis record and nothing else
    let genesis = a.chain_snapshot().unwrap()[0].clone();
    ChainStore::new(dir_b.path().join("chain.txt"))
        .append(&genesis)
        .unwrap();
    let b = Node::new(config(dir_b.path(), 1)).unwrap();
    assert_eq!(b.chain_snapshot().unwrap(), vec![genesis]);

    let x = a.mine("shared", None, None).unwrap();
    assert!(b.submit_block(x.clone()).unwrap());
    assert_eq!(b.chain_len().unwrap(), 2);
    assert_eq!(b.chain_snapshot().unwrap().last(), Some(&x));
    assert!(b.validate_chain().unwrap());
}

#[test]
fn test_tampered_chain_file_is_detected_on_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chain.txt");
    {
        let mut chain = Chain::bootstrap(ChainStore::new(&path), 1).unwrap();
        for i in 0..3 {
            chain.mine_and_append(&format!("entry {i}"), None, None).unwrap();
        }
    }

    let contents = fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    let original = Block::parse(&lines[2]).unwrap();
    let tampered = Block::from_parts(
        original.get_previous_hash().to_string(),
        "rewritten history".to_string(),
        original.get_timestamp(),
        original.get_nonce(),
        original.get_hash().to_string(),
        String::new(),
        String::new(),
        0,
    );
    lines[2] = tampered.serialize();
    fs::write(&path, lines.join("\n") + "\n").unwrap();

    let reloaded = ChainStore::new(&path).load().unwrap();
    assert_eq!(reloaded.len(), 4);
    assert_eq!(Chain::first_invalid_index(&reloaded), Some(2));

    let chain = Chain::bootstrap(ChainStore::new(&path), 1).unwrap();
    assert!(!chain.validate());
}

#[test]
fn test_status_counts_every_inbound_connection() {
    let dir = tempdir().unwrap();
    let (_node, handle, peer) = start(config(dir.path(), 1));

    for _ in 0..3 {
        let response = raw_request(&peer, "GET /favicon.ico HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 404 Not Found"));
    }

    let status = query_status(&peer).unwrap();
    assert!(status.contains("Node IP: 127.0.0.1\n"));
    assert!(status.contains(&format!("Node Port: {}\n", peer.get_port())));
    assert!(status.contains("Connected Peers: 4\n"));
    assert!(status.contains("Blockchain Data\n"));
    assert!(status.contains("Genesis Block"));

    handle.shutdown();
}

#[test]
fn test_connecting_adopts_longer_remote_chain() {
    let dir_a = tempdir().unwrap();
    let dir_b = tempdir().unwrap();
    let (a, handle, a_peer) = start(config(dir_a.path(), 1));
    a.mine("one", None, None).unwrap();
    a.mine("two", None, None).unwrap();

    let b = Node::new(config(dir_b.path(), 1)).unwrap();
    assert!(b.connect_to_peer(a_peer.clone()).unwrap());
    assert_eq!(b.chain_snapshot().unwrap(), a.chain_snapshot().unwrap());
    assert_eq!(b.peers().unwrap(), vec![a_peer.clone()]);

    // The adopted chain is what B now has on disk
    let on_disk = ChainStore::new(dir_b.path().join("chain.txt")).load().unwrap();
    assert_eq!(on_disk, a.chain_snapshot().unwrap());

    // A shorter chain is never adopted
    let a_blocks = fetch_chain(&a_peer).unwrap();
    assert!(!b.adopt_chain(a_blocks[..2].to_vec()).unwrap());
    assert_eq!(b.chain_len().unwrap(), 3);

    handle.shutdown();
}

#[test]
fn test_peer_connection_does_not_mine_by_default() {
    let dir = tempdir().unwrap();
    let (node, handle, peer) = start(config(dir.path(), 1));

    query_status(&peer).unwrap();
    handle.shutdown();

    assert!(node.wait_for_mining().is_none());
    assert_eq!(node.chain_len().unwrap(), 1);
}

#[test]
fn test_peer_connection_mines_when_enabled() {
    let dir = tempdir().unwrap();
    let (node, handle, peer) = start(config(dir.path(), 1).with_mine_on_peer_connect(true));

    query_status(&peer).unwrap();
    let block = node.wait_for_mining().unwrap().unwrap();
    handle.shutdown();

    assert_eq!(node.chain_len().unwrap(), 2);
    assert_eq!(node.chain_snapshot().unwrap()[1], block);
}

#[test]
fn test_stop_mining_cancels_search() {
    let dir = tempdir().unwrap();
    let config = config(dir.path(), 20);
    let mut genesis = Block::genesis().unwrap();
    genesis.mine(0).unwrap();
    ChainStore::new(config.get_chain_file())
        .append(&genesis)
        .unwrap();

    let node = Node::new(config).unwrap();
    assert!(node.start_mining("too hard", None).unwrap());
    node.stop_mining();

    let result = node.wait_for_mining().unwrap();
    assert!(matches!(result, Err(BlockchainError::Mining(_))));
    assert_eq!(node.chain_len().unwrap(), 1);
}
