//! The node: composition root for chain, peers, discovery and server
//!
//! A `Node` owns one chain behind a read/write lock and a peer registry. It is
//! shared as `Arc<Node>` between the accept loop, one thread per peer session,
//! the discovery threads and at most one mining job.

pub mod miner;

pub use miner::MiningJob;

use crate::config::Config;
use crate::core::{Block, CancelFlag, Chain, MediaInfo};
use crate::error::{BlockchainError, Result};
use crate::network::{fetch_chain, DiscoveryService, Peer, PeerRegistry, Server, ServerHandle};
use crate::storage::ChainStore;
use crate::utils::find_free_port;
use log::{error, info, warn};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

/// Payload of blocks mined because a peer connected
const PEER_CONNECT_BLOCK_DATA: &str = "Peer connection block";

pub struct Node {
    config: Config,
    local: Peer,
    chain: RwLock<Chain>,
    peers: PeerRegistry,
    miner: Mutex<Option<MiningJob>>,
}

/// Background threads of a started node
pub struct NodeHandle {
    node: Arc<Node>,
    server: ServerHandle,
    responder_shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.server.local_addr()
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Block until the server stops (for `startnode`)
    pub fn wait(self) {
        for thread in self.threads {
            let _ = thread.join();
        }
    }

    /// Stop the server, the discovery responder and any mining job
    pub fn shutdown(self) {
        info!("Shutting down node {}", self.node.local());
        self.server.shutdown();
        self.responder_shutdown.store(true, Ordering::SeqCst);
        self.node.stop_mining();
        self.wait();
    }
}

impl Node {
    /// Load (or create) the chain and prepare the node. Nothing is bound yet.
    pub fn new(config: Config) -> Result<Arc<Node>> {
        config.validate()?;
        let port = match config.get_port() {
            0 => find_free_port()?,
            port => port,
        };
        let config = config.with_port(port);

        let store = ChainStore::new(config.get_chain_file());
        let chain = Chain::bootstrap(store, config.get_difficulty())?;
        let local = Peer::new(config.get_node_address(), port);
        info!(
            "Node initialized at {local} with {} block(s), difficulty {}",
            chain.len(),
            config.get_difficulty()
        );

        Ok(Arc::new(Node {
            config,
            local,
            chain: RwLock::new(chain),
            peers: PeerRegistry::new(),
            miner: Mutex::new(None),
        }))
    }

    pub fn local(&self) -> &Peer {
        &self.local
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub fn discovery_service(&self) -> DiscoveryService {
        DiscoveryService::new(
            self.config.get_discovery_group(),
            self.config.get_discovery_port(),
            self.config.get_discovery_timeout(),
            self.local.clone(),
        )
    }

    /// Bind the server and run the accept loop on its own thread
    pub fn start_server(self: &Arc<Self>) -> Result<NodeHandle> {
        let server = Server::bind((Ipv4Addr::UNSPECIFIED, self.local.get_port()), Arc::clone(self))?;
        let handle = server.handle()?;
        let accept_loop = thread::spawn(move || {
            if let Err(e) = server.serve() {
                error!("Server error: {e}");
            }
        });

        Ok(NodeHandle {
            node: Arc::clone(self),
            server: handle,
            responder_shutdown: Arc::new(AtomicBool::new(false)),
            threads: vec![accept_loop],
        })
    }

    /// Start the server, the discovery responder and one discovery cycle
    pub fn start(self: &Arc<Self>) -> Result<NodeHandle> {
        let mut handle = self.start_server()?;

        let node = Arc::clone(self);
        let shutdown = Arc::clone(&handle.responder_shutdown);
        handle.threads.push(thread::spawn(move || {
            let discovery = node.discovery_service();
            let result = discovery.respond(&shutdown, |peer| {
                if let Err(e) = node.register_peer(peer.clone()) {
                    warn!("Failed to register announced peer {peer}: {e}");
                }
            });
            if let Err(e) = result {
                error!("Discovery responder stopped: {e}");
            }
        }));

        // The cycle ends on its own after the listen window, nobody joins it
        let node = Arc::clone(self);
        thread::spawn(move || {
            node.discover();
        });

        Ok(handle)
    }

    /// One discovery cycle; every answering node gets an outbound session
    pub fn discover(self: &Arc<Self>) -> Vec<Peer> {
        self.discovery_service().discover(|peer| {
            if let Err(e) = self.connect_to_peer(peer.clone()) {
                warn!("Failed to connect to peer {peer}: {e}");
            }
        })
    }

    /// Record a peer. Returns true when it was not known before.
    pub fn register_peer(self: &Arc<Self>, peer: Peer) -> Result<bool> {
        let added = self.peers.add_peer(peer.clone())?;
        if added {
            info!(
                "Peer added: {peer}. Total peers connected: {}",
                self.peers.len()?
            );
            if self.config.mine_on_peer_connect() && self.start_mining(PEER_CONNECT_BLOCK_DATA, None)? {
                info!("Mining started after peer connection");
            }
        }
        Ok(added)
    }

    /// Register `peer`, fetch its chain and adopt it when longer and valid
    pub fn connect_to_peer(self: &Arc<Self>, peer: Peer) -> Result<bool> {
        self.register_peer(peer.clone())?;
        let blocks = fetch_chain(&peer)?;
        info!("Connected to peer {peer}, received {} block(s)", blocks.len());
        self.adopt_chain(blocks)
    }

    /// Mine a block on the current tip and append it.
    ///
    /// The search runs without holding the chain lock. If another block landed
    /// in the meantime the candidate is rebuilt on the new tip and mined again.
    pub fn mine(
        &self,
        data: &str,
        media: Option<&MediaInfo>,
        cancel: Option<&CancelFlag>,
    ) -> Result<Block> {
        loop {
            let (mut block, difficulty) = {
                let chain = self.chain.read()?;
                (chain.prepare_candidate(data, media)?, chain.get_difficulty())
            };

            match cancel {
                Some(cancel) => block.mine_with_cancel(difficulty, cancel)?,
                None => block.mine(difficulty)?,
            }

            let mut chain = self.chain.write()?;
            if chain.try_append(block.clone())? {
                return Ok(block);
            }
            info!("Chain tip moved while mining, retrying on the new tip");
        }
    }

    /// Run one mining job in the background. Returns false when a job is
    /// already running.
    pub fn start_mining(self: &Arc<Self>, data: &str, media: Option<MediaInfo>) -> Result<bool> {
        let mut miner = self.miner.lock()?;
        if miner.as_ref().is_some_and(|job| !job.is_finished()) {
            info!("Mining is already running");
            return Ok(false);
        }
        *miner = Some(MiningJob::spawn(Arc::clone(self), data.to_string(), media));
        Ok(true)
    }

    /// Cancel the running mining job, if any
    pub fn stop_mining(&self) {
        match self.miner.lock() {
            Ok(miner) => {
                if let Some(job) = miner.as_ref() {
                    job.cancel();
                }
            }
            Err(e) => error!("Failed to stop mining: {e}"),
        }
    }

    pub fn is_mining(&self) -> bool {
        self.miner
            .lock()
            .map(|miner| miner.as_ref().is_some_and(|job| !job.is_finished()))
            .unwrap_or(false)
    }

    /// Wait for the last started mining job. `None` when no job was started.
    pub fn wait_for_mining(&self) -> Option<Result<Block>> {
        let job = match self.miner.lock() {
            Ok(mut miner) => miner.take(),
            Err(e) => return Some(Err(BlockchainError::from(e))),
        };
        job.map(MiningJob::join)
    }

    /// Offer a block mined elsewhere
    pub fn submit_block(&self, block: Block) -> Result<bool> {
        self.chain.write()?.try_append(block)
    }

    /// Offer a whole chain received from a peer
    pub fn adopt_chain(&self, blocks: Vec<Block>) -> Result<bool> {
        self.chain.write()?.adopt_if_longer(blocks)
    }

    pub fn validate_chain(&self) -> Result<bool> {
        Ok(self.chain.read()?.validate())
    }

    pub fn chain_len(&self) -> Result<usize> {
        Ok(self.chain.read()?.len())
    }

    pub fn chain_snapshot(&self) -> Result<Vec<Block>> {
        Ok(self.chain.read()?.blocks().to_vec())
    }

    pub fn chain_json(&self) -> Result<String> {
        let chain = self.chain.read()?;
        Ok(serde_json::to_string(chain.blocks())?)
    }

    pub fn peers(&self) -> Result<Vec<Peer>> {
        self.peers.get_peers()
    }

    pub fn peer_count(&self) -> Result<usize> {
        self.peers.len()
    }

    /// Plain-text status page: address, peers and the full chain
    pub fn status_report(&self) -> Result<String> {
        let peers = self.peers.get_peers()?;
        let mut report = format!(
            "Node IP: {}\nNode Port: {}\nConnected Peers: {}\n",
            self.local.get_address(),
            self.local.get_port(),
            peers.len()
        );
        for peer in &peers {
            report.push_str(&format!("{peer}\n"));
        }
        report.push_str("Blockchain Data\n");
        report.push_str(&self.chain.read()?.dump());
        Ok(report)
    }
}
