use crate::core::MAX_DIFFICULTY;
use crate::error::{BlockchainError, Result};
use crate::utils::local_ipv4;
use once_cell::sync::Lazy;
use std::env;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Defaults read once from the environment
pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

pub const DEFAULT_DIFFICULTY: usize = 4;
pub const DEFAULT_DISCOVERY_GROUP: Ipv4Addr = Ipv4Addr::new(230, 0, 0, 0);
pub const DEFAULT_DISCOVERY_PORT: u16 = 9876;
const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_DATA_DIR: &str = "data";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_PORT_KEY: &str = "NODE_PORT";
const CHAIN_FILE_KEY: &str = "CHAIN_FILE";
const DIFFICULTY_KEY: &str = "DIFFICULTY";
const DISCOVERY_GROUP_KEY: &str = "DISCOVERY_GROUP";
const DISCOVERY_PORT_KEY: &str = "DISCOVERY_PORT";
const DISCOVERY_TIMEOUT_KEY: &str = "DISCOVERY_TIMEOUT_MS";
const MINE_ON_PEER_CONNECT_KEY: &str = "MINE_ON_PEER_CONNECT";

/// Node settings. Port 0 means "pick a free port when the server binds".
#[derive(Debug, Clone)]
pub struct Config {
    node_address: String,
    port: u16,
    chain_file: Option<PathBuf>,
    difficulty: usize,
    discovery_group: Ipv4Addr,
    discovery_port: u16,
    discovery_timeout: Duration,
    mine_on_peer_connect: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            node_address: Ipv4Addr::LOCALHOST.to_string(),
            port: 0,
            chain_file: None,
            difficulty: DEFAULT_DIFFICULTY,
            discovery_group: DEFAULT_DISCOVERY_GROUP,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_timeout: Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
            mine_on_peer_connect: false,
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables. Unparsable values are
    /// ignored so a typo never stops the node from starting.
    pub fn new() -> Config {
        let mut config = Config {
            node_address: local_ipv4().to_string(),
            ..Config::default()
        };

        if let Ok(addr) = env::var(NODE_ADDRESS_KEY) {
            config.node_address = addr;
        }
        if let Some(port) = env_parse(NODE_PORT_KEY) {
            config.port = port;
        }
        if let Ok(path) = env::var(CHAIN_FILE_KEY) {
            config.chain_file = Some(PathBuf::from(path));
        }
        if let Some(difficulty) = env_parse(DIFFICULTY_KEY) {
            config.difficulty = difficulty;
        }
        if let Some(group) = env_parse(DISCOVERY_GROUP_KEY) {
            config.discovery_group = group;
        }
        if let Some(port) = env_parse(DISCOVERY_PORT_KEY) {
            config.discovery_port = port;
        }
        if let Some(ms) = env_parse(DISCOVERY_TIMEOUT_KEY) {
            config.discovery_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = env_parse(MINE_ON_PEER_CONNECT_KEY) {
            config.mine_on_peer_connect = flag;
        }
        config
    }

    pub fn with_node_address(mut self, addr: impl Into<String>) -> Self {
        self.node_address = addr.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_chain_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.chain_file = Some(path.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_discovery_group(mut self, group: Ipv4Addr) -> Self {
        self.discovery_group = group;
        self
    }

    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_mine_on_peer_connect(mut self, enabled: bool) -> Self {
        self.mine_on_peer_connect = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "Difficulty {} exceeds the maximum of {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }
        if !self.discovery_group.is_multicast() {
            return Err(BlockchainError::Config(format!(
                "{} is not a multicast address",
                self.discovery_group
            )));
        }
        if self.discovery_timeout.is_zero() {
            return Err(BlockchainError::Config(
                "Discovery timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn get_node_address(&self) -> &str {
        self.node_address.as_str()
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    /// Chain file for this node, `./data/chain_<port>.txt` unless configured
    pub fn get_chain_file(&self) -> PathBuf {
        match &self.chain_file {
            Some(path) => path.clone(),
            None => PathBuf::from(DEFAULT_DATA_DIR).join(format!("chain_{}.txt", self.port)),
        }
    }

    /// True when the chain file was set explicitly rather than derived from the port
    pub fn has_chain_file(&self) -> bool {
        self.chain_file.is_some()
    }

    pub fn get_difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn get_discovery_group(&self) -> Ipv4Addr {
        self.discovery_group
    }

    pub fn get_discovery_port(&self) -> u16 {
        self.discovery_port
    }

    pub fn get_discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    pub fn mine_on_peer_connect(&self) -> bool {
        self.mine_on_peer_connect
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
