//! Configuration management
//!
//! This module handles the node settings: listen address, chain file,
//! difficulty, discovery parameters and the auto-mining policy.

pub mod settings;

pub use settings::{
    Config, DEFAULT_DIFFICULTY, DEFAULT_DISCOVERY_GROUP, DEFAULT_DISCOVERY_PORT, GLOBAL_CONFIG,
};
