// Entry point for the ledger node CLI
use clap::Parser;
use log::{error, info, LevelFilter};
use meshledger::cli::NodeArgs;
use meshledger::{
    query_status, BlockchainError, Chain, ChainStore, Command, Config, DiscoveryService, MediaInfo,
    Node, Opt, Peer, GLOBAL_CONFIG,
};
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.node, opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn build_config(args: NodeArgs) -> Config {
    let mut config = GLOBAL_CONFIG.clone();
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(address) = args.address {
        config = config.with_node_address(address);
    }
    if let Some(difficulty) = args.difficulty {
        config = config.with_difficulty(difficulty);
    }
    if let Some(path) = args.chain_file {
        config = config.with_chain_file(path);
    }
    config
}

/// Open the chain file without starting a node
fn open_chain(config: &Config) -> Result<Chain, BlockchainError> {
    config.validate()?;
    if config.get_port() == 0 && !config.has_chain_file() {
        return Err(BlockchainError::Config(
            "Pass --port or --chain-file to select a chain".to_string(),
        ));
    }
    Chain::bootstrap(ChainStore::new(config.get_chain_file()), config.get_difficulty())
}

fn run_command(args: NodeArgs, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(args);
    match command {
        Command::StartNode { mine_on_connect } => {
            let mine_on_connect = mine_on_connect || config.mine_on_peer_connect();
            let config = config.with_mine_on_peer_connect(mine_on_connect);
            let node = Node::new(config)?;
            let handle = node.start()?;
            println!(
                "Node {} listening on {}, chain file {}",
                node.local(),
                handle.local_addr(),
                node.get_config().get_chain_file().display()
            );
            handle.wait();
        }
        Command::Mine {
            data,
            media,
            media_type,
        } => {
            let mut chain = open_chain(&config)?;
            let media = match media {
                Some(path) => Some(MediaInfo::from_file(&path, media_type)?),
                None => None,
            };
            let block = chain.mine_and_append(&data, media.as_ref(), None)?;
            println!("Mined block {} (height {})", block.get_hash(), chain.len() - 1);
        }
        Command::Printchain => {
            let chain = open_chain(&config)?;
            for (height, block) in chain.blocks().iter().enumerate() {
                println!("Height: {height}");
                println!("Previous hash: {}", block.get_previous_hash());
                println!("Hash: {}", block.get_hash());
                println!("Timestamp: {}", block.get_timestamp());
                println!("Nonce: {}", block.get_nonce());
                println!("Data: {}", block.get_data());
                if !block.get_media_path().is_empty() {
                    println!(
                        "Media: {} ({}, {} bytes)",
                        block.get_media_path(),
                        block.get_media_type(),
                        block.get_media_size()
                    );
                }
                println!();
            }
        }
        Command::Validate => {
            let chain = open_chain(&config)?;
            match Chain::first_invalid_index(chain.blocks()) {
                None => println!("Chain is valid ({} blocks)", chain.len()),
                Some(index) => {
                    return Err(format!("Chain is invalid at block {index}").into());
                }
            }
        }
        Command::Discover => {
            config.validate()?;
            let local = Peer::new(config.get_node_address(), config.get_port());
            let discovery = DiscoveryService::new(
                config.get_discovery_group(),
                config.get_discovery_port(),
                config.get_discovery_timeout(),
                local,
            );
            let peers = discovery.discover(|peer| info!("Found peer {peer}"));
            if peers.is_empty() {
                println!("No peers answered");
            }
            for peer in peers {
                println!("{peer}");
            }
        }
        Command::Status { peer } => {
            print!("{}", query_status(&peer)?);
        }
    }
    Ok(())
}
