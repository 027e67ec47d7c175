use crate::network::Peer;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "meshledger")]
pub struct Opt {
    #[command(flatten)]
    pub node: NodeArgs,
    #[command(subcommand)]
    pub command: Command,
}

/// Overrides applied on top of the environment settings
#[derive(Args, Debug, Default, Clone)]
pub struct NodeArgs {
    #[arg(long, global = true, help = "TCP port of this node (0 picks a free one)")]
    pub port: Option<u16>,
    #[arg(long, global = true, help = "Address announced to other nodes")]
    pub address: Option<String>,
    #[arg(long, global = true, help = "Leading hex zeros required in block hashes")]
    pub difficulty: Option<usize>,
    #[arg(long = "chain-file", global = true, help = "Path of the chain file")]
    pub chain_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "startnode", about = "Start a node and discover peers")]
    StartNode {
        #[arg(long = "mine-on-connect", help = "Mine a block whenever a new peer connects")]
        mine_on_connect: bool,
    },
    #[command(name = "mine", about = "Mine a block onto the local chain")]
    Mine {
        #[arg(help = "Payload of the block")]
        data: String,
        #[arg(long, help = "Media file to reference from the block")]
        media: Option<PathBuf>,
        #[arg(long = "media-type", requires = "media", help = "Media type label")]
        media_type: Option<String>,
    },
    #[command(name = "printchain", about = "Print all blocks in the chain file")]
    Printchain,
    #[command(name = "validate", about = "Check hashes and links of the chain file")]
    Validate,
    #[command(name = "discover", about = "Run one discovery cycle and list answering nodes")]
    Discover,
    #[command(name = "status", about = "Ask a node for its status page")]
    Status {
        #[arg(help = "Node address as ADDRESS:PORT")]
        peer: Peer,
    },
}
