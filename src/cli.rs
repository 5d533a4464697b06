use std::net::SocketAddr;

use clap::Parser;

/// Command-line surface for the relay binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "0.0.0.0:4567")]
    pub listen: SocketAddr,
}
