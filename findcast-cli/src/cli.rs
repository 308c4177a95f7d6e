//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "findcast",
    version,
    about = "Relay item-found feed events to Discord webhooks"
)]
pub struct Args {
    /// Path to the routing table (tracked users and their webhooks)
    #[arg(short, long, default_value = "routing.toml")]
    pub routing: PathBuf,

    /// Feed auth token; falls back to the FEED_TOKEN environment variable
    #[arg(long, env = "FEED_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable all logging (good for headless runs)
    #[arg(short, long, conflicts_with = "verbose")]
    pub silent: bool,
}
