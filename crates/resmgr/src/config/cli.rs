use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::replay::ReplayArgs;

#[derive(Parser)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay recorded CRI traffic through the cache and print the resulting pods
    Replay(ReplayArgs),
}
