use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "tokfeed", version, about = "Merged short-video feed with a local media cache")]
pub struct Args {
    /// Configuration file (defaults to <config dir>/tokfeed/config.toml)
    #[arg(short, long, global = true, env = "TOKFEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Settings file holding the stored feed and signing endpoint
    #[arg(long, global = true, env = "TOKFEED_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize the feed unless it is still fresh
    Sync {
        /// Ignore the cooldown and synchronize now
        #[arg(short, long)]
        force: bool,
    },

    /// Print the stored feed
    Feed {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,

        /// Shorthand for --output json
        #[arg(long)]
        json: bool,
    },

    /// Download the avatar, cover and video of one feed item
    Cache {
        /// Video id from the stored feed
        video_id: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,
    },

    /// Show the effective configuration and file locations
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable
    Pretty,
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}
