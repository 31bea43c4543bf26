pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pixiv-courier")]
#[command(about = "Emails new illustrations from a pixiv follow feed", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the follow feed once and deliver new illustrations
    Sync,
    /// Show cache state without touching the network
    Status,
}
