// src/cli/mod.rs
// CLI argument definitions and command entry points

mod serve;

pub use serve::{run_health, run_mcp_server};

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "linear-fast",
    version,
    about = "Unified Linear MCP server - local cache reads with official fallback"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Print gateway health as JSON and exit
    Health,
}
