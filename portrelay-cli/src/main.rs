//! portrelay unified CLI
//!
//! Relays TCP and UDP ports, either from a local rules file or as a remote
//! agent driven by a controller.

// Use mimalloc as the global allocator for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "portrelay",
    author,
    version,
    about = "TCP/UDP port relay with a remote agent control surface",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a remote agent serving the HTTP control surface
    Agent(commands::agent::AgentArgs),

    /// Relay the rules of a local JSON file
    Local(commands::local::LocalArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Agent(args) => commands::agent::run(args).await,
        Commands::Local(args) => commands::local::run(args).await,
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
