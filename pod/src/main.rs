//! pod - Entry Point
//!
//! Git push deployment and lifecycle management for Node.js apps run by pm2.

use clap::Parser;
use colored::Colorize;

use pod::cli::{execute, Cli};
use pod::errors::PodError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = execute(cli).await {
        eprintln!("{} {:#}", "pod".red().bold(), e);
        let code = e.downcast_ref::<PodError>().map(PodError::exit_code).unwrap_or(1);
        std::process::exit(code);
    }
}
