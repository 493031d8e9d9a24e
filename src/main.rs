//! nim-bench - adaptive load testing for locally served NIM containers

use anyhow::Result;
use clap::Parser;
use nim_bench_core::{InterruptAction, Interrupts};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod menu;
mod report;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let interrupts = Interrupts::new();
    spawn_interrupt_listener(interrupts.clone());
    cli.run(interrupts).await
}

/// Own Ctrl+C for the whole process
///
/// An active run is asked to stop; otherwise the process exits with the
/// conventional SIGINT status.
fn spawn_interrupt_listener(interrupts: Interrupts) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            match interrupts.interrupt() {
                InterruptAction::Forwarded => {
                    tracing::info!("Received Ctrl+C, stopping the current run...");
                }
                InterruptAction::Exit => {
                    println!();
                    std::process::exit(130);
                }
            }
        }
    });
}
