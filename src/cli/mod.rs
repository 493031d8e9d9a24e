//! CLI argument parsing and command dispatch

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use nim_bench_core::{Interrupts, LoadLevel, Operator};

use crate::app::{App, TestMode};
use crate::config::AppConfig;
use crate::menu::{self, AssumeYes, StdinOperator};

/// nim-bench - find the highest concurrency a NIM container sustains
#[derive(Parser, Debug)]
#[command(name = "nim-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "NIM_BENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write the run report as JSON to this path
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// NGC API key for this run only (overrides NGC_API_KEY and the key file)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive menu (default)
    Menu,
    /// Launch a NIM and benchmark it
    Test(TestArgs),
    /// Manage the stored NGC API key
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
    /// Manage the NIM registry
    Nims {
        #[command(subcommand)]
        command: NimsCommand,
    },
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Registry position (1-based), display name or model id
    #[arg(short, long)]
    pub nim: String,

    /// GPUs to expose: 'all' or a device list such as '0' or '0,1'
    #[arg(short, long)]
    pub gpus: String,

    /// Stop containers holding the port without asking
    #[arg(short, long)]
    pub yes: bool,

    #[command(subcommand)]
    pub mode: ModeCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModeCommand {
    /// Single iteration at a fixed load
    Manual {
        /// Total number of requests
        #[arg(short, long)]
        total: u32,
        /// Requests in flight at once
        #[arg(short, long)]
        concurrency: u32,
    },
    /// Scale concurrency until throughput drops below the threshold
    Auto {
        /// Tokens-per-second floor
        #[arg(long)]
        threshold: Option<f64>,
        /// Starting concurrency
        #[arg(long)]
        initial_concurrency: Option<u32>,
        /// Stop after this many iterations
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Never exceed this concurrency
        #[arg(long)]
        max_concurrency: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Store or rotate the key (prompts when no value is given)
    Set {
        /// The key
        value: Option<String>,
    },
    /// Show the key in effect, masked
    Show,
}

#[derive(Subcommand, Debug)]
pub enum NimsCommand {
    /// List registered NIMs
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a NIM image
    Add {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Image reference, e.g. nvcr.io/nim/meta/llama3-8b-instruct:latest
        #[arg(short, long)]
        image: String,
    },
}

impl Cli {
    /// Load configuration and run the selected command
    ///
    /// Test runs register with `interrupts` so Ctrl+C reaches them.
    pub async fn run(self, interrupts: Interrupts) -> Result<()> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(Commands::Test(args)) = &self.command {
            apply_overrides(&mut config, &args.mode)?;
        }
        let app = App::new(config, self.api_key, self.output).with_interrupts(interrupts);

        match self.command.unwrap_or(Commands::Menu) {
            Commands::Menu => menu::run(&app).await,
            Commands::Test(args) => run_test(&app, args).await,
            Commands::Key { command } => run_key(&app, command).await,
            Commands::Nims { command } => run_nims(&app, command),
        }
    }
}

/// Apply `auto` flags on top of the loaded config
fn apply_overrides(config: &mut AppConfig, mode: &ModeCommand) -> Result<()> {
    if let ModeCommand::Auto {
        threshold,
        initial_concurrency,
        max_iterations,
        max_concurrency,
    } = mode
    {
        let controller = &mut config.controller;
        if let Some(threshold) = threshold {
            controller.threshold = *threshold;
        }
        if let Some(initial) = initial_concurrency {
            controller.initial_concurrency = *initial;
        }
        if max_iterations.is_some() {
            controller.max_iterations = *max_iterations;
        }
        if max_concurrency.is_some() {
            controller.max_concurrency = *max_concurrency;
        }
    }
    config.validate()
}

async fn run_test(app: &App, args: TestArgs) -> Result<()> {
    let registry = app.registry()?;
    let entry = registry.find(&args.nim)?.clone();

    let mode = match args.mode {
        ModeCommand::Manual { total, concurrency } => {
            if total == 0 || concurrency == 0 {
                bail!("--total and --concurrency must be at least 1");
            }
            TestMode::Manual(LoadLevel::manual(total, concurrency))
        }
        ModeCommand::Auto { .. } => TestMode::Auto,
    };
    let operator: Arc<dyn Operator> = if args.yes {
        Arc::new(AssumeYes)
    } else {
        Arc::new(StdinOperator)
    };

    let report = app.run_test(&entry, &args.gpus, mode, operator).await?;
    if report.stop_reason.is_failure() {
        bail!("test ended early: {}", report.stop_reason);
    }
    Ok(())
}

async fn run_key(app: &App, command: KeyCommand) -> Result<()> {
    match command {
        KeyCommand::Set { value } => {
            let raw = match value {
                Some(value) => value,
                None => menu::prompt("Enter your NGC API key: ")
                    .await?
                    .unwrap_or_default(),
            };
            let key = app.credentials().save(&raw)?;
            println!(
                "NGC API key saved to {} ({}).",
                app.credentials().path().display(),
                key.masked()
            );
        }
        KeyCommand::Show => {
            let (key, source) = app.api_key()?;
            println!("{} (from {source})", key.masked());
        }
    }
    Ok(())
}

fn run_nims(app: &App, command: NimsCommand) -> Result<()> {
    match command {
        NimsCommand::List { json } => {
            let registry = app.registry()?;
            if json {
                println!("{}", serde_json::to_string_pretty(registry.entries())?);
            } else {
                menu::print_nims(&registry);
            }
            Ok(())
        }
        NimsCommand::Add { name, image } => menu::add_nim(app, &name, &image),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_menu() {
        let cli = Cli::try_parse_from(["nim-bench"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_parse_manual_test() {
        let cli = Cli::try_parse_from([
            "nim-bench", "test", "--nim", "1", "--gpus", "0,1", "manual", "--total", "50",
            "--concurrency", "10",
        ])
        .unwrap();

        let Some(Commands::Test(args)) = cli.command else {
            panic!("expected test command");
        };
        assert_eq!(args.nim, "1");
        assert_eq!(args.gpus, "0,1");
        assert!(matches!(
            args.mode,
            ModeCommand::Manual {
                total: 50,
                concurrency: 10
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "nim-bench", "nims", "list", "--verbose", "--output", "report.json",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.output, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_gpus_is_required() {
        assert!(Cli::try_parse_from(["nim-bench", "test", "--nim", "1", "auto"]).is_err());
    }

    #[test]
    fn test_auto_overrides_apply_and_validate() {
        let mut config = AppConfig::default();
        apply_overrides(
            &mut config,
            &ModeCommand::Auto {
                threshold: Some(25.0),
                initial_concurrency: Some(4),
                max_iterations: None,
                max_concurrency: Some(256),
            },
        )
        .unwrap();
        assert_eq!(config.controller.threshold, 25.0);
        assert_eq!(config.controller.initial_concurrency, 4);
        assert_eq!(config.controller.max_iterations, Some(20));
        assert_eq!(config.controller.max_concurrency, Some(256));

        let bad = ModeCommand::Auto {
            threshold: Some(-1.0),
            initial_concurrency: None,
            max_iterations: None,
            max_concurrency: None,
        };
        assert!(apply_overrides(&mut AppConfig::default(), &bad).is_err());
    }
}
