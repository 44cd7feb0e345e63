//! vdesk - exercise the virtual desktop manager client model
//!
//! Drives `vdesk-core` against the in-process compositor from
//! `vdesk-loopback`, or replays a recorded event trace through it.
//!
//! # Commands
//! - `simulate`: scripted create/activate/rename/remove session
//! - `replay <trace.jsonl>`: feed recorded events and print the final state

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

mod config;
mod replay;
mod simulate;

use config::Config;
use simulate::SimulationOptions;

/// vdesk - virtual desktop protocol client tooling
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run in debug mode with verbose logging
    #[arg(short, long)]
    debug: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Print default configuration to stdout
    #[arg(long)]
    print_default_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted session against the simulated compositor
    Simulate {
        /// Desktops the compositor starts with
        #[arg(long)]
        desktops: Option<usize>,

        /// Rows the desktops are laid out in
        #[arg(long)]
        rows: Option<u32>,
    },
    /// Replay a JSON-lines event trace
    Replay {
        /// Trace file, one `{"target": .., "event": ..}` object per line
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special commands
    if args.print_default_config {
        println!("{}", Config::default_config_string());
        return Ok(());
    }

    // Configuration decides the log level unless --debug overrides it, so
    // load it before the subscriber exists and report afterwards.
    let loaded = Config::load(args.config.as_deref());
    let config = loaded.as_ref().cloned().unwrap_or_default();

    let log_level = if args.debug {
        Level::DEBUG
    } else {
        config.general.level().unwrap_or(Level::INFO)
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("vdesk v{} starting...", env!("CARGO_PKG_VERSION"));

    if args.validate {
        loaded?;
        info!("Configuration is valid");
        return Ok(());
    }
    if let Err(e) = &loaded {
        warn!("Failed to load config: {:#}, using defaults", e);
    }

    match args.command.unwrap_or(Command::Simulate {
        desktops: None,
        rows: None,
    }) {
        Command::Simulate { desktops, rows } => {
            simulate::run_simulation(&config, SimulationOptions { desktops, rows })?;
        },
        Command::Replay { path } => {
            let file = File::open(&path)
                .with_context(|| format!("Failed to open trace {:?}", path))?;
            let report = replay::run_replay(BufReader::new(file), &config)?;

            if config.general.print_notifications {
                for notification in &report.notifications {
                    println!("{notification}");
                }
            }
            for anomaly in &report.anomalies {
                eprintln!("anomaly: {anomaly}");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
    }

    Ok(())
}
