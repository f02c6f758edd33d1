//! Owner Bridge - CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use owner_bridge::demo::{self, DemoOptions};
use owner_bridge::util::config::resolve_config;
use owner_bridge::util::logger::{self, LogLevel};
use owner_bridge::{NAME, VERSION};

/// Run background tasks against an owner-confined object graph
#[derive(Parser, Debug)]
#[command(name = "owner-bridge")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the headless counter demo
    Demo {
        /// Counter updates before the demo quits
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
        ticks: u32,

        /// Milliseconds between counter updates
        #[arg(long, value_name = "MS", default_value_t = 1000)]
        interval_ms: u64,

        /// Skip the simulated button click
        #[arg(long)]
        no_click: bool,

        /// Configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// Configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.verbose {
        logger::init_debug();
    } else {
        logger::init_from_env(LogLevel::Info);
    }

    match args.command {
        Commands::Demo {
            ticks,
            interval_ms,
            no_click,
            config,
        } => {
            let config = resolve_config(config.as_deref()).context("Failed to load configuration")?;
            let options = DemoOptions {
                ticks,
                interval: Duration::from_millis(interval_ms),
                click: !no_click,
            };
            let outcome = demo::run(config, options).context("Demo failed")?;

            println!("{}", outcome.counter);
            println!("status: {}", outcome.status);
            if let Some(state) = outcome.counter_state {
                println!("counter task: {}", state);
            }
            println!(
                "tasks: {} admitted, {} cancelled, {} discarded",
                outcome.report.admitted, outcome.report.cancelled, outcome.report.discarded
            );
        }
        Commands::Config { config } => {
            let config = resolve_config(config.as_deref()).context("Failed to load configuration")?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
