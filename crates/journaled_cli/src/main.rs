//! Journaled CLI
//!
//! Command-line tools for journal files left next to an origin file.
//!
//! # Commands
//!
//! - `inspect` - Display a journal's header, footer and contents
//! - `verify` - Check a journal for structural damage
//! - `recover` - Apply or discard a leftover journal
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Tools for journaled stores.
#[derive(Parser)]
#[command(name = "journaled")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Journal strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Write-ahead append log
    Wal,
    /// Block-sparse journal
    Sparse,
}

#[derive(Subcommand)]
enum Commands {
    /// Display a journal's header, footer and contents
    Inspect {
        /// Path to the journal file
        journal: PathBuf,
    },

    /// Check a journal for structural damage
    Verify {
        /// Path to the journal file
        journal: PathBuf,
    },

    /// Apply a committed journal or discard an uncommitted one
    Recover {
        /// Path to the origin file
        #[arg(long)]
        origin: PathBuf,

        /// Path to the journal file
        #[arg(long)]
        journal: PathBuf,

        /// Strategy the journal was written with
        #[arg(long, value_enum, default_value_t = StrategyArg::Wal)]
        strategy: StrategyArg,

        /// Sparse block size as a power of two
        #[arg(long, default_value_t = journaled_core::journal::DEFAULT_SPARSE_BLOCK_POWER)]
        block_power: u8,

        /// Refuse to apply a committed journal
        #[arg(long)]
        no_apply: bool,

        /// Delete an uncommitted or unreadable journal
        #[arg(long)]
        discard_uncommitted: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { journal } => {
            commands::inspect::run(&journal, cli.format)?;
        }
        Commands::Verify { journal } => {
            commands::verify::run(&journal, cli.format)?;
        }
        Commands::Recover {
            origin,
            journal,
            strategy,
            block_power,
            no_apply,
            discard_uncommitted,
        } => {
            let options = commands::recover::RecoverOptions {
                strategy,
                block_power,
                apply_committed: !no_apply,
                discard_uncommitted,
            };
            commands::recover::run(&origin, &journal, &options, cli.format)?;
        }
        Commands::Version => {
            println!("journaled CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("journaled_core v{}", journaled_core::VERSION);
        }
    }

    Ok(())
}
