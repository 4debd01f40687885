//! Recover command implementation.

use crate::{OutputFormat, StrategyArg};
use journaled_core::{recover, Config, JournalFactory, OpenPolicy, RecoveryOutcome};
use journaled_storage::{ByteStore, FileJournalProvider, FileStore};
use serde::Serialize;
use std::path::Path;

/// Options for the recover command.
#[derive(Debug, Clone)]
pub struct RecoverOptions {
    /// Strategy the journal was written with.
    pub strategy: StrategyArg,
    /// Sparse block power, ignored for WAL.
    pub block_power: u8,
    /// Apply a committed journal.
    pub apply_committed: bool,
    /// Delete an uncommitted or unreadable journal.
    pub discard_uncommitted: bool,
}

#[derive(Debug, Serialize)]
struct RecoverResult {
    origin: String,
    journal: String,
    outcome: RecoveryOutcome,
    origin_length: u64,
}

/// Runs the recover command.
pub fn run(
    origin: &Path,
    journal: &Path,
    options: &RecoverOptions,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = recover_files(origin, journal, options)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("Origin:  {}", result.origin);
            println!("Journal: {}", result.journal);
            println!("Outcome: {}", result.outcome);
            println!("Origin length: {}", result.origin_length);
        }
    }

    Ok(())
}

fn recover_files(
    origin_path: &Path,
    journal: &Path,
    options: &RecoverOptions,
) -> Result<RecoverResult, Box<dyn std::error::Error>> {
    let factory = match options.strategy {
        StrategyArg::Wal => JournalFactory::wal(),
        StrategyArg::Sparse => JournalFactory::sparse(options.block_power)?,
    };
    let policy = OpenPolicy::NONE
        .apply_committed(options.apply_committed)
        .discard_uncommitted(options.discard_uncommitted);
    let config = Config::new().policy(policy);

    let mut origin = FileStore::open_existing(origin_path)?;
    let mut provider = FileJournalProvider::new(journal);
    let outcome = recover(&mut origin, &mut provider, &factory, &config)?;

    Ok(RecoverResult {
        origin: origin_path.display().to_string(),
        journal: journal.display().to_string(),
        outcome,
        origin_length: origin.size()?,
    })
}
