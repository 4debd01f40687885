//! CLI command implementations.

pub mod inspect;
pub mod recover;
pub mod verify;

use journaled_core::{inspect_journal, JournalReport};
use journaled_storage::FileStore;
use std::path::Path;
use tracing::debug;

/// Opens the journal file at `path` and inspects it.
fn load_report(path: &Path) -> Result<JournalReport, Box<dyn std::error::Error>> {
    if !path.is_file() {
        return Err(format!("No journal found at {}", path.display()).into());
    }
    debug!(path = %path.display(), "inspecting journal");
    let store = FileStore::open_existing(path)?;
    Ok(inspect_journal(Box::new(store))?)
}
