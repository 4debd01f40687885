//! Verify command implementation.

use super::load_report;
use crate::OutputFormat;
use serde::Serialize;
use std::path::Path;

/// Verification result.
#[derive(Debug, Serialize)]
struct VerifyResult<'a> {
    path: String,
    healthy: bool,
    committed: bool,
    problems: &'a [String],
}

/// Runs the verify command.
pub fn run(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let report = load_report(path)?;
    let result = VerifyResult {
        path: path.display().to_string(),
        healthy: report.is_healthy(),
        committed: report.committed,
        problems: &report.problems,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("Verifying journal at {}", result.path);
            println!();
            for problem in result.problems {
                println!("  - {problem}");
            }
            if result.healthy {
                let state = if result.committed {
                    "committed"
                } else {
                    "uncommitted"
                };
                println!("✓ Journal verification passed ({state})");
            } else {
                println!("✗ Journal verification failed");
            }
        }
    }

    if result.healthy {
        Ok(())
    } else {
        Err("Verification failed".into())
    }
}
