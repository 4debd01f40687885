//! Inspect command implementation.

use super::load_report;
use crate::OutputFormat;
use journaled_core::JournalReport;
use std::fmt::Write as _;
use std::path::Path;

/// Runs the inspect command.
pub fn run(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let report = load_report(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_text(path, &report)),
    }

    Ok(())
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub(crate) fn render_text(path: &Path, report: &JournalReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Journal Inspection");
    let _ = writeln!(out, "==================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Path: {}", path.display());
    let _ = writeln!(out, "Size: {}", format_size(report.size));
    let _ = writeln!(out);
    let _ = writeln!(out, "Header:");
    let _ = writeln!(
        out,
        "  Implementation: {} ({})",
        or_dash(report.implementation.as_deref()),
        or_dash(report.implementation_id)
    );
    let _ = writeln!(
        out,
        "  Nonce:          {}",
        or_dash(report.nonce.map(|n| format!("{n:#018x}")))
    );
    let _ = writeln!(out, "  Committed:      {}", report.committed);
    let _ = writeln!(out, "  Final length:   {}", or_dash(report.final_length));

    if let Some(wal) = &report.wal {
        let _ = writeln!(out);
        let _ = writeln!(out, "Entries:");
        let _ = writeln!(
            out,
            "  Walked:        {} (footer: {})",
            wal.entries,
            or_dash(wal.footer_entries)
        );
        let _ = writeln!(out, "  Payload bytes: {}", format_size(wal.payload_bytes));
        let _ = writeln!(out, "  Largest entry: {}", wal.max_entry_length);
        for offset in &wal.checksum_failures {
            let _ = writeln!(out, "  Checksum mismatch at offset {offset}");
        }
    }

    if let Some(sparse) = &report.sparse {
        let _ = writeln!(out);
        let _ = writeln!(out, "Blocks:");
        let _ = writeln!(out, "  Block size:   {}", sparse.block_size);
        let _ = writeln!(out, "  Bitmap words: {}", sparse.bitmap_words);
        let _ = writeln!(out, "  Dirty blocks: {}", sparse.dirty_blocks);
    }

    if !report.problems.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Problems:");
        for problem in &report.problems {
            let _ = writeln!(out, "  - {problem}");
        }
    }

    out
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
