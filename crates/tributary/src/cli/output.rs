//! Output formatting for CLI commands

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use std::path::PathBuf;
use tributary::{ProgressEvent, ProgressKind, RunResult};

/// Print a table with styled headers
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

/// Format a Unix timestamp (seconds) as UTC
pub fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// One line per candidate outcome
pub fn progress_line(event: &ProgressEvent<'_>) -> String {
    let label = match event.kind() {
        ProgressKind::Processed => "processed",
        ProgressKind::AlreadyPresent => "present",
        ProgressKind::Unnameable => "unnamed",
        ProgressKind::Error => "FAILED",
    };
    match event {
        ProgressEvent::Processed { source, dest } | ProgressEvent::AlreadyPresent { source, dest } => {
            format!("{:<10} {} -> {}", label, source, dest)
        }
        ProgressEvent::Unnameable { source } => format!("{:<10} {}", label, source),
        ProgressEvent::Error { source, error } => format!("{:<10} {}: {:#}", label, source, error),
    }
}

#[derive(Debug, Serialize)]
pub struct PathPair {
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Serialize)]
pub struct Failure {
    pub source: String,
    pub error: String,
}

/// Serializable view of a run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub dry_run: bool,
    pub processed: Vec<PathPair>,
    pub already_present: Vec<PathPair>,
    pub unnameable: Vec<String>,
    pub failed: Vec<Failure>,
    pub stopped_early: bool,
}

impl RunReport {
    pub fn new(source: PathBuf, dest: PathBuf, dry_run: bool, result: &RunResult) -> Self {
        let pairs = |items: &[(String, String)]| -> Vec<PathPair> {
            items
                .iter()
                .map(|(source, dest)| PathPair {
                    source: source.clone(),
                    dest: dest.clone(),
                })
                .collect()
        };

        Self {
            source,
            dest,
            dry_run,
            processed: pairs(&result.processed),
            already_present: pairs(&result.already_present),
            unnameable: result.unnameable.clone(),
            failed: result
                .failed
                .iter()
                .map(|(source, error)| Failure {
                    source: source.clone(),
                    error: format!("{:#}", error),
                })
                .collect(),
            stopped_early: result.stopped_early,
        }
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} {}, {} already present, {} unnameable, {} failed",
            self.processed.len(),
            if self.dry_run { "would be processed" } else { "processed" },
            self.already_present.len(),
            self.unnameable.len(),
            self.failed.len()
        );
        if self.stopped_early {
            line.push_str(" (stopped at limit)");
        }
        line
    }
}
