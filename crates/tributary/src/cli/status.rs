//! Status command - summarize the provenance ledger of a destination tree

use crate::cli::error::HelpfulError;
use crate::cli::output::{format_timestamp, print_table};
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;
use tributary_store::{MetadataDir, ProvenanceRecord, ProvenanceStore, PROVENANCE_DB_NAME};

/// Arguments for the status command
#[derive(Debug)]
pub struct StatusArgs {
    pub dest: PathBuf,
    /// Show the record for this destination-relative output path
    pub output: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    dest: PathBuf,
    records: u64,
    last_processed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<ProvenanceRecord>,
}

/// Execute the status command
pub fn run(args: StatusArgs) -> anyhow::Result<()> {
    let db_path = MetadataDir::path_for(&args.dest).join(PROVENANCE_DB_NAME);
    if !db_path.exists() {
        return Err(HelpfulError::no_ledger(&args.dest).into());
    }

    let store = ProvenanceStore::open(&db_path)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let output = match &args.output {
        Some(output_path) => Some(store.record_for_output(output_path)?.ok_or_else(|| {
            HelpfulError::new(format!("No record for output '{}'", output_path))
                .with_context(format!("Ledger: {}", db_path.display()))
                .with_suggestion("TRY: Output paths are relative to the destination root")
        })?),
        None => None,
    };

    let report = StatusReport {
        dest: args.dest,
        records: store.count()?,
        last_processed: store.most_recently_processed()?,
        output,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut rows = vec![
        vec!["Destination".to_string(), report.dest.display().to_string()],
        vec!["Records".to_string(), report.records.to_string()],
        vec![
            "Last processed".to_string(),
            report.last_processed.clone().unwrap_or_else(|| "-".to_string()),
        ],
    ];
    if let Some(record) = &report.output {
        rows.push(vec!["Output".to_string(), record.output_path.clone()]);
        rows.push(vec!["Derived from".to_string(), record.input_path.clone()]);
        rows.push(vec![
            "Operation".to_string(),
            record.operation_name.clone().unwrap_or_else(|| "-".to_string()),
        ]);
        rows.push(vec!["Recorded".to_string(), format_timestamp(record.recorded_at)]);
    }
    print_table(&["Field", "Value"], rows);

    Ok(())
}
