//! Run command - derive outputs for new or changed inputs

use crate::cli::error::HelpfulError;
use crate::cli::output::{progress_line, RunReport};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;
use tributary::{PipelineConfig, ProcessMode};
use tributary_store::{MetadataDir, LOGS_DIR_NAME};

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Source tree to read inputs from
    pub source: Option<PathBuf>,

    /// Destination tree to write outputs (and the provenance ledger) into
    pub dest: Option<PathBuf>,

    /// Pipeline config file (TOML); flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only inputs with this suffix (repeatable, case-insensitive)
    #[arg(short = 'e', long = "ext")]
    pub extensions: Vec<String>,

    /// Only inputs matching this glob
    #[arg(short, long)]
    pub glob: Option<String>,

    /// Name outputs by removing the directory separators from the input path
    #[arg(long)]
    pub flatten: bool,

    /// Hard-link outputs to inputs instead of copying
    #[arg(long, conflicts_with = "capture")]
    pub link: bool,

    /// Store the command's standard output as the output file
    #[arg(long)]
    pub capture: bool,

    /// Operation name recorded with each derivation
    #[arg(long)]
    pub operation: Option<String>,

    /// Report what would be processed without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stop after processing this many inputs
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Stop before processing inputs in more than this many directories
    #[arg(long)]
    pub max_dirs: Option<usize>,

    /// Only process this subtree of the source (e.g. 2024/01)
    #[arg(long, conflicts_with = "resume")]
    pub limit_to: Option<String>,

    /// Continue after the most recently processed input
    #[arg(long)]
    pub resume: bool,

    /// Stop scanning after this many directories
    #[arg(long)]
    pub max_scanned_dirs: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Command producing each output; `{in}` and `{out}` are replaced by the paths
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Config file values with the command-line flags applied on top.
    pub fn resolve_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .map_err(|e| HelpfulError::invalid_config(Some(path.as_path()), &e.to_string()))?,
            None => PipelineConfig::default(),
        };

        if self.source.is_some() {
            config.source = self.source.clone();
        }
        if self.dest.is_some() {
            config.dest = self.dest.clone();
        }
        if !self.extensions.is_empty() {
            config.include = self.extensions.iter().map(|e| normalize_suffix(e)).collect();
        }
        if self.glob.is_some() {
            config.glob = self.glob.clone();
        }
        if self.operation.is_some() {
            config.operation = self.operation.clone();
        }
        config.flatten |= self.flatten;

        if !self.command.is_empty() {
            if self.link {
                return Err(HelpfulError::new("--link cannot be combined with a command")
                    .with_suggestion("TRY: Drop --link, or drop the command after --")
                    .into());
            }
            config.command = self.command.clone();
            config.mode = if self.capture { ProcessMode::Capture } else { ProcessMode::Run };
        } else if self.link {
            config.mode = ProcessMode::Link;
            config.command.clear();
        } else if self.capture {
            config.mode = ProcessMode::Capture;
        }

        let run = &mut config.run;
        run.dry_run |= self.dry_run;
        run.resume |= self.resume;
        if self.max_items.is_some() {
            run.max_items = self.max_items;
        }
        if self.max_dirs.is_some() {
            run.max_dirs = self.max_dirs;
        }
        if self.limit_to.is_some() {
            run.limit_to = self.limit_to.clone();
        }
        if self.max_scanned_dirs.is_some() {
            run.max_scanned_dirs = self.max_scanned_dirs;
        }

        Ok(config)
    }

    /// Where the run logs to. Only known once the configuration is complete
    /// and its source is a directory, so a bad invocation leaves the
    /// destination untouched.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let config = self.resolve_config().ok()?;
        config.validate().ok()?;
        if !config.source.as_deref().map_or(false, Path::is_dir) {
            return None;
        }
        let dest = config.dest?;
        Some(MetadataDir::path_for(dest).join(LOGS_DIR_NAME))
    }
}

/// `csv` and `.csv` both mean the `.csv` suffix.
fn normalize_suffix(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Execute the run command. Returns whether any input failed.
pub fn run(args: RunArgs) -> anyhow::Result<bool> {
    let config = args.resolve_config()?;

    let source = config
        .source
        .clone()
        .ok_or_else(|| HelpfulError::missing_root("source"))?;
    let dest = config
        .dest
        .clone()
        .ok_or_else(|| HelpfulError::missing_root("dest"))?;

    if !source.exists() {
        return Err(HelpfulError::path_not_found(&source).into());
    }
    if !source.is_dir() {
        return Err(HelpfulError::not_a_directory(&source).into());
    }

    let mut pipeline = config
        .build_pipeline()
        .map_err(|e| HelpfulError::from_pipeline(e, &dest))?;
    if !args.json {
        pipeline = pipeline.on_progress(|event| println!("{}", progress_line(event)));
    }

    info!(source = %source.display(), dest = %dest.display(), mode = config.mode.as_str(), "Running pipeline");
    let result = pipeline
        .run(&config.run)
        .map_err(|e| HelpfulError::from_pipeline(e, &dest))?;

    let report = RunReport::new(source, dest, config.run.dry_run, &result);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        println!("{}", report.summary());
    }

    Ok(result.has_failures())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pipeline.toml");
        std::fs::write(
            &path,
            r#"
            source = "/from-file"
            dest = "/out"
            include = [".txt"]
            mode = "run"
            command = ["cp", "{in}", "{out}"]

            [run]
            max_items = 10
            "#,
        )
        .unwrap();

        let args = RunArgs {
            source: Some("/from-flag".into()),
            config: Some(path),
            extensions: vec!["csv".into()],
            link: true,
            max_items: Some(2),
            dry_run: true,
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();

        assert_eq!(config.source, Some(PathBuf::from("/from-flag")));
        assert_eq!(config.dest, Some(PathBuf::from("/out")));
        assert_eq!(config.include, vec![".csv".to_string()]);
        assert_eq!(config.mode, ProcessMode::Link);
        assert!(config.command.is_empty());
        assert_eq!(config.run.max_items, Some(2));
        assert!(config.run.dry_run);
    }

    #[test]
    fn test_trailing_command_selects_mode() {
        let args = RunArgs {
            command: vec!["sort".into(), "{in}".into()],
            capture: true,
            ..Default::default()
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.mode, ProcessMode::Capture);
        assert_eq!(config.command, vec!["sort", "{in}"]);

        let args = RunArgs {
            command: vec!["true".into()],
            link: true,
            ..Default::default()
        };
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn test_log_dir_follows_dest() {
        let tmp = TempDir::new().unwrap();
        let args = RunArgs {
            source: Some(tmp.path().to_path_buf()),
            dest: Some("/out".into()),
            ..Default::default()
        };
        assert_eq!(args.log_dir(), Some(PathBuf::from("/out/.tributary/logs")));
        assert_eq!(RunArgs::default().log_dir(), None);
    }

    #[test]
    fn test_no_log_dir_without_source() {
        let tmp = TempDir::new().unwrap();
        let args = RunArgs {
            source: Some(tmp.path().join("missing")),
            dest: Some(tmp.path().join("out")),
            ..Default::default()
        };
        assert_eq!(args.log_dir(), None);
    }
}
