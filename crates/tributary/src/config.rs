//! Pipeline configuration files (TOML).

use crate::matchers;
use crate::naming::Namer;
use crate::pipeline::{Pipeline, RunOptions};
use crate::process::{self, CaptureOutput, CommandArg, RunCommand};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// How outputs are produced from inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessMode {
    /// Copy the input to the output path.
    #[default]
    Copy,
    /// Hard-link the output path to the input.
    Link,
    /// Run `command`, which writes the output itself.
    Run,
    /// Run `command` and store its standard output as the output.
    Capture,
}

/// A pipeline described as data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source tree root
    pub source: Option<PathBuf>,

    /// Destination tree root
    pub dest: Option<PathBuf>,

    /// Operation name recorded with every derivation
    pub operation: Option<String>,

    /// Only inputs ending with one of these suffixes (case-insensitive)
    pub include: Vec<String>,

    /// Only inputs matching this glob
    pub glob: Option<String>,

    /// Name outputs by removing the separators from the input path
    pub flatten: bool,

    pub mode: ProcessMode,

    /// Command line for `run` and `capture`; `{in}` and `{out}` are replaced
    /// by the input and output paths
    pub command: Vec<String>,

    pub run: RunOptions,
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.is_none() {
            return Err(ConfigError::Invalid("no source directory given".to_string()));
        }
        if self.dest.is_none() {
            return Err(ConfigError::Invalid("no destination directory given".to_string()));
        }
        match self.mode {
            ProcessMode::Run | ProcessMode::Capture if self.command.is_empty() => {
                Err(ConfigError::Invalid(format!(
                    "mode '{}' needs a command",
                    self.mode.as_str()
                )))
            }
            ProcessMode::Copy | ProcessMode::Link if !self.command.is_empty() => {
                Err(ConfigError::Invalid(format!(
                    "mode '{}' does not take a command",
                    self.mode.as_str()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Build the pipeline this configuration describes.
    pub fn build_pipeline(&self) -> crate::Result<Pipeline> {
        self.validate()?;
        let (source, dest) = match (&self.source, &self.dest) {
            (Some(source), Some(dest)) => (source.clone(), dest.clone()),
            _ => return Err(ConfigError::Invalid("missing source or destination".to_string()).into()),
        };

        let args = CommandArg::parse_all(&self.command);
        let invalid = |e: process::ProcessError| ConfigError::Invalid(e.to_string());
        let mut pipeline = match self.mode {
            ProcessMode::Copy => Pipeline::new(source, dest, process::copy_file)?,
            ProcessMode::Link => Pipeline::new(source, dest, process::hard_link)?,
            ProcessMode::Run => Pipeline::new(source, dest, RunCommand::new(args).map_err(invalid)?)?,
            ProcessMode::Capture => {
                Pipeline::new(source, dest, CaptureOutput::new(args).map_err(invalid)?)?
            }
        };

        if self.flatten {
            pipeline = pipeline.with_namer(Namer::flatten());
        }
        if let Some(operation) = &self.operation {
            pipeline = pipeline.with_operation_name(operation.clone());
        }

        let suffix_filter = if self.include.is_empty() {
            None
        } else {
            Some(matchers::ends_with(self.include.clone(), false))
        };
        let glob_filter = match &self.glob {
            Some(pattern) => Some(matchers::glob(pattern).map_err(ConfigError::from)?),
            None => None,
        };
        if suffix_filter.is_some() || glob_filter.is_some() {
            pipeline = pipeline.with_name_filter(move |path: &str| {
                suffix_filter.as_ref().map_or(true, |f| f(path))
                    && glob_filter.as_ref().map_or(true, |f| f(path))
            });
        }

        Ok(pipeline)
    }
}

impl ProcessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessMode::Copy => "copy",
            ProcessMode::Link => "link",
            ProcessMode::Run => "run",
            ProcessMode::Capture => "capture",
        }
    }
}
