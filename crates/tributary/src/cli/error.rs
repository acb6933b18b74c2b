//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use serde::Serialize;
use std::fmt;
use std::path::Path;
use tributary::PipelineError;

/// An error with helpful context and suggestions
#[derive(Debug, Serialize)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Path does not exist
    pub fn path_not_found(path: &Path) -> Self {
        Self::new(format!("Path not found: {}", path.display()))
            .with_context("The source tree must exist before it can be processed")
            .with_suggestions([
                format!("TRY: Check that the path exists: ls -la {}", path.display()),
                "TRY: Check for typos in the path".to_string(),
            ])
    }

    /// Path exists but is not a directory
    pub fn not_a_directory(path: &Path) -> Self {
        Self::new(format!("Not a directory: {}", path.display()))
            .with_context("The run command expects a source directory, not a file")
            .with_suggestion(format!(
                "TRY: Use the parent directory: {}",
                path.parent().map(|p| p.display().to_string()).unwrap_or_else(|| ".".to_string())
            ))
    }

    /// Source or destination missing from both arguments and config
    pub fn missing_root(which: &str) -> Self {
        Self::new(format!("No {} directory given", which))
            .with_context("Pass it as an argument or set it in the config file")
            .with_suggestions([
                "TRY: tributary run SOURCE DEST".to_string(),
                format!("TRY: Add `{} = \"...\"` to the file passed with --config", which),
            ])
    }

    /// Configuration file cannot be used
    pub fn invalid_config(path: Option<&Path>, details: &str) -> Self {
        let err = Self::new(format!("Invalid configuration: {}", details));
        match path {
            Some(path) => err
                .with_context(format!("While reading {}", path.display()))
                .with_suggestion("TRY: Valid modes are: copy, link, run, capture"),
            None => err.with_suggestion("TRY: Valid modes are: copy, link, run, capture"),
        }
    }

    /// No provenance ledger under a destination
    pub fn no_ledger(dest: &Path) -> Self {
        Self::new(format!("No provenance ledger under {}", dest.display()))
            .with_context("Nothing has been processed into this destination yet")
            .with_suggestion(format!("TRY: tributary run SOURCE {}", dest.display()))
    }

    /// Translate a fatal pipeline error
    pub fn from_pipeline(err: PipelineError, dest: &Path) -> Self {
        match err {
            PipelineError::InvalidOptions(msg) => Self::new(format!("Invalid run options: {}", msg))
                .with_suggestions([
                    "TRY: Drop --limit-to when resuming".to_string(),
                    "TRY: Drop --resume to process only the given subtree".to_string(),
                ]),
            PipelineError::Config(e) => Self::invalid_config(None, &e.to_string()),
            PipelineError::Store(e) => Self::new(format!("Provenance ledger unusable: {}", e))
                .with_context(format!(
                    "The ledger lives in {}",
                    tributary_store::MetadataDir::path_for(dest).display()
                ))
                .with_suggestions([
                    "TRY: Check permissions on the destination directory".to_string(),
                    "TRY: Move the metadata directory aside to start a fresh ledger".to_string(),
                ]),
            PipelineError::Walk(e) => {
                let err = Self::new(format!("Source traversal failed: {}", e));
                match e.path() {
                    Some(path) => err.with_suggestion(format!(
                        "TRY: Check permissions: ls -la {}",
                        path.display()
                    )),
                    None => err,
                }
            }
        }
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// Print an error as a JSON object on stdout.
pub fn print_json_error(err: &anyhow::Error) {
    let payload = match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::to_value(helpful),
        None => serde_json::to_value(HelpfulError::new(format!("{:#}", err))),
    };
    match payload {
        Ok(value) => println!("{}", serde_json::json!({ "error": value })),
        Err(_) => eprintln!("{:?}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_helpful_error_display() {
        let err = HelpfulError::new("Something went wrong")
            .with_context("While processing data")
            .with_suggestion("Try again");

        let display = format!("{}", err);
        assert!(display.contains("ERROR: Something went wrong"));
        assert!(display.contains("CONTEXT: While processing data"));
        assert!(display.contains("Try again"));
    }

    #[test]
    fn test_path_not_found() {
        let path = PathBuf::from("/nonexistent/path");
        let display = format!("{}", HelpfulError::path_not_found(&path));
        assert!(display.contains("/nonexistent/path"));
        assert!(display.contains("TRY:"));
    }

    #[test]
    fn test_invalid_options_suggests_fix() {
        let err = HelpfulError::from_pipeline(
            PipelineError::InvalidOptions("resume and limit_to cannot be combined".into()),
            Path::new("/out"),
        );
        let display = format!("{}", err);
        assert!(display.contains("resume and limit_to"));
        assert!(display.contains("--limit-to"));
    }
}
