//! Processing callbacks.
//!
//! A [`Processor`] creates the output for one input. Any
//! `FnMut(&Path, &Path) -> anyhow::Result<()>` is a processor; this module
//! also provides ready-made ones for external commands, copies and hard links.

use anyhow::Context;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::debug;

/// Creates `dest` from `src`. Errors are recorded by the pipeline, never
/// propagated out of a run.
pub trait Processor {
    fn process(&mut self, src: &Path, dest: &Path) -> anyhow::Result<()>;
}

impl<F> Processor for F
where
    F: FnMut(&Path, &Path) -> anyhow::Result<()>,
{
    fn process(&mut self, src: &Path, dest: &Path) -> anyhow::Result<()> {
        self(src, dest)
    }
}

/// Errors from the built-in command processors.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Command has no program to run")]
    EmptyCommand,

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One argument of an external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    /// Replaced by the absolute source path.
    Input,
    /// Replaced by the absolute destination path.
    Output,
    Literal(String),
}

impl CommandArg {
    pub const INPUT_TOKEN: &'static str = "{in}";
    pub const OUTPUT_TOKEN: &'static str = "{out}";

    /// `{in}` and `{out}` become placeholders; anything else is literal.
    pub fn parse_template(arg: &str) -> Self {
        match arg {
            Self::INPUT_TOKEN => CommandArg::Input,
            Self::OUTPUT_TOKEN => CommandArg::Output,
            other => CommandArg::Literal(other.to_string()),
        }
    }

    pub fn parse_all<I, S>(args: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter().map(|a| Self::parse_template(a.as_ref())).collect()
    }

    fn render(&self, src: &Path, dest: &Path) -> OsString {
        match self {
            CommandArg::Input => src.as_os_str().to_os_string(),
            CommandArg::Output => dest.as_os_str().to_os_string(),
            CommandArg::Literal(s) => OsString::from(s),
        }
    }
}

impl From<&str> for CommandArg {
    fn from(arg: &str) -> Self {
        CommandArg::Literal(arg.to_string())
    }
}

fn program_name(args: &[CommandArg]) -> String {
    match args.first() {
        Some(CommandArg::Literal(p)) => p.clone(),
        Some(CommandArg::Input) => CommandArg::INPUT_TOKEN.to_string(),
        Some(CommandArg::Output) => CommandArg::OUTPUT_TOKEN.to_string(),
        None => String::new(),
    }
}

fn run_to_completion(args: &[CommandArg], src: &Path, dest: &Path) -> Result<Output, ProcessError> {
    let mut rendered = args.iter().map(|a| a.render(src, dest));
    let program = rendered.next().ok_or(ProcessError::EmptyCommand)?;

    debug!(program = %program_name(args), src = %src.display(), "Running command");

    let output = Command::new(&program)
        .args(rendered)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ProcessError::Spawn {
            program: program_name(args),
            source,
        })?;

    if !output.status.success() {
        return Err(ProcessError::CommandFailed {
            program: program_name(args),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Runs an external program that writes the destination itself.
#[derive(Debug, Clone)]
pub struct RunCommand {
    args: Vec<CommandArg>,
}

impl RunCommand {
    pub fn new(args: Vec<CommandArg>) -> Result<Self, ProcessError> {
        if args.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        Ok(Self { args })
    }

    pub fn args(&self) -> &[CommandArg] {
        &self.args
    }
}

impl Processor for RunCommand {
    fn process(&mut self, src: &Path, dest: &Path) -> anyhow::Result<()> {
        run_to_completion(&self.args, src, dest)?;
        Ok(())
    }
}

/// Runs an external program and stores its standard output as the
/// destination. Nothing is written when the program fails.
#[derive(Debug, Clone)]
pub struct CaptureOutput {
    args: Vec<CommandArg>,
}

impl CaptureOutput {
    pub fn new(args: Vec<CommandArg>) -> Result<Self, ProcessError> {
        if args.is_empty() {
            return Err(ProcessError::EmptyCommand);
        }
        Ok(Self { args })
    }

    pub fn args(&self) -> &[CommandArg] {
        &self.args
    }
}

impl Processor for CaptureOutput {
    fn process(&mut self, src: &Path, dest: &Path) -> anyhow::Result<()> {
        let output = run_to_completion(&self.args, src, dest)?;
        std::fs::write(dest, &output.stdout)
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(())
    }
}

/// Copies the source file to the destination.
pub fn copy_file(src: &Path, dest: &Path) -> anyhow::Result<()> {
    std::fs::copy(src, dest)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
    Ok(())
}

/// Hard-links the destination to the source, replacing an existing
/// destination. Fails if the two live on different filesystems.
pub fn hard_link(src: &Path, dest: &Path) -> anyhow::Result<()> {
    let file_name = dest
        .file_name()
        .with_context(|| format!("No file name in {}", dest.display()))?;
    let staging = dest.with_file_name(format!(".{}.link", file_name.to_string_lossy()));

    match std::fs::remove_file(&staging) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
            return Err(err).with_context(|| format!("Failed to remove {}", staging.display()));
        }
        _ => {}
    }
    std::fs::hard_link(src, &staging)
        .with_context(|| format!("Failed to link {} to {}", dest.display(), src.display()))?;
    if let Err(err) = std::fs::rename(&staging, dest) {
        let _ = std::fs::remove_file(&staging);
        return Err(err).with_context(|| format!("Failed to replace {}", dest.display()));
    }
    // rename is a no-op when both names already share an inode
    let _ = std::fs::remove_file(&staging);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_template() {
        assert_eq!(
            CommandArg::parse_all(["convert", "{in}", "-resize", "{out}"]),
            vec![
                CommandArg::Literal("convert".into()),
                CommandArg::Input,
                CommandArg::Literal("-resize".into()),
                CommandArg::Output,
            ]
        );
        assert_eq!(CommandArg::parse_template("{in}.bak"), CommandArg::Literal("{in}.bak".into()));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(matches!(RunCommand::new(vec![]), Err(ProcessError::EmptyCommand)));
        assert!(matches!(CaptureOutput::new(vec![]), Err(ProcessError::EmptyCommand)));
    }

    #[test]
    fn test_closure_is_a_processor() {
        let tmp = TempDir::new().unwrap();
        let mut calls = 0;
        let mut proc = |_: &Path, dest: &Path| -> anyhow::Result<()> {
            calls += 1;
            fs::write(dest, "x")?;
            Ok(())
        };
        proc.process(Path::new("/unused"), &tmp.path().join("out")).unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_copy_and_link() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.txt");
        fs::write(&src, "payload").unwrap();

        copy_file(&src, &tmp.path().join("copy.txt")).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("copy.txt")).unwrap(), "payload");

        hard_link(&src, &tmp.path().join("link.txt")).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("link.txt")).unwrap(), "payload");

        let other = tmp.path().join("other.txt");
        fs::write(&other, "replacement").unwrap();
        hard_link(&other, &tmp.path().join("link.txt")).unwrap();
        assert_eq!(fs::read_to_string(tmp.path().join("link.txt")).unwrap(), "replacement");
        assert!(!tmp.path().join(".link.txt.link").exists());

        assert!(hard_link(&tmp.path().join("none"), &tmp.path().join("link.txt")).is_err());
        assert_eq!(fs::read_to_string(tmp.path().join("link.txt")).unwrap(), "replacement");
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(copy_file(&tmp.path().join("none"), &tmp.path().join("out")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_substitutes_paths() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("in.txt");
        let dest = tmp.path().join("out.txt");
        fs::write(&src, "hello").unwrap();

        let mut cmd = RunCommand::new(CommandArg::parse_all(["cp", "{in}", "{out}"])).unwrap();
        cmd.process(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_nonzero_exit_fails() {
        let tmp = TempDir::new().unwrap();
        let mut cmd = RunCommand::new(CommandArg::parse_all(["sh", "-c", "echo boom >&2; exit 3"])).unwrap();
        let err = cmd.process(&tmp.path().join("a"), &tmp.path().join("b")).unwrap_err();

        match err.downcast_ref::<ProcessError>() {
            Some(ProcessError::CommandFailed { program, stderr, .. }) => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_program_is_a_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let mut cmd = RunCommand::new(vec!["tributary-no-such-program".into()]).unwrap();
        let err = cmd.process(&tmp.path().join("a"), &tmp.path().join("b")).unwrap_err();
        assert!(matches!(err.downcast_ref::<ProcessError>(), Some(ProcessError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_output_writes_stdout() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("in.txt");
        let dest = tmp.path().join("out.txt");
        fs::write(&src, "b\na\n").unwrap();

        let mut cmd = CaptureOutput::new(CommandArg::parse_all(["sort", "{in}"])).unwrap();
        cmd.process(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "a\nb\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_output_leaves_nothing_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("out.txt");

        let mut cmd = CaptureOutput::new(CommandArg::parse_all(["sh", "-c", "echo partial; exit 1"])).unwrap();
        assert!(cmd.process(&tmp.path().join("in"), &dest).is_err());
        assert!(!dest.exists());
    }
}
