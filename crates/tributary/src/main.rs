//! Tributary command-line interface
//!
//! ```text
//! tributary run SOURCE DEST [--ext .csv] [--flatten] [-- convert {in} {out}]
//! tributary status DEST
//! ```

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tributary_logging::{init_logging, LogConfig};

/// Exit status when a run finished but some inputs failed.
const EXIT_FAILURES: u8 = 1;
/// Exit status when the command could not run at all.
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "tributary",
    version,
    about = "Incrementally derive output files from a source tree"
)]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process new and changed inputs into the destination tree
    Run(cli::run::RunArgs),

    /// Show what the provenance ledger of a destination knows
    Status {
        /// Destination tree
        dest: PathBuf,

        /// Show the record for this output (relative to DEST)
        #[arg(long)]
        output: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn command_wants_json(command: &Commands) -> bool {
    match command {
        Commands::Run(args) => args.json,
        Commands::Status { json, .. } => *json,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = command_wants_json(&cli.command);

    let log_dir = match &cli.command {
        Commands::Run(args) => args.log_dir(),
        Commands::Status { .. } => None,
    };
    if let Err(err) = init_logging(LogConfig {
        app_name: "tributary",
        verbose: cli.verbose,
        log_dir,
    }) {
        eprintln!("Warning: {:#}", err);
    }

    let result = match cli.command {
        Commands::Run(args) => cli::run::run(args).map(|failed| {
            if failed {
                ExitCode::from(EXIT_FAILURES)
            } else {
                ExitCode::SUCCESS
            }
        }),
        Commands::Status { dest, output, json } => {
            cli::status::run(cli::status::StatusArgs { dest, output, json }).map(|()| ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            if json_mode {
                cli::error::print_json_error(&err);
            } else {
                eprintln!("{:?}", err);
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}
