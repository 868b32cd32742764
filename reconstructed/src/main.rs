//! Command-line front end: load a source and an inventory, run the program
//! for every host and write the resulting inventory.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use reconstructed::core::types::{RunOnceScope, RunOptions, Strictness};
use reconstructed::driver::{RunReport, run_program};
use reconstructed::exit_codes;
use reconstructed::io::inventory::{load_inventory, write_inventory};
use reconstructed::io::source::load_source;
use reconstructed::io::template::JinjaTemplar;
use reconstructed::logging;
use reconstructed::program::Program;

#[derive(Parser)]
#[command(
    name = "reconstructed",
    version,
    about = "Run declarative instruction programs against a host inventory"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the source's program for every host of the inventory.
    Run {
        /// Source file (.yml, .yaml, .json or .toml).
        source: PathBuf,
        /// Inventory JSON document to start from.
        #[arg(short, long)]
        inventory: PathBuf,
        /// Write the resulting inventory here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Override the source's strictness.
        #[arg(long, value_enum)]
        strictness: Option<Strictness>,
        /// Override the source's run_once scope.
        #[arg(long, value_enum)]
        run_once: Option<RunOnceScope>,
        /// Make `lookup()` unavailable in templates.
        #[arg(long)]
        no_lookups: bool,
    },
    /// Parse a source and print its program.
    Check {
        /// Source file (.yml, .yaml, .json or .toml).
        source: PathBuf,
    },
}

/// Outcome of a command that loaded and ran successfully.
enum Finished {
    Ok,
    Aborted,
    HostFailures,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli.command) {
        Ok(Finished::Ok) => exit_codes::OK,
        Ok(Finished::Aborted) => exit_codes::ABORTED,
        Ok(Finished::HostFailures) => exit_codes::HOST_FAILURES,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run(command: Command) -> Result<Finished> {
    match command {
        Command::Run {
            source,
            inventory,
            output,
            strictness,
            run_once,
            no_lookups,
        } => cmd_run(RunArgs {
            source: &source,
            inventory: &inventory,
            output: output.as_deref(),
            strictness,
            run_once,
            no_lookups,
        }),
        Command::Check { source } => cmd_check(&source),
    }
}

struct RunArgs<'a> {
    source: &'a Path,
    inventory: &'a Path,
    output: Option<&'a Path>,
    strictness: Option<Strictness>,
    run_once: Option<RunOnceScope>,
    no_lookups: bool,
}

fn cmd_run(args: RunArgs<'_>) -> Result<Finished> {
    let source = load_source(args.source)?;
    let options = RunOptions {
        strictness: args.strictness.unwrap_or(source.strictness),
        run_once: args.run_once.unwrap_or(source.run_once),
    };
    let templar = if args.no_lookups {
        JinjaTemplar::without_lookups()
    } else {
        JinjaTemplar::new()
    };
    let program = Program::parse(&source.instructions, &templar)
        .with_context(|| format!("parse program {}", args.source.display()))?;
    let mut inventory = load_inventory(args.inventory)?;
    info!(
        instructions = program.len(),
        hosts = inventory.hosts.len(),
        ?options,
        "starting run"
    );

    let finished = match run_program(&program, &mut inventory, &templar, options) {
        Ok(report) => {
            eprintln!("{}", summary(&report));
            if report.has_failures() {
                Finished::HostFailures
            } else {
                Finished::Ok
            }
        }
        Err(failure) => {
            eprintln!("run aborted: {failure}");
            Finished::Aborted
        }
    };

    match args.output {
        Some(path) => write_inventory(path, &inventory)?,
        None => {
            let payload =
                serde_json::to_string_pretty(&inventory).context("serialize inventory")?;
            println!("{payload}");
        }
    }
    Ok(finished)
}

fn cmd_check(path: &Path) -> Result<Finished> {
    let source = load_source(path)?;
    let templar = JinjaTemplar::new();
    let program = Program::parse(&source.instructions, &templar)
        .with_context(|| format!("parse program {}", path.display()))?;
    if !program.is_empty() {
        println!("{}", program.dump());
    }
    Ok(Finished::Ok)
}

fn summary(report: &RunReport) -> String {
    let mut line = format!(
        "{} hosts: {} completed ({} stopped), {} failed",
        report.hosts(),
        report.completed.len(),
        report.stopped.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        line.push_str(&format!("\n  {failure}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconstructed::core::error::RuntimeError;
    use reconstructed::driver::HostFailure;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "reconstructed",
            "-vv",
            "run",
            "source.yml",
            "--inventory",
            "inv.json",
            "--strictness",
            "full",
            "--run-once",
            "host",
            "--no-lookups",
        ])
        .expect("parse");
        assert_eq!(cli.verbose, 2);
        let Command::Run {
            source,
            inventory,
            output,
            strictness,
            run_once,
            no_lookups,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(source, PathBuf::from("source.yml"));
        assert_eq!(inventory, PathBuf::from("inv.json"));
        assert_eq!(output, None);
        assert_eq!(strictness, Some(Strictness::Full));
        assert_eq!(run_once, Some(RunOnceScope::Host));
        assert!(no_lookups);
    }

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["reconstructed", "check", "source.yml"]).expect("parse");
        assert!(matches!(cli.command, Command::Check { .. }));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn run_requires_inventory() {
        assert!(Cli::try_parse_from(["reconstructed", "run", "source.yml"]).is_err());
    }

    #[test]
    fn summary_lists_failures() {
        let report = RunReport {
            completed: vec!["a".to_string()],
            stopped: Vec::new(),
            failures: vec![HostFailure {
                host: "b".to_string(),
                error: RuntimeError::Failed("boom".to_string()),
            }],
        };
        assert_eq!(
            summary(&report),
            "2 hosts: 1 completed (0 stopped), 1 failed\n  error on host b: boom"
        );
    }
}
