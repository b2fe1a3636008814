use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use modweave_index::{aggregate, render_index};
use modweave_transcript::{parse_transcript, ParseError, Transcript};

use modweave_driver::{
    default_final_args, run_transcript, CommandFactory, DriverError,
    IndexProcessorFactory, ModuleGraph, RunConfig, UnitFactory, WORK_DIR_ENV,
};

/// Environment variable holding the log filter
const LOG_ENV: &str = "MODWEAVE_LOG";

#[derive(Parser)]
#[command(
    name = "modweave",
    version = "0.1.0",
    about = "Build multi-module transcripts in dependency waves and verify their output",
    long_about = "Builds every module of an annotated transcript in dependency order,\n\
                  passes entry-point arguments to the final wave only, and compares\n\
                  the generated files against the transcript's expected region."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and verify one or more transcripts
    Run {
        /// Transcript files
        #[arg(required = true)]
        transcripts: Vec<PathBuf>,

        /// How modules are compiled
        #[arg(long, default_value = "processor")]
        backend: Backend,

        /// Program run for each module by the command backend
        #[arg(long)]
        command: Option<String>,

        /// Extra argument for the command backend (repeatable)
        #[arg(long = "command-arg", allow_hyphen_values = true)]
        command_args: Vec<String>,

        /// Final-wave argument (repeatable); replaces the default `index.main=true`
        #[arg(long = "final-arg", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        final_args: Vec<(String, String)>,

        /// Directory receiving module sources and outputs
        #[arg(long, env = WORK_DIR_ENV)]
        work_dir: Option<PathBuf>,

        /// Keep the temporary work directory
        #[arg(long)]
        keep: bool,

        /// Enable verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the wave plan of a transcript without compiling
    Plan {
        /// Transcript file
        transcript: PathBuf,
    },

    /// Print the index artifact for a set of element names
    Index {
        /// Element names, in any order
        names: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// Run the library index processor in-process
    Processor,
    /// Run an external program per module
    Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            transcripts,
            backend,
            command,
            command_args,
            final_args,
            work_dir,
            keep,
            verbose,
        } => {
            init_logging(verbose);
            let factory: Box<dyn UnitFactory> = match (backend, command) {
                (Backend::Command, Some(program)) => Box::new(CommandFactory {
                    program,
                    args: command_args,
                }),
                (Backend::Command, None) => {
                    eprintln!("error: --backend command needs --command");
                    return ExitCode::FAILURE;
                }
                (Backend::Processor, _) => Box::new(IndexProcessorFactory),
            };
            let config = RunConfig {
                final_args: if final_args.is_empty() {
                    default_final_args()
                } else {
                    final_args.into_iter().collect()
                },
                work_dir,
                keep_outputs: keep,
            };
            run_command(&transcripts, &config, factory.as_ref())
        }
        Commands::Plan { transcript } => {
            init_logging(false);
            plan_command(&transcript)
        }
        Commands::Index { names } => index_command(&names),
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

fn run_command(transcripts: &[PathBuf], config: &RunConfig, factory: &dyn UnitFactory) -> ExitCode {
    let mut failed = 0usize;

    for path in transcripts {
        let Some(transcript) = load(path) else {
            failed += 1;
            continue;
        };

        match run_transcript(&transcript, config, factory) {
            Ok(report) if report.is_success() => {
                println!(
                    "PASS {} ({} modules, {} waves, {} files)",
                    path.display(),
                    report.build.build_order().count(),
                    report.build.waves.len(),
                    report.verification.matched
                );
            }
            Ok(report) => {
                failed += 1;
                println!(
                    "FAIL {} ({} mismatches)",
                    path.display(),
                    report.verification.mismatches.len()
                );
                for mismatch in &report.verification.mismatches {
                    eprintln!("  {}", mismatch.to_string().replace('\n', "\n    "));
                }
            }
            Err(err) => {
                failed += 1;
                println!("FAIL {}", path.display());
                eprintln!("error: {}", err);
            }
        }
    }

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn plan_command(path: &Path) -> ExitCode {
    let Some(transcript) = load(path) else {
        return ExitCode::FAILURE;
    };

    // Units are only inspected, never compiled, so nothing lands in this directory
    let scratch = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: failed to create scratch directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut graph = ModuleGraph::new();
    for record in transcript.source.modules() {
        let unit = IndexProcessorFactory.create(record, &scratch.path().join(&record.name));
        if let Err(e) = graph.add_unit(unit) {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    match graph.plan() {
        Ok(waves) => {
            for (idx, wave) in waves.iter().enumerate() {
                let marker = if wave.is_final { " (final)" } else { "" };
                println!("wave {}{}: {}", idx + 1, marker, wave.modules.join(", "));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn index_command(names: &[String]) -> ExitCode {
    if let Some(artifact) = aggregate(names, |n| n.clone()) {
        print!("{}", render_index(&artifact));
    }
    ExitCode::SUCCESS
}

/// Read and parse a transcript, reporting failures on stderr
fn load(path: &Path) -> Option<Transcript> {
    let source = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(source) => {
            let err = DriverError::Read {
                path: path.to_path_buf(),
                source,
            };
            eprintln!("error: {}", err);
            return None;
        }
    };

    match parse_transcript(&source) {
        Ok(transcript) => Some(transcript),
        Err(err) => {
            report_parse_error(&err, &path.display().to_string(), &source);
            None
        }
    }
}

fn report_parse_error(err: &ParseError, filename: &str, source: &str) {
    let span = (filename, err.span.start..err.span.end);
    let _ = Report::build(ReportKind::Error, span.clone())
        .with_code("T001")
        .with_message("malformed transcript")
        .with_label(
            Label::new(span)
                .with_message(err.kind.to_string())
                .with_color(Color::Red),
        )
        .finish()
        .eprint((filename, Source::from(source)));
}
