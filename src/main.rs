//! Binary entry point for eventshuttle.
//!
//! Exports event streams to local files and imports them back.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand, ValueEnum};
use eventshuttle::cli::{
    INTERRUPTED_EXIT_CODE, Interrupt, InterruptAction, Prompter, TransferArgs, cmd_streams,
    cmd_transfer,
};
use eventshuttle::observability::{self, LoggingConfig};
use eventshuttle::{Direction, HttpEventLog, ShuttleConfig};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

/// Eventshuttle - move event streams between an event store and local files.
#[derive(Parser)]
#[command(name = "eventshuttle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Transfer direction; asked for when omitted.
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Stream to export from or import into.
    #[arg(short, long)]
    stream: Option<String>,

    /// Event store address.
    #[arg(short, long)]
    address: Option<String>,

    /// Local file (.json, .zip or .tar.xz).
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Events requested per page.
    #[arg(long)]
    page_size: Option<usize>,

    /// Append to a stream that already holds events without asking.
    #[arg(long)]
    append: bool,

    /// Overwrite an existing export file without asking.
    #[arg(long)]
    overwrite: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List the streams known to the event store.
    Streams,
}

/// Transfer direction as accepted on the command line.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Event store to file.
    Export,
    /// File to event store.
    Import,
}

impl From<Mode> for Direction {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Export => Self::Export,
            Mode::Import => Self::Import,
        }
    }
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig {
        format: config.logging.format,
        file: config.logging.file.clone(),
        verbose: cli.verbose,
    };
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Run failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Loads file and environment configuration, then applies flags.
fn load_config(cli: &Cli) -> eventshuttle::Result<ShuttleConfig> {
    let mut config = ShuttleConfig::load(cli.config.as_deref())?;
    if let Some(address) = &cli.address {
        config.address.clone_from(address);
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size.max(1);
    }
    Ok(config)
}

/// Runs the selected command.
fn run(cli: Cli, config: &ShuttleConfig) -> eventshuttle::Result<()> {
    let interrupt = Interrupt::new();
    install_interrupt_handler(interrupt.clone());

    let log = HttpEventLog::new(&config.address, &config.client_settings())?;
    tracing::debug!(address = %log.base_url(), page_size = config.page_size, "Using event store");

    if matches!(cli.command, Some(Commands::Streams)) {
        let mut stdout = io::stdout().lock();
        cmd_streams(&log, &mut stdout)?;
        return Ok(());
    }

    let args = TransferArgs {
        mode: cli.mode.map(Direction::from),
        stream: cli.stream,
        file: cli.file,
        append: cli.append,
        overwrite: cli.overwrite,
        progress: io::stderr().is_terminal(),
    };
    let mut prompter = Prompter::new(io::stdin().lock(), io::stdout());
    cmd_transfer(log, config, args, &mut prompter, &interrupt)?;
    Ok(())
}

/// Quits on Ctrl-C until the transfer starts, then cancels it; a second
/// Ctrl-C quits.
fn install_interrupt_handler(interrupt: Interrupt) {
    let installed = ctrlc::set_handler(move || match interrupt.on_signal() {
        InterruptAction::Exit => std::process::exit(INTERRUPTED_EXIT_CODE),
        InterruptAction::Cancel => {
            eprintln!("\nStopping after the current event. Press Ctrl-C again to quit.");
        },
    });
    if let Err(e) = installed {
        tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
    }
}
