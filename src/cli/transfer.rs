//! Transfer and stream listing commands.

// The progress line goes to stderr, outside the prompt session
#![allow(clippy::print_stderr)]

use super::interrupt::Interrupt;
use super::prompt::{InteractiveGate, Prompter, validate_stream_name};
use crate::client::EventLog;
use crate::config::ShuttleConfig;
use crate::services::{
    Direction, FixedGate, ProgressCallback, TransferEngine, TransferJob,
    TransferProgress, TransferReport,
};
use crate::{Error, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Parameters supplied on the command line; anything missing is asked for.
#[derive(Debug, Clone, Default)]
pub struct TransferArgs {
    /// Export or import.
    pub mode: Option<Direction>,
    /// Remote stream.
    pub stream: Option<String>,
    /// Local file.
    pub file: Option<PathBuf>,
    /// Append to a non-empty stream without asking.
    pub append: bool,
    /// Overwrite an existing export file without asking.
    pub overwrite: bool,
    /// Print a progress line to stderr.
    pub progress: bool,
}

/// Runs one export or import, prompting for missing parameters.
///
/// `interrupt` is armed once all questions are answered, so Ctrl-C quits
/// during prompts and cancels the transfer afterwards.
///
/// # Errors
///
/// Returns the error that aborted the transfer, or [`Error::InvalidInput`]
/// when a required answer could not be read.
pub fn cmd_transfer<L, R, W>(
    log: L,
    config: &ShuttleConfig,
    args: TransferArgs,
    prompter: &mut Prompter<R, W>,
    interrupt: &Interrupt,
) -> Result<TransferReport>
where
    L: EventLog,
    R: BufRead,
    W: Write,
{
    let direction = match args.mode {
        Some(direction) => direction,
        None => prompter.select_mode()?,
    };

    let stream = match args.stream {
        Some(stream) => {
            validate_stream_name(&stream)
                .map_err(|reason| Error::InvalidInput(format!("stream '{stream}': {reason}")))?;
            stream
        },
        None if direction == Direction::Export => {
            let streams = log.list_streams()?;
            let stream = prompter.pick_stream(&streams)?;
            prompter.say(&format!("Selected stream: {stream}"))?;
            stream
        },
        None => prompter.stream_name()?,
    };

    let path = prompter.file_path(args.file, direction, args.overwrite)?;
    let job = match direction {
        Direction::Export => TransferJob::export(&stream, &config.address, path),
        Direction::Import => TransferJob::import(&stream, &config.address, path),
    }?
    .with_page_size(config.page_size);

    interrupt.arm();
    let engine = TransferEngine::new(log)
        .with_prefetch(config.prefetch)
        .with_cancel_token(interrupt.token());
    let progress = args.progress.then(progress_printer);

    let result = match direction {
        Direction::Export => {
            if job.kind().is_archive() {
                prompter.say(&format!(
                    "Compressing into {}. This may take a while for large streams.",
                    job.path().display()
                ))?;
            }
            engine.export(job, progress)
        },
        Direction::Import if args.append => engine.import(job, &mut FixedGate(true), progress),
        Direction::Import => {
            let mut gate = InteractiveGate::new(prompter);
            engine.import(job, &mut gate, progress)
        },
    };
    if args.progress {
        eprintln!();
    }

    let report = result?;
    prompter.say(&summary(&report))?;
    Ok(report)
}

/// Prints the streams known to the service, one per line.
///
/// # Errors
///
/// Returns an error if the listing fails or the output cannot be written.
pub fn cmd_streams<L: EventLog, W: Write>(log: &L, out: &mut W) -> Result<usize> {
    let streams = log.list_streams()?;
    let written = if streams.is_empty() {
        writeln!(out, "No streams found.")
    } else {
        streams.iter().try_for_each(|stream| writeln!(out, "{stream}"))
    };
    written.map_err(|e| Error::operation("write_stdout", e))?;
    Ok(streams.len())
}

fn progress_printer() -> ProgressCallback {
    Box::new(|p: &TransferProgress| eprint!("{}", progress_line(p)))
}

/// Single carriage-returned progress line.
fn progress_line(p: &TransferProgress) -> String {
    match p.total {
        Some(total) => format!(
            "\r{}: {}/{total} events, {} bytes",
            p.direction, p.records, p.bytes
        ),
        None => format!("\r{}: {} events, {} bytes", p.direction, p.records, p.bytes),
    }
}

fn summary(report: &TransferReport) -> String {
    match report.direction {
        Direction::Export => format!(
            "Export completed: {} events from '{}' written to {}.",
            report.records,
            report.stream,
            report.path.display()
        ),
        Direction::Import if report.existing > 0 => format!(
            "Import completed: {} events from {} appended to '{}' after {} existing events.",
            report.records,
            report.path.display(),
            report.stream,
            report.existing
        ),
        Direction::Import => format!(
            "Import completed: {} events from {} written to '{}'.",
            report.records,
            report.path.display(),
            report.stream
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryEventLog;
    use crate::models::EventRecord;
    use crate::cli::InterruptAction;
    use crate::services::JobState;
    use serde_json::json;
    use std::io::Cursor;

    fn ticks(n: u64) -> Vec<EventRecord> {
        (0..n)
            .map(|i| EventRecord::from_json("Tick", &json!({ "i": i })).unwrap())
            .collect()
    }

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn test_export_with_picker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let log = InMemoryEventLog::new();
        log.seed("orders", ticks(3));
        log.seed("payments", ticks(1));

        let mut p = prompter(&format!("e\n1\n{}\n", path.display()));
        let report = cmd_transfer(
            &log,
            &ShuttleConfig::default(),
            TransferArgs::default(),
            &mut p,
            &Interrupt::new(),
        )
        .unwrap();

        assert_eq!(report.stream, "orders");
        assert_eq!(report.records, 3);
        let out = String::from_utf8(p.into_output()).unwrap();
        assert!(out.contains("Selected stream: orders"));
        assert!(out.contains("Export completed: 3 events"));
    }

    #[test]
    fn test_import_declined_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.json");
        std::fs::write(&path, "{\"event_number\":0,\"event_type\":\"A\",\"data\":{}}\n").unwrap();
        let log = InMemoryEventLog::new();
        log.seed("orders", ticks(2));

        let args = TransferArgs {
            mode: Some(Direction::Import),
            stream: Some("orders".to_string()),
            file: Some(path),
            ..TransferArgs::default()
        };
        let err = cmd_transfer(
            &log,
            &ShuttleConfig::default(),
            args,
            &mut prompter("n\n"),
            &Interrupt::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Blocked { existing: 2, .. }));
        assert_eq!(log.events("orders").len(), 2);
    }

    #[test]
    fn test_import_with_append_flag_skips_question() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.json");
        std::fs::write(&path, "{\"event_number\":0,\"event_type\":\"A\",\"data\":{}}\n").unwrap();
        let log = InMemoryEventLog::new();
        log.seed("orders", ticks(2));

        let args = TransferArgs {
            mode: Some(Direction::Import),
            stream: Some("orders".to_string()),
            file: Some(path),
            append: true,
            ..TransferArgs::default()
        };
        let report = cmd_transfer(
            &log,
            &ShuttleConfig::default(),
            args,
            &mut prompter(""),
            &Interrupt::new(),
        )
        .unwrap();
        assert_eq!(report.existing, 2);
        assert_eq!(log.events("orders").len(), 3);
    }

    #[test]
    fn test_stream_flag_is_validated() {
        let args = TransferArgs {
            mode: Some(Direction::Import),
            stream: Some("a/b".to_string()),
            ..TransferArgs::default()
        };
        let err = cmd_transfer(
            InMemoryEventLog::new(),
            &ShuttleConfig::default(),
            args,
            &mut prompter(""),
            &Interrupt::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_interrupt_armed_only_after_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let log = InMemoryEventLog::new();
        log.seed("orders", ticks(1));

        let interrupt = Interrupt::new();
        let err = cmd_transfer(
            &log,
            &ShuttleConfig::default(),
            TransferArgs::default(),
            &mut prompter("e\n"),
            &interrupt,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(interrupt.on_signal(), InterruptAction::Exit);

        let interrupt = Interrupt::new();
        let args = TransferArgs {
            mode: Some(Direction::Export),
            stream: Some("orders".to_string()),
            file: Some(dir.path().join("orders.json")),
            ..TransferArgs::default()
        };
        cmd_transfer(&log, &ShuttleConfig::default(), args, &mut prompter(""), &interrupt).unwrap();
        assert_eq!(interrupt.on_signal(), InterruptAction::Cancel);
    }

    #[test]
    fn test_cmd_streams() {
        let log = InMemoryEventLog::new();
        let mut out = Vec::new();
        assert_eq!(cmd_streams(&log, &mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "No streams found.\n");

        log.seed("orders", ticks(1));
        let mut out = Vec::new();
        assert_eq!(cmd_streams(&log, &mut out).unwrap(), 1);
        assert_eq!(String::from_utf8(out).unwrap(), "orders\n");
    }

    #[test]
    fn test_progress_line() {
        let mut p = TransferProgress {
            direction: Direction::Export,
            records: 2,
            bytes: 40,
            total: Some(5),
            state: JobState::Transferring,
        };
        assert_eq!(progress_line(&p), "\rexport: 2/5 events, 40 bytes");
        p.total = None;
        p.direction = Direction::Import;
        assert_eq!(progress_line(&p), "\rimport: 2 events, 40 bytes");
    }
}
