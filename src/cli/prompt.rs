//! Interactive prompts.
//!
//! Every question loops until it gets a usable answer. Closed input ends the
//! loop with [`Error::InvalidInput`] so a piped run cannot spin forever.

use crate::io::ContainerKind;
use crate::services::{AppendGate, Direction};
use crate::{Error, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Line-oriented question/answer session over any reader and writer.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    /// Creates a prompter reading answers from `input` and writing questions
    /// to `output`.
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Writes one line of output.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be written.
    pub fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.output, "{line}").map_err(|e| Error::operation("write_stdout", e))
    }

    /// Asks `question` and returns the trimmed answer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the input is closed.
    pub fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{question}").map_err(|e| Error::operation("write_stdout", e))?;
        self.output
            .flush()
            .map_err(|e| Error::operation("flush_stdout", e))?;

        let mut answer = String::new();
        let read = self
            .input
            .read_line(&mut answer)
            .map_err(|e| Error::operation("read_stdin", e))?;
        if read == 0 {
            return Err(Error::InvalidInput(
                "input closed before an answer was given".to_string(),
            ));
        }
        Ok(answer.trim().to_string())
    }

    /// Asks a yes/no question; an empty answer takes `default`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the input is closed.
    pub fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "(Y/n)" } else { "(y/N)" };
        loop {
            let answer = self.ask(&format!("{question} {hint}: "))?;
            match answer.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Error: unknown response. Please enter 'y' for yes or 'n' for no.")?,
            }
        }
    }

    /// Asks for export or import.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the input is closed.
    pub fn select_mode(&mut self) -> Result<Direction> {
        let mut question = "Select mode, import (i) or export (e): ";
        loop {
            match self.ask(question)?.to_ascii_lowercase().as_str() {
                "i" | "import" => return Ok(Direction::Import),
                "e" | "export" => return Ok(Direction::Export),
                _ => question = "Error: unknown response. Enter 'i' for import or 'e' for export: ",
            }
        }
    }

    /// Lists `streams` and asks for one by number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when there is nothing to pick from or
    /// the input is closed.
    pub fn pick_stream(&mut self, streams: &[String]) -> Result<String> {
        if streams.is_empty() {
            return Err(Error::InvalidInput(
                "no streams are available; create one before exporting".to_string(),
            ));
        }
        self.say("Available streams:")?;
        for (index, stream) in streams.iter().enumerate() {
            self.say(&format!("{}. {stream}", index + 1))?;
        }

        let mut question = "Enter the number of the stream to export: ".to_string();
        loop {
            let answer = self.ask(&question)?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=streams.len()).contains(&n) => return Ok(streams[n - 1].clone()),
                _ => {
                    question = format!(
                        "Enter a number between 1 and {} to select a stream: ",
                        streams.len()
                    );
                },
            }
        }
    }

    /// Asks for the name of the stream to import into.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the input is closed.
    pub fn stream_name(&mut self) -> Result<String> {
        let mut question = "Enter the name of the stream to import to: ".to_string();
        loop {
            let answer = self.ask(&question)?;
            match validate_stream_name(&answer) {
                Ok(()) => return Ok(answer),
                Err(reason) => question = format!("Error: {reason}. Enter the stream name: "),
            }
        }
    }

    /// Resolves the local file, asking until it is usable for `direction`.
    ///
    /// - a name without extension is confirmed as raw JSON
    /// - an unsupported extension is asked again
    /// - an import file must exist
    /// - an existing export file must be confirmed for overwrite, unless
    ///   `overwrite` is set
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the input is closed.
    pub fn file_path(
        &mut self,
        initial: Option<PathBuf>,
        direction: Direction,
        overwrite: bool,
    ) -> Result<PathBuf> {
        let mut candidate = initial;
        loop {
            let path = match candidate.take() {
                Some(path) => path,
                None => PathBuf::from(self.ask("Enter the file name: ")?),
            };

            if path.as_os_str().is_empty() {
                self.say("Error: file name is blank.")?;
                continue;
            }
            if ContainerKind::lacks_extension(&path)
                && !self.confirm(
                    &format!(
                        "Warning: \"{}\" has no extension. Continue as a .json file?",
                        path.display()
                    ),
                    true,
                )?
            {
                continue;
            }
            if let Err(e) = ContainerKind::from_path(&path) {
                self.say(&format!(
                    "Error: {e}. Supported files end in .json, .zip or .tar.xz."
                ))?;
                continue;
            }

            match direction {
                Direction::Import if !path.is_file() => {
                    self.say(&format!("Error: {} does not exist.", path.display()))?;
                },
                Direction::Export if path.exists() && !overwrite => {
                    let question =
                        format!("Warning: {} already exists. Overwrite?", path.display());
                    if self.confirm(&question, true)? {
                        return Ok(path);
                    }
                },
                _ => return Ok(path),
            }
        }
    }

    /// Consumes the prompter, returning the output writer.
    pub fn into_output(self) -> W {
        self.output
    }
}

/// Checks a stream name typed or passed by the user.
///
/// # Errors
///
/// Returns the reason the name is unusable.
pub fn validate_stream_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.trim().is_empty() {
        Err("no stream specified")
    } else if name.contains('/') {
        Err("'/' is not allowed in stream names")
    } else {
        Ok(())
    }
}

/// Asks before appending to a non-empty stream.
pub struct InteractiveGate<'a, R, W> {
    prompter: &'a mut Prompter<R, W>,
}

impl<'a, R: BufRead, W: Write> InteractiveGate<'a, R, W> {
    /// Creates a gate asking through `prompter`.
    pub const fn new(prompter: &'a mut Prompter<R, W>) -> Self {
        Self { prompter }
    }
}

impl<R: BufRead, W: Write> AppendGate for InteractiveGate<'_, R, W> {
    fn confirm_append(&mut self, stream: &str, existing: u64) -> bool {
        let question =
            format!("Warning: stream '{stream}' already holds {existing} events. Append to it?");
        match self.prompter.confirm(&question, false) {
            Ok(answer) => answer,
            Err(e) => {
                tracing::debug!(error = %e, "Append confirmation not answered");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn transcript(p: Prompter<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8(p.into_output()).unwrap()
    }

    #[test]
    fn test_select_mode_retries_unknown_answers() {
        let mut p = prompter("x\nIMPORT\n");
        assert_eq!(p.select_mode().unwrap(), Direction::Import);
        assert!(transcript(p).contains("Error: unknown response"));

        assert_eq!(prompter("e\n").select_mode().unwrap(), Direction::Export);
    }

    #[test]
    fn test_closed_input_is_an_error() {
        let err = prompter("").select_mode().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_confirm_defaults() {
        assert!(prompter("\n").confirm("Go?", true).unwrap());
        assert!(!prompter("\n").confirm("Go?", false).unwrap());
        assert!(prompter("maybe\ny\n").confirm("Go?", false).unwrap());
    }

    #[test]
    fn test_pick_stream() {
        let streams = vec!["orders".to_string(), "payments".to_string()];
        let mut p = prompter("0\nthree\n2\n");
        assert_eq!(p.pick_stream(&streams).unwrap(), "payments");
        let out = transcript(p);
        assert!(out.contains("1. orders"));
        assert!(out.contains("between 1 and 2"));

        assert!(prompter("1\n").pick_stream(&[]).is_err());
    }

    #[test]
    fn test_stream_name_validation() {
        let mut p = prompter("\na/b\norders\n");
        assert_eq!(p.stream_name().unwrap(), "orders");
        let out = transcript(p);
        assert!(out.contains("no stream specified"));
        assert!(out.contains("'/' is not allowed"));
    }

    #[test]
    fn test_file_path_for_import_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("in.zip");
        std::fs::write(&existing, b"").unwrap();
        let missing = dir.path().join("missing.json");

        let mut p = prompter(&format!("{}\n", existing.display()));
        let path = p
            .file_path(Some(missing), Direction::Import, false)
            .unwrap();
        assert_eq!(path, existing);
        assert!(transcript(p).contains("does not exist"));
    }

    #[test]
    fn test_file_path_rejects_unsupported_extension() {
        let mut p = prompter("out.tar.xz\n");
        let path = p
            .file_path(Some(PathBuf::from("out.csv")), Direction::Export, false)
            .unwrap();
        assert_eq!(path, PathBuf::from("out.tar.xz"));
        assert!(transcript(p).contains("Supported files"));
    }

    #[test]
    fn test_file_path_without_extension() {
        let mut p = prompter("n\nout.zip\n");
        let path = p
            .file_path(Some(PathBuf::from("out")), Direction::Export, false)
            .unwrap();
        assert_eq!(path, PathBuf::from("out.zip"));

        let mut p = prompter("\n");
        let path = p
            .file_path(Some(PathBuf::from("out")), Direction::Export, false)
            .unwrap();
        assert_eq!(path, PathBuf::from("out"));
    }

    #[test]
    fn test_file_path_overwrite_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("out.json");
        std::fs::write(&existing, b"").unwrap();

        let mut p = prompter("n\nother.json\n");
        let path = p
            .file_path(Some(existing.clone()), Direction::Export, false)
            .unwrap();
        assert_eq!(path, PathBuf::from("other.json"));

        let mut p = prompter("");
        let path = p
            .file_path(Some(existing.clone()), Direction::Export, true)
            .unwrap();
        assert_eq!(path, existing);
    }

    #[test]
    fn test_interactive_gate() {
        let mut p = prompter("y\n");
        assert!(InteractiveGate::new(&mut p).confirm_append("orders", 3));
        assert!(transcript(p).contains("already holds 3 events"));

        let mut p = prompter("\n");
        assert!(!InteractiveGate::new(&mut p).confirm_append("orders", 3));

        let mut p = prompter("");
        assert!(!InteractiveGate::new(&mut p).confirm_append("orders", 3));
    }
}
