//! Container adapters for archives.
//!
//! Each container implements [`RecordSource`] and/or [`RecordSink`].

pub mod json;
pub mod tar_xz;
pub mod zipped;

use crate::{Error, Result};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::traits::{RecordSink, RecordSource};

/// Name of the single entry holding the records inside zip and tar archives.
pub const ARCHIVE_ENTRY: &str = "events.json";

/// On-disk packaging of the serialized record sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Plain NDJSON file.
    Raw,
    /// Zip archive with one deflated entry.
    Zip,
    /// Tar archive compressed with xz.
    TarXz,
}

impl ContainerKind {
    /// Returns the file extension for this container.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Raw => "json",
            Self::Zip => "zip",
            Self::TarXz => "tar.xz",
        }
    }

    /// Whether records are packed into a compressed archive.
    #[must_use]
    pub const fn is_archive(&self) -> bool {
        !matches!(self, Self::Raw)
    }

    /// Detects the container kind from the file name.
    ///
    /// A name without any extension is treated as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let unsupported = || Error::UnsupportedFormat {
            path: path.display().to_string(),
        };
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_lowercase)
            .ok_or_else(unsupported)?;

        if name.ends_with(".tar.xz") {
            Ok(Self::TarXz)
        } else if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else if name.ends_with(".json") || Path::new(&name).extension().is_none() {
            Ok(Self::Raw)
        } else {
            Err(unsupported())
        }
    }

    /// Returns whether the file name carries no extension at all.
    #[must_use]
    pub fn lacks_extension(path: &Path) -> bool {
        path.file_name().is_some() && path.extension().is_none()
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Opens a lazy record source over the file at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the container is corrupt.
pub fn open_reader(path: &Path, kind: ContainerKind) -> Result<Box<dyn RecordSource>> {
    match kind {
        ContainerKind::Raw => {
            let file = File::open(path).map_err(|e| open_error(path, &e))?;
            Ok(Box::new(json::JsonRecordSource::new(
                BufReader::new(file),
                path.display().to_string(),
            )))
        },
        ContainerKind::Zip => zipped::open_source(path),
        ContainerKind::TarXz => tar_xz::open_source(path),
    }
}

/// Creates (or truncates) the file at `path` and opens a record sink on it.
///
/// # Errors
///
/// Returns an error if the file cannot be created.
pub fn open_writer(path: &Path, kind: ContainerKind) -> Result<Box<dyn RecordSink>> {
    match kind {
        ContainerKind::Raw => {
            let file = File::create(path).map_err(|e| create_error(path, &e))?;
            Ok(Box::new(json::JsonRecordSink::new(io::BufWriter::new(
                file,
            ))))
        },
        ContainerKind::Zip => Ok(Box::new(zipped::ZipRecordSink::create(path)?)),
        ContainerKind::TarXz => Ok(Box::new(tar_xz::TarXzRecordSink::create(path)?)),
    }
}

/// Role an archive member plays when looking for the record document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryRole {
    /// The canonical `events.json` entry.
    Primary,
    /// Some other `.json` file, usable if it is the only one.
    Candidate,
    /// Anything else.
    Ignored,
}

fn entry_role(name: &str) -> EntryRole {
    if name.ends_with('/') {
        return EntryRole::Ignored;
    }
    let file_name = name.rsplit('/').next().unwrap_or(name);
    if file_name.eq_ignore_ascii_case(ARCHIVE_ENTRY) {
        EntryRole::Primary
    } else if file_name.to_ascii_lowercase().ends_with(".json") {
        EntryRole::Candidate
    } else {
        EntryRole::Ignored
    }
}

/// Picks the member holding the records from a list of archive entry names.
///
/// `events.json` wins; otherwise exactly one `.json` entry must exist.
fn choose_entry<'a>(path: &Path, names: impl IntoIterator<Item = &'a str>) -> Result<String> {
    let mut candidates = Vec::new();
    for name in names {
        match entry_role(name) {
            EntryRole::Primary => return Ok(name.to_string()),
            EntryRole::Candidate => candidates.push(name.to_string()),
            EntryRole::Ignored => {},
        }
    }
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(no_entry_error(path)),
        n => Err(multiple_entries_error(path, n)),
    }
}

fn no_entry_error(path: &Path) -> Error {
    Error::CorruptArchive {
        path: path.display().to_string(),
        cause: format!("no {ARCHIVE_ENTRY} or other .json entry in archive"),
    }
}

fn multiple_entries_error(path: &Path, count: usize) -> Error {
    Error::CorruptArchive {
        path: path.display().to_string(),
        cause: format!("{count} .json entries and no {ARCHIVE_ENTRY}; expected a single document"),
    }
}

/// Copies an archive member into an anonymous temp file and rewinds it.
///
/// Keeps memory bounded while letting the member be read independently of
/// the archive it came from.
fn spool_entry<R: Read>(path: &Path, entry: &mut R) -> Result<File> {
    let mut spool = tempfile::tempfile().map_err(|e| Error::operation("create_spool_file", e))?;
    io::copy(entry, &mut spool).map_err(|e| corrupt(path, &e))?;
    spool
        .seek(SeekFrom::Start(0))
        .map_err(|e| Error::operation("rewind_spool_file", e))?;
    Ok(spool)
}

fn corrupt(path: &Path, cause: &dyn std::fmt::Display) -> Error {
    Error::CorruptArchive {
        path: path.display().to_string(),
        cause: cause.to_string(),
    }
}

fn open_error(path: &Path, e: &io::Error) -> Error {
    Error::OperationFailed {
        operation: "open_import_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}

fn create_error(path: &Path, e: &io::Error) -> Error {
    Error::OperationFailed {
        operation: "create_export_file".to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("orders.json", ContainerKind::Raw ; "json")]
    #[test_case("ORDERS.JSON", ContainerKind::Raw ; "upper case json")]
    #[test_case("orders", ContainerKind::Raw ; "no extension")]
    #[test_case("orders.zip", ContainerKind::Zip ; "zip")]
    #[test_case("backup/orders.tar.xz", ContainerKind::TarXz ; "tar xz")]
    #[test_case("orders.v2.tar.xz", ContainerKind::TarXz ; "dotted tar xz")]
    fn test_kind_from_path(name: &str, expected: ContainerKind) {
        assert_eq!(ContainerKind::from_path(Path::new(name)).unwrap(), expected);
    }

    #[test_case("orders.csv" ; "csv")]
    #[test_case("orders.tar.gz" ; "tar gz")]
    #[test_case("orders.xz" ; "bare xz")]
    fn test_kind_from_path_unsupported(name: &str) {
        let err = ContainerKind::from_path(Path::new(name)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_lacks_extension() {
        assert!(ContainerKind::lacks_extension(Path::new("orders")));
        assert!(!ContainerKind::lacks_extension(Path::new("orders.json")));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ContainerKind::TarXz.to_string(), "tar.xz");
        assert!(ContainerKind::Zip.is_archive());
        assert!(!ContainerKind::Raw.is_archive());
    }

    #[test]
    fn test_choose_entry_prefers_events_json() {
        let path = Path::new("a.zip");
        let chosen = choose_entry(path, ["notes.json", "data/events.json"]).unwrap();
        assert_eq!(chosen, "data/events.json");
    }

    #[test]
    fn test_choose_entry_single_candidate() {
        let path = Path::new("a.zip");
        let chosen = choose_entry(path, ["README.md", "export.json", "dir/"]).unwrap();
        assert_eq!(chosen, "export.json");
    }

    #[test]
    fn test_choose_entry_rejects_ambiguous_or_empty() {
        let path = Path::new("a.zip");
        let err = choose_entry(path, ["a.json", "b.json"]).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }));

        let err = choose_entry(path, ["README.md"]).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }));
    }
}
