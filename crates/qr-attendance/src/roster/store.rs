//! CSV persistence for rosters.
//!
//! Rows are written back cell for cell with the line terminator the file
//! was read with, so saving an unmarked roster reproduces it byte for byte.
//!
//! Saves are atomic: the new content is written to a hidden sibling file,
//! fsynced, and renamed over the roster. A crash mid-save leaves either the
//! old roster or the new one on disk, never a truncated file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ColumnNames, LineEnding, Roster};
use crate::error::{Error, Result};

/// A roster file together with the column names used to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterStore {
    path: PathBuf,
    columns: ColumnNames,
}

impl RosterStore {
    /// Create a store for the roster at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, columns: ColumnNames) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    /// Path to the roster file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column names used when loading.
    #[must_use]
    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    /// Read the roster from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RosterRead`] if the file cannot be read or is not
    /// well-formed CSV, and the errors of [`Roster::from_rows`] otherwise.
    pub fn load(&self) -> Result<Roster> {
        load(&self.path, &self.columns)
    }

    /// Write the roster back to disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the roster cannot be written.
    pub fn save(&self, roster: &Roster) -> Result<()> {
        save(roster, &self.path)
    }
}

/// Read the roster at `path`.
///
/// # Errors
///
/// See [`RosterStore::load`].
pub fn load(path: impl AsRef<Path>, columns: &ColumnNames) -> Result<Roster> {
    let path = path.as_ref();
    let read_err = |source| Error::RosterRead {
        path: path.to_path_buf(),
        source,
    };

    debug!("Loading roster from {}", path.display());
    let bytes = fs::read(path).map_err(|e| read_err(csv::Error::from(e)))?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes.as_slice());

    let headers: Vec<String> = reader
        .headers()
        .map_err(read_err)?
        .iter()
        .map(str::to_owned)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(read_err)?;
        rows.push(record.iter().map(str::to_owned).collect());
    }

    let roster =
        Roster::from_rows(headers, rows, columns)?.with_line_ending(LineEnding::detect(&bytes));
    info!(
        "Loaded {} registrants from {}",
        roster.len(),
        path.display()
    );
    Ok(roster)
}

/// Write `roster` to `path`, replacing any existing file.
///
/// # Errors
///
/// See [`RosterStore::save`].
pub fn save(roster: &Roster, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = serialize(roster).map_err(|source| Error::persistence(path, source))?;
    write_atomic(path, &bytes).map_err(|source| Error::persistence(path, source))?;
    debug!("Saved {} registrants to {}", roster.len(), path.display());
    Ok(())
}

fn serialize(roster: &Roster) -> io::Result<Vec<u8>> {
    let terminator = match roster.line_ending() {
        LineEnding::Lf => csv::Terminator::Any(b'\n'),
        LineEnding::CrLf => csv::Terminator::CRLF,
    };
    let mut writer = csv::WriterBuilder::new()
        .terminator(terminator)
        .from_writer(Vec::new());

    writer.write_record(roster.headers())?;
    for record in roster.records() {
        writer.write_record(record.raw_row())?;
    }
    writer.into_inner().map_err(csv::IntoInnerError::into_error)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "roster path has no file name")
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    let result = File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM_EXPORT: &str = concat!(
        "Timestamp,Are you a VIT Student ?,Name,Reg. No.,Gender,",
        "University Mail ID,Contact No.,Batch,ATTENDANCE\n",
        "2025-02-20 01:00:00,Yes,Test Student,TEST001,Male,",
        "test@vitbhopal.ac.in,1234567890,2024,False\n",
        "2025-02-20 01:02:00,No,\"Rao, Priya\",EXT042,Female,",
        "priya@example.com,9876543210,2023,1\n",
    );

    fn write_roster(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("roster.csv");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_form_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), FORM_EXPORT);

        let roster = load(&path, &ColumnNames::default()).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.headers().len(), 9);

        let test = roster.find("TEST001").unwrap();
        assert_eq!(test.name(), "Test Student");
        assert_eq!(test.email(), "test@vitbhopal.ac.in");
        assert!(!test.attendance());

        let priya = roster.find("EXT042").unwrap();
        assert_eq!(priya.name(), "Rao, Priya");
        assert!(priya.attendance());
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), FORM_EXPORT);

        let roster = load(&path, &ColumnNames::default()).unwrap();
        save(&roster, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), FORM_EXPORT);
    }

    #[test]
    fn test_crlf_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let crlf = FORM_EXPORT.replace('\n', "\r\n");
        let path = write_roster(dir.path(), &crlf);

        let roster = load(&path, &ColumnNames::default()).unwrap();
        assert_eq!(roster.line_ending(), LineEnding::CrLf);
        save(&roster, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), crlf);
    }

    #[test]
    fn test_crlf_kept_when_marking() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), "Name,Reg. No.\r\nAsha,A1\r\nRavi,A2\r\n");

        let mut roster = load(&path, &ColumnNames::default()).unwrap();
        let pos = roster.position("A2").unwrap();
        roster.set_present(pos);
        save(&roster, &path).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "Name,Reg. No.,ATTENDANCE\r\nAsha,A1,False\r\nRavi,A2,True\r\n"
        );
    }

    #[test]
    fn test_round_trip_keeps_unknown_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), "Name,Reg. No.,T-Shirt\nAsha,A1,M\nRavi,A2,L\n");

        let roster = load(&path, &ColumnNames::default()).unwrap();
        save(&roster, &path).unwrap();

        let reloaded = load(&path, &ColumnNames::default()).unwrap();
        assert_eq!(
            reloaded.headers(),
            ["Name", "Reg. No.", "T-Shirt", "ATTENDANCE"]
        );
        assert_eq!(reloaded.find("A2").unwrap().raw_row(), ["Ravi", "A2", "L", "False"]);
        assert_eq!(reloaded, roster);
    }

    #[test]
    fn test_save_writes_marked_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), FORM_EXPORT);

        let mut roster = load(&path, &ColumnNames::default()).unwrap();
        let pos = roster.position("TEST001").unwrap();
        roster.set_present(pos);
        save(&roster, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("test@vitbhopal.ac.in,1234567890,2024,True\n"));
        // the untouched row keeps its original spelling
        assert!(content.contains("9876543210,2023,1\n"));
    }

    #[test]
    fn test_load_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), "Name,Reg. No.,ATTENDANCE\n");

        let roster = load(&path, &ColumnNames::default()).unwrap();
        assert!(roster.is_empty());
    }

    #[test]
    fn test_load_missing_key_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), "Name,Roll\nAsha,1\n");

        let err = load(&path, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }

    #[test]
    fn test_load_custom_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), "id,full_name,present\nA1,Asha,yes\n");
        let columns = ColumnNames {
            registration: "id".to_string(),
            name: "full_name".to_string(),
            email: "mail".to_string(),
            attendance: "present".to_string(),
        };

        let roster = load(&path, &columns).unwrap();
        let asha = roster.find("A1").unwrap();
        assert_eq!(asha.name(), "Asha");
        assert!(!asha.attendance());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = load("/nonexistent/roster.csv", &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, Error::RosterRead { .. }));
        assert!(err.to_string().contains("/nonexistent/roster.csv"));
    }

    #[test]
    fn test_load_ragged_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), "Name,Reg. No.\nAsha,A1,extra\n");

        let err = load(&path, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, Error::RosterRead { .. }));
    }

    #[test]
    fn test_save_to_missing_directory_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), FORM_EXPORT);
        let roster = load(&path, &ColumnNames::default()).unwrap();

        let err = save(&roster, dir.path().join("gone/roster.csv")).unwrap_err();
        assert!(err.is_persistence_error());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), FORM_EXPORT);
        let roster = load(&path, &ColumnNames::default()).unwrap();

        save(&roster, &path).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["roster.csv".to_string()]);
    }

    #[test]
    fn test_store_accessors() {
        let store = RosterStore::new("/srv/event/roster.csv", ColumnNames::default());
        assert_eq!(store.path(), Path::new("/srv/event/roster.csv"));
        assert_eq!(store.columns(), &ColumnNames::default());
    }

    #[test]
    fn test_store_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path(), FORM_EXPORT);
        let store = RosterStore::new(&path, ColumnNames::default());

        let roster = store.load().unwrap();
        store.save(&roster).unwrap();
        assert_eq!(store.load().unwrap(), roster);
    }
}
