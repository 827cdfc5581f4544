//! The check-in desk: one roster, one writer.
//!
//! A [`Desk`] owns the in-memory roster behind a mutex and, unless opened
//! read-only, an exclusive lock on the roster file. Every mark runs
//! look-up, update and save inside one critical section, so concurrent scans
//! in this process cannot lose updates and other processes cannot open the
//! same roster for writing.
//!
//! Session bookkeeping (how many people were checked in, when the last one
//! was) belongs to the caller and is passed in as a [`ScanSession`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local};
use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::marker::{self, MarkOutcome};
use crate::roster::{AttendanceSummary, Roster, RosterLock, RosterRecord, RosterStore};
use crate::scanner::{QrScanner, ScanResult};

/// Per-operator session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSession {
    /// Number of successful check-ins.
    pub scan_count: u64,
    /// Time of the last successful check-in.
    pub last_scan: Option<DateTime<Local>>,
}

impl ScanSession {
    /// A fresh session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful check-in at `at`.
    pub fn record_success(&mut self, at: DateTime<Local>) {
        self.scan_count += 1;
        self.last_scan = Some(at);
    }

    fn observe(&mut self, outcome: &MarkOutcome) {
        if outcome.success {
            self.record_success(Local::now());
        }
    }
}

/// Result of checking someone in from an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckIn {
    /// What the scanner read.
    pub scan: ScanResult,
    /// What the marker did, if a payload was read.
    pub outcome: Option<MarkOutcome>,
}

impl CheckIn {
    /// Whether attendance was newly recorded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.outcome.as_ref().is_some_and(|o| o.success)
    }

    /// The message to show the operator.
    #[must_use]
    pub fn message(&self) -> &str {
        match (&self.outcome, &self.scan.error) {
            (Some(outcome), _) => &outcome.message,
            (None, Some(error)) => error,
            (None, None) => "",
        }
    }
}

/// Process-wide owner of a roster.
#[derive(Debug)]
pub struct Desk {
    store: RosterStore,
    roster: Mutex<Roster>,
    scanner: QrScanner,
    lock: Option<RosterLock>,
}

impl Desk {
    /// Lock the roster file and load it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RosterLocked`] if another process has the roster
    /// open, or any load error.
    pub fn open(store: RosterStore) -> Result<Self> {
        let lock = RosterLock::acquire(store.path())?;
        Self::build(store, Some(lock))
    }

    /// Load the roster without taking the file lock.
    ///
    /// Meant for read-only views such as statistics. Marking through an
    /// unlocked desk is still serialized within this process.
    ///
    /// # Errors
    ///
    /// Returns any load error.
    pub fn open_unlocked(store: RosterStore) -> Result<Self> {
        Self::build(store, None)
    }

    /// Open the roster described by `config`, honoring `roster.lock`.
    ///
    /// # Errors
    ///
    /// See [`Desk::open`].
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = RosterStore::new(config.roster_path(), config.columns.clone());
        if config.roster.lock {
            Self::open(store)
        } else {
            Self::open_unlocked(store)
        }
    }

    fn build(store: RosterStore, lock: Option<RosterLock>) -> Result<Self> {
        let roster = store.load()?;
        info!(
            "Desk open for {} ({} registrants{})",
            store.path().display(),
            roster.len(),
            if lock.is_some() { ", locked" } else { "" }
        );
        Ok(Self {
            store,
            roster: Mutex::new(roster),
            scanner: QrScanner::default(),
            lock,
        })
    }

    /// Replace the QR scanner.
    #[must_use]
    pub fn with_scanner(mut self, scanner: QrScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &RosterStore {
        &self.store
    }

    /// Whether this desk holds the roster file lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Mark a registration number present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the roster cannot be saved.
    pub fn mark(
        &self,
        session: &mut ScanSession,
        registration_number: &str,
    ) -> Result<MarkOutcome> {
        let outcome = {
            let mut roster = self.roster()?;
            marker::mark(&mut roster, &self.store, registration_number)?
        };
        session.observe(&outcome);
        Ok(outcome)
    }

    /// Decode `image` and mark whatever registration number it holds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the roster cannot be saved. Decode
    /// failures are reported in the returned [`CheckIn`].
    pub fn check_in_image(
        &self,
        session: &mut ScanSession,
        image: &DynamicImage,
    ) -> Result<CheckIn> {
        self.check_in(session, self.scanner.decode(image))
    }

    /// Like [`Desk::check_in_image`] for an encoded image in memory.
    ///
    /// # Errors
    ///
    /// See [`Desk::check_in_image`].
    pub fn check_in_bytes(&self, session: &mut ScanSession, bytes: &[u8]) -> Result<CheckIn> {
        self.check_in(session, self.scanner.decode_bytes(bytes))
    }

    /// Like [`Desk::check_in_image`] for an image file.
    ///
    /// # Errors
    ///
    /// See [`Desk::check_in_image`].
    pub fn check_in_file(
        &self,
        session: &mut ScanSession,
        path: impl AsRef<Path>,
    ) -> Result<CheckIn> {
        self.check_in(session, self.scanner.decode_file(path))
    }

    fn check_in(&self, session: &mut ScanSession, scan: ScanResult) -> Result<CheckIn> {
        let outcome = match &scan.payload {
            Some(payload) => Some(self.mark(session, payload)?),
            None => {
                debug!("Nothing to mark: {:?}", scan.error);
                None
            }
        };
        Ok(CheckIn { scan, outcome })
    }

    /// Present/absent counts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the roster mutex is poisoned.
    pub fn summary(&self) -> Result<AttendanceSummary> {
        Ok(self.roster()?.summary())
    }

    /// A snapshot of every registrant in file order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the roster mutex is poisoned.
    pub fn records(&self) -> Result<Vec<RosterRecord>> {
        Ok(self.roster()?.records().to_vec())
    }

    /// Look up one registrant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the roster mutex is poisoned.
    pub fn find(&self, registration_number: &str) -> Result<Option<RosterRecord>> {
        Ok(self.roster()?.find(registration_number).cloned())
    }

    fn roster(&self) -> Result<MutexGuard<'_, Roster>> {
        self.roster
            .lock()
            .map_err(|_| Error::internal("roster mutex poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;

    use super::*;
    use crate::roster::ColumnNames;
    use crate::scanner::{Detection, QrDetector, NO_CODE_FOUND};

    const ROSTER: &str = "\
Name,Reg. No.,University Mail ID
Test Student,TEST001,test@vitbhopal.ac.in
Ravi Kumar,TEST002,ravi@vitbhopal.ac.in
";

    struct Payload(&'static str);

    impl QrDetector for Payload {
        fn detect(&self, _image: &image::GrayImage) -> Vec<Detection> {
            vec![Detection::Decoded(self.0.to_string())]
        }
    }

    struct Nothing;

    impl QrDetector for Nothing {
        fn detect(&self, _image: &image::GrayImage) -> Vec<Detection> {
            Vec::new()
        }
    }

    fn write_roster(dir: &Path) -> PathBuf {
        let path = dir.join("roster.csv");
        fs::write(&path, ROSTER).unwrap();
        path
    }

    fn roster_store(dir: &Path) -> RosterStore {
        RosterStore::new(write_roster(dir), ColumnNames::default())
    }

    fn blank() -> DynamicImage {
        DynamicImage::ImageLuma8(image::GrayImage::new(8, 8))
    }

    #[test]
    fn test_session_default() {
        let session = ScanSession::new();
        assert_eq!(session.scan_count, 0);
        assert!(session.last_scan.is_none());
    }

    #[test]
    fn test_session_record_success() {
        let mut session = ScanSession::new();
        let at = Local.with_ymd_and_hms(2025, 2, 20, 18, 30, 0).unwrap();
        session.record_success(at);
        session.record_success(at);
        assert_eq!(session.scan_count, 2);
        assert_eq!(session.last_scan, Some(at));
    }

    #[test]
    fn test_open_locks_roster() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path());

        let desk = Desk::open(RosterStore::new(&path, ColumnNames::default())).unwrap();
        assert!(desk.is_locked());

        let err = Desk::open(RosterStore::new(&path, ColumnNames::default())).unwrap_err();
        assert!(err.is_locked());

        drop(desk);
        assert!(Desk::open(RosterStore::new(&path, ColumnNames::default())).is_ok());
    }

    #[test]
    fn test_open_unlocked_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path());

        let _writer = Desk::open(RosterStore::new(&path, ColumnNames::default())).unwrap();
        let reader = Desk::open_unlocked(RosterStore::new(&path, ColumnNames::default())).unwrap();
        assert!(!reader.is_locked());
        assert_eq!(reader.summary().unwrap().total, 2);
    }

    #[test]
    fn test_mark_updates_session_only_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let desk = Desk::open(roster_store(dir.path())).unwrap();
        let mut session = ScanSession::new();

        assert!(desk.mark(&mut session, "TEST001").unwrap().success);
        assert!(!desk.mark(&mut session, "TEST001").unwrap().success);
        assert!(!desk.mark(&mut session, "NOPE").unwrap().success);

        assert_eq!(session.scan_count, 1);
        assert!(session.last_scan.is_some());
        assert_eq!(
            desk.summary().unwrap(),
            AttendanceSummary {
                total: 2,
                present: 1,
                absent: 1
            }
        );
    }

    #[test]
    fn test_check_in_image() {
        let dir = tempfile::tempdir().unwrap();
        let desk = Desk::open(roster_store(dir.path()))
            .unwrap()
            .with_scanner(QrScanner::with_detector(Payload("TEST002")));
        let mut session = ScanSession::new();

        let check_in = desk.check_in_image(&mut session, &blank()).unwrap();
        assert!(check_in.success());
        assert_eq!(check_in.scan.payload.as_deref(), Some("TEST002"));
        assert_eq!(
            check_in.message(),
            "Welcome Ravi Kumar! Attendance marked successfully."
        );
        assert!(desk.find("TEST002").unwrap().unwrap().attendance());
    }

    #[test]
    fn test_check_in_without_code() {
        let dir = tempfile::tempdir().unwrap();
        let desk = Desk::open(roster_store(dir.path()))
            .unwrap()
            .with_scanner(QrScanner::with_detector(Nothing));
        let mut session = ScanSession::new();

        let check_in = desk.check_in_image(&mut session, &blank()).unwrap();
        assert!(!check_in.success());
        assert!(check_in.outcome.is_none());
        assert_eq!(check_in.message(), NO_CODE_FOUND);
        assert_eq!(session.scan_count, 0);
        assert_eq!(desk.summary().unwrap().present, 0);
    }

    #[test]
    fn test_check_in_bad_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let desk = Desk::open(roster_store(dir.path())).unwrap();
        let mut session = ScanSession::new();

        let check_in = desk.check_in_bytes(&mut session, b"\x89PNG broken").unwrap();
        assert!(!check_in.success());
        assert!(check_in.message().starts_with("Error scanning QR code"));
    }

    #[test]
    fn test_concurrent_marks_succeed_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path());
        let desk = Desk::open(RosterStore::new(&path, ColumnNames::default())).unwrap();
        let successes = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let mut session = ScanSession::new();
                    for key in ["TEST001", "TEST002"] {
                        if desk.mark(&mut session, key).unwrap().success {
                            successes.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(successes.load(Ordering::SeqCst), 2);
        let on_disk = desk.store().load().unwrap();
        assert_eq!(on_disk.summary().present, 2);
    }

    #[test]
    fn test_records_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let desk = Desk::open_unlocked(roster_store(dir.path())).unwrap();

        let records = desk.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name(), "Test Student");
        assert!(desk.find("TEST003").unwrap().is_none());
    }

    #[test]
    fn test_from_config_honors_lock_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_roster(dir.path());
        let mut config = Config::default();
        config.roster.path = Some(path);

        config.roster.lock = false;
        assert!(!Desk::from_config(&config).unwrap().is_locked());

        config.roster.lock = true;
        assert!(Desk::from_config(&config).unwrap().is_locked());
    }

    #[test]
    fn test_open_missing_roster() {
        let dir = tempfile::tempdir().unwrap();
        let store = RosterStore::new(dir.path().join("absent.csv"), ColumnNames::default());
        let err = Desk::open(store).unwrap_err();
        assert!(matches!(err, Error::RosterRead { .. }));
    }
}
