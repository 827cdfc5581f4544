//! `qr-attendance` - QR code check-in against a CSV roster
//!
//! This library reads registration numbers from badge QR codes, looks them up
//! in an event roster and records attendance at most once per registrant,
//! writing the roster back to disk after every change.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod desk;
pub mod error;
pub mod logging;
pub mod marker;
pub mod roster;
pub mod scanner;

pub use config::Config;
pub use desk::{CheckIn, Desk, ScanSession};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use marker::{mark, MarkOutcome, MarkStatus};
pub use roster::{AttendanceSummary, ColumnNames, Roster, RosterRecord, RosterStore};
pub use scanner::{decode, QrScanner, ScanResult};
