//! Roster model for qr-attendance.
//!
//! A roster is the registration export of an event (typically a form
//! response sheet) with one extra `ATTENDANCE` column. Rows keep every cell
//! they were loaded with so that writing the roster back never loses
//! columns this crate does not understand.

pub mod lock;
pub mod store;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

pub use lock::RosterLock;
pub use store::{load, save, RosterStore};

/// Cell text written for a freshly marked registrant.
pub const PRESENT: &str = "True";

/// Cell text used when the attendance column has to be synthesized.
pub const ABSENT: &str = "False";

/// Header names of the columns the roster is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// Column holding the registration number (the QR payload).
    pub registration: String,
    /// Column holding the registrant's display name.
    pub name: String,
    /// Column holding the registrant's email address. Optional in the file.
    pub email: String,
    /// Column holding the attendance flag. Synthesized when absent.
    pub attendance: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            registration: "Reg. No.".to_string(),
            name: "Name".to_string(),
            email: "University Mail ID".to_string(),
            attendance: "ATTENDANCE".to_string(),
        }
    }
}

/// Line terminator of a roster file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`, as written by most spreadsheet exports.
    CrLf,
}

impl LineEnding {
    /// The terminator used by `bytes`, judged by the end of the first line.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes.iter().position(|&b| b == b'\n') {
            Some(i) if i > 0 && bytes[i - 1] == b'\r' => Self::CrLf,
            _ => Self::Lf,
        }
    }
}

/// Resolved header positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnIndices {
    registration: usize,
    name: usize,
    email: Option<usize>,
    attendance: usize,
}

/// One registrant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterRecord {
    registration_number: String,
    name: String,
    email: String,
    attendance: bool,
    #[serde(skip)]
    raw_row: Vec<String>,
}

impl RosterRecord {
    /// The registration number, exactly as it appears in the file.
    #[must_use]
    pub fn registration_number(&self) -> &str {
        &self.registration_number
    }

    /// The registrant's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registrant's email, empty when the roster has no email column.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Whether attendance has been marked.
    #[must_use]
    pub fn attendance(&self) -> bool {
        self.attendance
    }

    /// Every cell of the row in header order.
    #[must_use]
    pub fn raw_row(&self) -> &[String] {
        &self.raw_row
    }
}

/// Present/absent counts over a roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    /// Number of registrants.
    pub total: usize,
    /// Registrants marked present.
    pub present: usize,
    /// Registrants not yet marked.
    pub absent: usize,
}

/// An ordered, indexed collection of registrants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    headers: Vec<String>,
    columns: ColumnIndices,
    records: Vec<RosterRecord>,
    index: HashMap<String, usize>,
    line_ending: LineEnding,
}

impl Roster {
    /// Build a roster from a header row and data rows.
    ///
    /// Every row must have as many cells as the header. If the attendance
    /// column is missing it is appended with every registrant absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingColumn`] if the registration or name column is
    /// absent, [`Error::RaggedRow`] if a row is shorter or longer than the
    /// header, and [`Error::DuplicateRegistration`] if a registration number
    /// repeats.
    pub fn from_rows(
        mut headers: Vec<String>,
        rows: Vec<Vec<String>>,
        names: &ColumnNames,
    ) -> Result<Self> {
        let position = |headers: &[String], name: &str| headers.iter().position(|h| h == name);

        let registration = position(&headers, &names.registration)
            .ok_or_else(|| Error::missing_column(&names.registration))?;
        let name =
            position(&headers, &names.name).ok_or_else(|| Error::missing_column(&names.name))?;
        let width = headers.len();
        let email = position(&headers, &names.email);
        let (attendance, synthesized) = match position(&headers, &names.attendance) {
            Some(idx) => (idx, false),
            None => {
                headers.push(names.attendance.clone());
                (headers.len() - 1, true)
            }
        };
        let columns = ColumnIndices {
            registration,
            name,
            email,
            attendance,
        };

        let mut records = Vec::with_capacity(rows.len());
        let mut index = HashMap::with_capacity(rows.len());
        for (i, mut row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(Error::RaggedRow {
                    row: i + 1,
                    found: row.len(),
                    expected: width,
                });
            }
            if synthesized {
                row.push(ABSENT.to_string());
            }

            let record = RosterRecord {
                registration_number: row[columns.registration].clone(),
                name: row[columns.name].clone(),
                email: columns.email.map(|e| row[e].clone()).unwrap_or_default(),
                attendance: parse_attendance(&row[columns.attendance]),
                raw_row: row,
            };

            if record.registration_number.is_empty() {
                warn!("row {} has no registration number and can never be matched", i + 1);
            } else if index
                .insert(record.registration_number.clone(), records.len())
                .is_some()
            {
                return Err(Error::DuplicateRegistration {
                    registration: record.registration_number,
                    row: i + 1,
                });
            }
            records.push(record);
        }

        Ok(Self {
            headers,
            columns,
            records,
            index,
            line_ending: LineEnding::default(),
        })
    }

    /// Use `line_ending` when this roster is written out.
    #[must_use]
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Line terminator the roster is written with.
    #[must_use]
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Header row, including a synthesized attendance column.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Registrants in file order.
    #[must_use]
    pub fn records(&self) -> &[RosterRecord] {
        &self.records
    }

    /// Number of registrants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the roster has no registrants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a registrant by exact registration number.
    ///
    /// No trimming or case folding is applied.
    #[must_use]
    pub fn find(&self, registration_number: &str) -> Option<&RosterRecord> {
        self.position(registration_number).map(|i| &self.records[i])
    }

    /// Row position of a registration number.
    #[must_use]
    pub fn position(&self, registration_number: &str) -> Option<usize> {
        self.index.get(registration_number).copied()
    }

    /// Count present and absent registrants.
    #[must_use]
    pub fn summary(&self) -> AttendanceSummary {
        let present = self.records.iter().filter(|r| r.attendance).count();
        AttendanceSummary {
            total: self.records.len(),
            present,
            absent: self.records.len() - present,
        }
    }

    /// Mark the registrant at `position` present.
    ///
    /// Returns the previous attendance cell so the change can be reverted.
    pub(crate) fn set_present(&mut self, position: usize) -> String {
        let column = self.columns.attendance;
        let record = &mut self.records[position];
        record.attendance = true;
        std::mem::replace(&mut record.raw_row[column], PRESENT.to_string())
    }

    /// Undo [`Roster::set_present`].
    pub(crate) fn revert_present(&mut self, position: usize, previous: String) {
        let column = self.columns.attendance;
        let record = &mut self.records[position];
        record.attendance = parse_attendance(&previous);
        record.raw_row[column] = previous;
    }
}

/// Interpret an attendance cell.
///
/// `true` in any case, `1` and `1.0` read as present. Everything else,
/// including an empty cell, reads as absent.
#[must_use]
pub fn parse_attendance(cell: &str) -> bool {
    let cell = cell.trim();
    cell.eq_ignore_ascii_case("true") || cell == "1" || cell == "1.0"
}
