//! At-most-once attendance marking.
//!
//! A registrant moves from absent to present exactly once. Unknown numbers
//! and repeat scans are reported in the outcome and leave the roster alone.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::roster::{Roster, RosterRecord, RosterStore};

/// Message for a registration number that is not on the roster.
pub const NOT_FOUND: &str = "Registration number not found in the database";

/// What a mark attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkStatus {
    /// Attendance was recorded and saved.
    Marked,
    /// The registrant was already present.
    AlreadyMarked,
    /// No registrant has this registration number.
    NotFound,
}

/// Result of a mark attempt, ready to show to the person at the door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkOutcome {
    /// Whether attendance was newly recorded.
    pub success: bool,
    /// What happened.
    pub status: MarkStatus,
    /// Human-readable message.
    pub message: String,
    /// The registrant, when one matched.
    pub record: Option<RosterRecord>,
}

impl MarkOutcome {
    fn marked(record: &RosterRecord) -> Self {
        Self {
            success: true,
            status: MarkStatus::Marked,
            message: format!("Welcome {}! Attendance marked successfully.", record.name()),
            record: Some(record.clone()),
        }
    }

    fn already_marked(record: &RosterRecord) -> Self {
        Self {
            success: false,
            status: MarkStatus::AlreadyMarked,
            message: format!("Attendance already marked for {}", record.name()),
            record: Some(record.clone()),
        }
    }

    fn not_found() -> Self {
        Self {
            success: false,
            status: MarkStatus::NotFound,
            message: NOT_FOUND.to_string(),
            record: None,
        }
    }
}

/// Mark `registration_number` present and persist the roster through `store`.
///
/// # Errors
///
/// Returns [`crate::Error::Persistence`] if the roster cannot be saved. The
/// in-memory roster is restored to its previous state first, so the same
/// call can be retried.
pub fn mark(
    roster: &mut Roster,
    store: &RosterStore,
    registration_number: &str,
) -> Result<MarkOutcome> {
    let Some(position) = roster.position(registration_number) else {
        warn!("Registration number {:?} not found", registration_number);
        return Ok(MarkOutcome::not_found());
    };

    let record = &roster.records()[position];
    if record.attendance() {
        warn!(
            "Attendance already marked for {} ({})",
            record.name(),
            registration_number
        );
        return Ok(MarkOutcome::already_marked(record));
    }

    let previous = roster.set_present(position);
    if let Err(err) = store.save(roster) {
        roster.revert_present(position, previous);
        return Err(err);
    }

    let record = &roster.records()[position];
    info!(
        "Marked attendance for {} ({})",
        record.name(),
        registration_number
    );
    Ok(MarkOutcome::marked(record))
}
