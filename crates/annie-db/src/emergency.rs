//! Emergency event persistence.

use annie_types::Severity;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::calls::format_timestamp;
use crate::error::StoreError;

/// An emergency raised during a call, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmergencyEvent {
    /// The call the emergency was raised on, if known.
    pub call_id: Option<i64>,
    /// Internal patient ID (`patients.id`).
    pub patient_id: i64,
    pub severity: Severity,
    /// Free-text reason supplied by the agent.
    pub signal_text: String,
    /// Serialized detector metadata.
    pub detector_info: Option<String>,
}

/// Stores an emergency event and flags the patient.
///
/// The event insert and the patient flag update happen in one transaction.
/// Returns the new event ID.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the patient does not exist.
pub fn record_emergency(
    conn: &Connection,
    event: &NewEmergencyEvent,
    detected_at: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let tx = conn.unchecked_transaction()?;

    let org_id: i64 = tx
        .query_row(
            "SELECT org_id FROM patients WHERE id = ?1",
            [event.patient_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("patient {}", event.patient_id)))?;

    let detected_at = format_timestamp(detected_at);
    tx.execute(
        "INSERT INTO emergency_events
             (call_id, patient_id, org_id, severity, signal_text, detector_info, detected_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.call_id,
            event.patient_id,
            org_id,
            event.severity.as_str(),
            event.signal_text,
            event.detector_info,
            detected_at,
        ],
    )?;
    let event_id = tx.last_insert_rowid();

    tx.execute(
        "UPDATE patients SET emergency_flag = 1, last_emergency_at = ?2 WHERE id = ?1",
        params![event.patient_id, detected_at],
    )?;
    tx.commit()?;

    Ok(event_id)
}
