//! Call, patient, and organization records.
//!
//! Reads resolve a call's persona and personalization context. Writes record
//! the discrete lifecycle facts of a bridged call: start, end, transcript
//! fragments. Each write is a single statement or a short transaction, so
//! concurrent writers never hold a lock across the life of a call.

use annie_types::{CallStatus, OrgContext, PatientContext};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;

/// The subset of a `calls` row the bridge needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub id: i64,
    pub org_id: i64,
    pub patient_id: Option<i64>,
    /// Persona assigned by the scheduler; authoritative when present.
    pub agent: Option<String>,
    pub status: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_seconds: Option<i64>,
    pub transcript: Option<String>,
}

/// Formats a timestamp the way the store writes them.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// Parses a stored timestamp.
///
/// Accepts RFC 3339 as written by this crate, and the naive
/// `YYYY-MM-DD HH:MM:SS[.f]` form written by other tools sharing the
/// database (interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_dob(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|dt| dt.date_naive()))
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Fetches a call record by ID.
pub fn get_call(conn: &Connection, call_id: i64) -> Result<Option<CallRecord>, StoreError> {
    let record = conn
        .query_row(
            "SELECT id, org_id, patient_id, agent, status, start_time, end_time,
                    duration_seconds, transcript
             FROM calls WHERE id = ?1",
            [call_id],
            |row| {
                Ok(CallRecord {
                    id: row.get(0)?,
                    org_id: row.get(1)?,
                    patient_id: row.get(2)?,
                    agent: row.get(3)?,
                    status: row.get(4)?,
                    start_time: row.get(5)?,
                    end_time: row.get(6)?,
                    duration_seconds: row.get(7)?,
                    transcript: row.get(8)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

/// Fetches the personalization context for a patient.
///
/// An unparseable date of birth is treated as unknown.
pub fn get_patient(conn: &Connection, patient_id: i64) -> Result<Option<PatientContext>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, name, dob FROM patients WHERE id = ?1",
            [patient_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    Ok(row.map(|(id, patient_ref, name, dob)| PatientContext {
        id,
        patient_ref,
        name,
        dob: dob.as_deref().and_then(parse_dob),
    }))
}

/// Fetches the personalization context for an organization.
pub fn get_organization(conn: &Connection, org_id: i64) -> Result<Option<OrgContext>, StoreError> {
    let org = conn
        .query_row(
            "SELECT id, name FROM organizations WHERE id = ?1",
            [org_id],
            |row| {
                Ok(OrgContext {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(org)
}

/// Records the call start time and moves the call to `in_progress`.
///
/// A call that already has a start time is left untouched. Returns whether
/// the row was updated.
pub fn mark_call_started(
    conn: &Connection,
    call_id: i64,
    started_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE calls SET start_time = ?2, status = ?3
         WHERE id = ?1 AND start_time IS NULL",
        params![
            call_id,
            format_timestamp(started_at),
            CallStatus::InProgress.as_str()
        ],
    )?;
    Ok(changed > 0)
}

/// Records the call end time, final status, and duration.
///
/// The duration is derived from the stored start time; when there is no
/// usable start time the duration column is left as is. Returns the
/// duration in seconds when one was computed.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the call does not exist.
pub fn mark_call_ended(
    conn: &Connection,
    call_id: i64,
    ended_at: DateTime<Utc>,
    status: CallStatus,
) -> Result<Option<i64>, StoreError> {
    let tx = conn.unchecked_transaction()?;

    let start_time: Option<String> = tx
        .query_row(
            "SELECT start_time FROM calls WHERE id = ?1",
            [call_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("call {call_id}")))?;

    let duration = start_time
        .as_deref()
        .and_then(parse_timestamp)
        .map(|started| (ended_at - started).num_seconds().max(0));

    tx.execute(
        "UPDATE calls
         SET end_time = ?2, status = ?3, duration_seconds = COALESCE(?4, duration_seconds)
         WHERE id = ?1",
        params![call_id, format_timestamp(ended_at), status.as_str(), duration],
    )?;
    tx.commit()?;

    Ok(duration)
}

/// Marks a call that never started as `failed`.
///
/// Returns whether the row was updated.
pub fn mark_call_failed(conn: &Connection, call_id: i64) -> Result<bool, StoreError> {
    let changed = conn.execute(
        "UPDATE calls SET status = ?2 WHERE id = ?1 AND start_time IS NULL",
        params![call_id, CallStatus::Failed.as_str()],
    )?;
    Ok(changed > 0)
}

/// Appends one transcript fragment to a call.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the call does not exist.
pub fn append_transcript(conn: &Connection, call_id: i64, fragment: &str) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE calls SET transcript = COALESCE(transcript, '') || ?2 WHERE id = ?1",
        params![call_id, fragment],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("call {call_id}")));
    }
    Ok(())
}
