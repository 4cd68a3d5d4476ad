//! Shared types and constants for the Annie call bridge.
//!
//! This crate provides the domain types used across the Annie crates:
//! call lifecycle status, emergency severity levels, and the patient and
//! organization context a call session is personalized with.
//!
//! No crate in the workspace depends on anything *except* `annie-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Persona used when neither the call record nor the connection query
/// names one.
pub const DEFAULT_PERSONA: &str = "annie_RPM";

/// Lifecycle status of a call record.
///
/// Stored as a lowercase string in the `calls.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Created by the scheduler, not yet connected.
    Queued,
    /// The telephony leg has started streaming.
    InProgress,
    /// The telephony leg ended.
    Completed,
    /// The call could not be bridged to the speech agent.
    Failed,
}

impl CallStatus {
    /// Returns the column value for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl FromStr for CallStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseEnumError {
                kind: "call status",
                value: other.to_string(),
            }),
        }
    }
}

/// Severity of an emergency reported by the speech agent.
///
/// - `Critical`: chest pain, cannot breathe, emergency services, stroke.
/// - `High`: severe pain, dizziness, fainting.
/// - `Medium`: other concerning symptoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    #[default]
    High,
    Medium,
}

impl Severity {
    /// All severities, in the order they are advertised to the agent.
    pub const ALL: [Severity; 3] = [Self::Critical, Self::High, Self::Medium];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            _ => Err(ParseEnumError {
                kind: "severity",
                value: s.to_string(),
            }),
        }
    }
}

/// Patient details used to personalize a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    /// Internal database ID (`patients.id`).
    pub id: i64,
    /// Organization-assigned patient identifier (`patients.patient_id`).
    pub patient_ref: Option<String>,
    /// Display (legal) name.
    pub name: String,
    /// Date of birth, when known.
    pub dob: Option<NaiveDate>,
}

impl PatientContext {
    /// First whitespace-delimited token of the display name.
    pub fn first_name(&self) -> Option<&str> {
        self.name.split_whitespace().next()
    }
}

/// Organization details used to personalize a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgContext {
    /// Internal database ID (`organizations.id`).
    pub id: i64,
    /// Display name.
    pub name: String,
}
