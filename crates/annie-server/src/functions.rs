//! Execution of agent-requested functions.
//!
//! The executor never returns an error: every failure becomes a
//! [`FunctionOutcome`] with `success: false`, because the agent waits for a
//! response to every call it makes.

use std::sync::Arc;
use std::time::Duration;

use annie_db::{DbPool, NewEmergencyEvent};
use annie_types::Severity;
use annie_voice::EMERGENCY_FUNCTION;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::FunctionError;
use crate::run_store_op;

/// Detector label stored with every agent-raised emergency.
pub const DETECTOR_MODEL: &str = "deepgram_function_call";

/// A normalized function call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionInvocation {
    DetectEmergency { severity: Severity, reason: String },
    Unknown { name: String },
}

/// Result returned to the agent as the response `output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
}

impl FunctionOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            event_id: None,
        }
    }
}

/// Which detector raised an emergency, stored alongside the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorInfo {
    pub model: &'static str,
    pub function: &'static str,
    pub severity: Severity,
}

/// Body of `POST /api/emergency/event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmergencyReport {
    pub call_id: Option<i64>,
    pub patient_id: i64,
    pub severity: Severity,
    pub signal_text: String,
    pub detector_info: DetectorInfo,
}

/// Client for the internal emergency API.
#[derive(Debug, Clone)]
pub struct EmergencyApiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl EmergencyApiClient {
    /// # Errors
    ///
    /// Returns `FunctionError::Http` if the HTTP client cannot be built.
    pub fn new(base: &str, timeout: Duration) -> Result<Self, FunctionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/emergency/event", base.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts a report and returns the event ID from the response, if any.
    pub async fn report(&self, report: &EmergencyReport) -> Result<Option<i64>, FunctionError> {
        let body: Value = self
            .client
            .post(&self.endpoint)
            .json(report)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body
            .get("id")
            .or_else(|| body.get("event_id"))
            .and_then(Value::as_i64))
    }
}

/// Runs function calls for one session.
#[derive(Clone)]
pub struct FunctionExecutor {
    pool: DbPool,
    api: Option<Arc<EmergencyApiClient>>,
    call_id: Option<i64>,
    patient_id: Option<i64>,
}

impl FunctionExecutor {
    pub fn new(
        pool: DbPool,
        api: Option<Arc<EmergencyApiClient>>,
        call_id: Option<i64>,
        patient_id: Option<i64>,
    ) -> Self {
        Self {
            pool,
            api,
            call_id,
            patient_id,
        }
    }

    pub async fn execute(&self, invocation: FunctionInvocation) -> FunctionOutcome {
        match invocation {
            FunctionInvocation::DetectEmergency { severity, reason } => {
                match self.log_emergency(severity, reason).await {
                    Ok(event_id) => FunctionOutcome {
                        success: true,
                        message: format!(
                            "Emergency logged with severity {severity}. Medical staff will be notified."
                        ),
                        event_id,
                    },
                    Err(FunctionError::MissingPatient) => {
                        tracing::warn!(call_id = ?self.call_id, "emergency raised without a known patient");
                        FunctionOutcome::failure("Patient not found")
                    }
                    Err(FunctionError::Store(e)) if e.is_not_found() => {
                        tracing::warn!(patient_id = ?self.patient_id, "emergency patient missing from store");
                        FunctionOutcome::failure("Patient not found")
                    }
                    Err(e) => {
                        tracing::error!(error = %e, severity = %severity, "failed to log emergency");
                        FunctionOutcome::failure(format!("Failed to log emergency: {e}"))
                    }
                }
            }
            FunctionInvocation::Unknown { name } => {
                tracing::warn!(function = %name, "agent requested unknown function");
                FunctionOutcome::failure(format!("Unknown function: {name}"))
            }
        }
    }

    /// Reports through the API when configured, else (or on API failure)
    /// writes the event to the store.
    async fn log_emergency(
        &self,
        severity: Severity,
        reason: String,
    ) -> Result<Option<i64>, FunctionError> {
        let patient_id = self.patient_id.ok_or(FunctionError::MissingPatient)?;
        let report = EmergencyReport {
            call_id: self.call_id,
            patient_id,
            severity,
            signal_text: reason,
            detector_info: DetectorInfo {
                model: DETECTOR_MODEL,
                function: EMERGENCY_FUNCTION,
                severity,
            },
        };

        if let Some(api) = &self.api {
            match api.report(&report).await {
                Ok(event_id) => {
                    tracing::warn!(patient_id, severity = %severity, ?event_id, "emergency reported");
                    return Ok(event_id);
                }
                Err(e) => tracing::warn!(
                    endpoint = api.endpoint(),
                    error = %e,
                    "emergency API failed, writing to store"
                ),
            }
        }

        let event = NewEmergencyEvent {
            call_id: report.call_id,
            patient_id,
            severity,
            signal_text: report.signal_text,
            detector_info: serde_json::to_string(&report.detector_info).ok(),
        };
        let event_id = run_store_op(&self.pool, move |conn| {
            annie_db::record_emergency(conn, &event, Utc::now())
        })
        .await?;
        tracing::warn!(patient_id, severity = %severity, event_id, "emergency recorded in store");
        Ok(Some(event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annie_db::{create_pool, run_migrations, DbRuntimeSettings};

    fn seeded_pool() -> (tempfile::NamedTempFile, DbPool) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let pool = create_pool(file.path().to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO organizations (id, name) VALUES (1, 'Clinic');
             INSERT INTO patients (id, org_id, patient_id, name) VALUES (5, 1, 'P-5', 'Mary Smith');
             INSERT INTO calls (id, org_id, patient_id) VALUES (42, 1, 5);",
        )
        .unwrap();
        drop(conn);
        (file, pool)
    }

    fn emergency() -> FunctionInvocation {
        FunctionInvocation::DetectEmergency {
            severity: Severity::Critical,
            reason: "my chest hurts".to_string(),
        }
    }

    #[tokio::test]
    async fn store_fallback_records_event() {
        let (_file, pool) = seeded_pool();
        let executor = FunctionExecutor::new(pool.clone(), None, Some(42), Some(5));

        let outcome = executor.execute(emergency()).await;
        assert!(outcome.success);
        assert_eq!(
            outcome.message,
            "Emergency logged with severity critical. Medical staff will be notified."
        );

        let conn = pool.get().unwrap();
        let (id, info): (i64, String) = conn
            .query_row(
                "SELECT id, detector_info FROM emergency_events WHERE call_id = 42",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(outcome.event_id, Some(id));
        let info: Value = serde_json::from_str(&info).unwrap();
        assert_eq!(info["model"], DETECTOR_MODEL);
        assert_eq!(info["function"], "detect_emergency");
        assert_eq!(info["severity"], "critical");
    }

    #[tokio::test]
    async fn unreachable_api_falls_back_to_store() {
        let (_file, pool) = seeded_pool();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let api = EmergencyApiClient::new(&base, Duration::from_secs(1)).unwrap();
        let executor = FunctionExecutor::new(pool.clone(), Some(Arc::new(api)), Some(42), Some(5));
        let outcome = executor.execute(emergency()).await;
        assert!(outcome.success);

        let flag: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT emergency_flag FROM patients WHERE id = 5", [], |row| row.get(0))
            .unwrap();
        assert_eq!(flag, 1);
    }

    #[tokio::test]
    async fn missing_patient_is_structured_failure() {
        let (_file, pool) = seeded_pool();
        let no_patient = FunctionExecutor::new(pool.clone(), None, Some(42), None);
        let outcome = no_patient.execute(emergency()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Patient not found");

        let unknown_patient = FunctionExecutor::new(pool, None, Some(42), Some(404));
        let outcome = unknown_patient.execute(emergency()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Patient not found");
    }

    #[tokio::test]
    async fn unknown_function_fails_with_name() {
        let (_file, pool) = seeded_pool();
        let executor = FunctionExecutor::new(pool, None, Some(42), Some(5));
        let outcome = executor
            .execute(FunctionInvocation::Unknown {
                name: "schedule_visit".to_string(),
            })
            .await;
        assert_eq!(outcome, FunctionOutcome::failure("Unknown function: schedule_visit"));
    }

    #[test]
    fn endpoint_joins_base() {
        let api = EmergencyApiClient::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.endpoint(), "http://localhost:5000/api/emergency/event");
    }

    #[test]
    fn outcome_omits_missing_event_id() {
        let value = serde_json::to_value(FunctionOutcome::failure("nope")).unwrap();
        assert_eq!(value, serde_json::json!({"success": false, "message": "nope"}));
    }
}
