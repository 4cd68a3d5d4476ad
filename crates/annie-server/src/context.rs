//! Loading the persona and personalization context for a session.
//!
//! Every lookup degrades: a store error or a missing row leaves the
//! corresponding field empty and the session proceeds.

use annie_db::DbPool;
use annie_types::{OrgContext, PatientContext};

use crate::call_target::CallTarget;
use crate::run_store_op;

/// Where the session's persona name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaSource {
    CallRecord,
    Query,
    Default,
}

impl PersonaSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CallRecord => "call_record",
            Self::Query => "query",
            Self::Default => "default",
        }
    }
}

/// Everything known about a session before the agent is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub call_id: Option<i64>,
    pub persona: String,
    pub persona_source: PersonaSource,
    /// `calls.patient_id`, kept even if the patient row could not be read.
    pub patient_id: Option<i64>,
    pub patient: Option<PatientContext>,
    pub org: Option<OrgContext>,
}

/// Resolves persona and context for a call.
///
/// A persona on the call record is authoritative; otherwise the query
/// hint is used, then `default_persona`.
pub async fn load_session_context(
    pool: &DbPool,
    target: &CallTarget,
    default_persona: &str,
) -> SessionContext {
    let mut context = SessionContext {
        call_id: target.call_id,
        persona: default_persona.to_string(),
        persona_source: PersonaSource::Default,
        patient_id: None,
        patient: None,
        org: None,
    };

    let record = match target.call_id {
        Some(call_id) => match run_store_op(pool, move |conn| annie_db::get_call(conn, call_id)).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                tracing::warn!(call_id, "no call record found");
                None
            }
            Err(e) => {
                tracing::warn!(call_id, error = %e, "call lookup failed");
                None
            }
        },
        None => None,
    };

    if let Some(record) = &record {
        context.patient_id = record.patient_id;

        if let Some(agent) = record.agent.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            context.persona = agent.to_string();
            context.persona_source = PersonaSource::CallRecord;
        }

        if let Some(patient_id) = record.patient_id {
            match run_store_op(pool, move |conn| annie_db::get_patient(conn, patient_id)).await {
                Ok(patient) => context.patient = patient,
                Err(e) => tracing::warn!(patient_id, error = %e, "patient lookup failed"),
            }
        }

        let org_id = record.org_id;
        match run_store_op(pool, move |conn| annie_db::get_organization(conn, org_id)).await {
            Ok(org) => context.org = org,
            Err(e) => tracing::warn!(org_id, error = %e, "organization lookup failed"),
        }
    }

    if context.persona_source == PersonaSource::Default {
        if let Some(hint) = &target.agent_hint {
            context.persona = hint.clone();
            context.persona_source = PersonaSource::Query;
        }
    }

    context
}
