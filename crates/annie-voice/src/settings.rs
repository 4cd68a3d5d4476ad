//! The `Settings` message that opens every agent session.
//!
//! The prompt is assembled from three parts in a fixed order: an optional
//! personalization block describing the patient, the persona instructions,
//! and the emergency safety directive, which is always present.

use annie_types::{OrgContext, PatientContext, Severity};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::AgentConfig;

/// Name of the emergency-detection function advertised to the agent.
pub const EMERGENCY_FUNCTION: &str = "detect_emergency";

/// Appended to every persona prompt.
pub const SAFETY_DIRECTIVE: &str = "IMPORTANT: If the patient mentions ANY of the following, \
you MUST immediately call the detect_emergency function:
- Chest pain, severe chest pain, pressure in chest
- Can't breathe, difficulty breathing, shortness of breath
- Calling 911, need emergency help, need ambulance
- Heart attack, stroke symptoms
- Severe pain anywhere in the body
- Feeling dizzy, lightheaded, or faint
- Any life-threatening situation

Call detect_emergency BEFORE responding to the patient.";

/// The first message of every agent session.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub audio: AudioSettings,
    pub agent: AgentSettings,
}

/// Input and output audio formats.
#[derive(Debug, Clone, Serialize)]
pub struct AudioSettings {
    pub input: AudioFormat,
    pub output: AudioFormat,
}

/// Encoding and sample rate of one audio direction.
#[derive(Debug, Clone, Serialize)]
pub struct AudioFormat {
    pub encoding: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<&'static str>,
}

/// Agent pipeline configuration.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSettings {
    pub language: String,
    pub listen: ProviderSettings,
    pub think: ThinkSettings,
    pub speak: ProviderSettings,
}

/// Wrapper holding a single provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSettings {
    pub provider: Provider,
}

/// A provider and the model it should run.
#[derive(Debug, Clone, Serialize)]
pub struct Provider {
    #[serde(rename = "type")]
    pub kind: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// The think stage, with its prompt and callable functions.
#[derive(Debug, Clone, Serialize)]
pub struct ThinkSettings {
    pub provider: Provider,
    pub prompt: String,
    pub functions: Vec<FunctionDefinition>,
}

/// A function the agent may call back.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// The functions the agent may invoke. Currently only emergency detection.
pub fn function_manifest() -> Vec<FunctionDefinition> {
    let levels: Vec<&str> = Severity::ALL.iter().map(|s| s.as_str()).collect();
    vec![FunctionDefinition {
        name: EMERGENCY_FUNCTION,
        description: "MUST be called immediately when patient reports chest pain, difficulty \
                      breathing, mentions 911, or any life-threatening symptoms. This is critical \
                      for patient safety.",
        parameters: json!({
            "type": "object",
            "properties": {
                "severity": {
                    "type": "string",
                    "enum": levels,
                    "description": "critical=chest pain/can't breathe/911/stroke, high=severe pain/dizziness, medium=concerning symptoms"
                },
                "reason": {
                    "type": "string",
                    "description": "Exact quote of what patient said (e.g., 'severe pain in my chest')"
                }
            },
            "required": ["severity", "reason"]
        }),
    }]
}

/// Builds the patient context block prepended to the persona prompt.
pub fn personalization_block(patient: &PatientContext, org: Option<&OrgContext>) -> String {
    let internal_id = patient
        .patient_ref
        .clone()
        .unwrap_or_else(|| patient.id.to_string());
    let dob = patient
        .dob
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let legal_name = match patient.name.trim() {
        "" => "unknown",
        name => name,
    };

    [
        "### PATIENT CONTEXT (do not reveal confidential details):".to_string(),
        format!("- patient_legal_name: {legal_name}"),
        format!(
            "- patient_first_name: {}",
            patient.first_name().unwrap_or("unknown")
        ),
        format!("- patient_id_internal: {internal_id}"),
        format!("- patient_dob: {dob}"),
        format!(
            "- organization_name: {}",
            org.map(|o| o.name.as_str()).unwrap_or("unknown")
        ),
        String::new(),
        "### VOICE & TONE:".to_string(),
        "- Greet the patient by first name once at the start.".to_string(),
        "- Be clear, empathetic, professional; avoid repeating their name unnecessarily."
            .to_string(),
        String::new(),
        "### TASK:".to_string(),
        "- Collect vitals: BP (systolic/diastolic), pulse, glucose, weight.".to_string(),
        "- Confirm each value back to the patient as you collect it.".to_string(),
        "- Close with a brief summary.".to_string(),
        String::new(),
    ]
    .join("\n")
}

/// Joins the personalization block, persona instructions and safety directive.
pub fn compose_prompt(instructions: &str, personalization: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(block) = personalization {
        prompt.push_str(block.trim_end());
        prompt.push_str("\n\n");
    }
    prompt.push_str(instructions.trim());
    prompt.push_str("\n\n");
    prompt.push_str(SAFETY_DIRECTIVE);
    prompt
}

pub fn compose_settings(config: &AgentConfig, prompt: String) -> Settings {
    let format = |container| AudioFormat {
        encoding: config.audio_encoding.clone(),
        sample_rate: config.sample_rate,
        container,
    };

    Settings {
        kind: "Settings",
        audio: AudioSettings {
            input: format(None),
            output: format(Some("none")),
        },
        agent: AgentSettings {
            language: config.language.clone(),
            listen: ProviderSettings {
                provider: Provider {
                    kind: "deepgram".to_string(),
                    model: config.listen_model.clone(),
                    temperature: None,
                },
            },
            think: ThinkSettings {
                provider: Provider {
                    kind: config.think_provider.clone(),
                    model: config.think_model.clone(),
                    temperature: Some(config.think_temperature),
                },
                prompt,
                functions: function_manifest(),
            },
            speak: ProviderSettings {
                provider: Provider {
                    kind: "deepgram".to_string(),
                    model: config.speak_model.clone(),
                    temperature: None,
                },
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn patient() -> PatientContext {
        PatientContext {
            id: 5,
            patient_ref: Some("P-0005".to_string()),
            name: "Mary Ann Smith".to_string(),
            dob: NaiveDate::from_ymd_opt(1948, 3, 9),
        }
    }

    #[test]
    fn personalization_includes_first_name_dob_and_org() {
        let org = OrgContext {
            id: 1,
            name: "Sunrise Clinic".to_string(),
        };
        let block = personalization_block(&patient(), Some(&org));
        assert!(block.starts_with("### PATIENT CONTEXT"));
        assert!(block.contains("- patient_first_name: Mary\n"));
        assert!(block.contains("- patient_id_internal: P-0005\n"));
        assert!(block.contains("- patient_dob: 1948-03-09\n"));
        assert!(block.contains("- organization_name: Sunrise Clinic\n"));
        assert!(block.contains("Greet the patient by first name once"));
    }

    #[test]
    fn personalization_marks_missing_fields_unknown() {
        let p = PatientContext {
            patient_ref: None,
            dob: None,
            ..patient()
        };
        let block = personalization_block(&p, None);
        assert!(block.contains("- patient_id_internal: 5\n"));
        assert!(block.contains("- patient_dob: unknown\n"));
        assert!(block.contains("- organization_name: unknown\n"));
    }

    #[test]
    fn prompt_always_ends_with_safety_directive() {
        let plain = compose_prompt("  Be kind.  ", None);
        assert!(plain.starts_with("Be kind.\n\nIMPORTANT:"));
        assert!(plain.ends_with("Call detect_emergency BEFORE responding to the patient."));

        let personal = compose_prompt("Be kind.", Some("### PATIENT CONTEXT\n- x\n"));
        assert!(personal.starts_with("### PATIENT CONTEXT\n- x\n\nBe kind.\n\n"));
        assert!(personal.ends_with(SAFETY_DIRECTIVE));
    }

    #[test]
    fn settings_serialize_to_agent_wire_shape() {
        let settings = compose_settings(&AgentConfig::default(), "prompt text".to_string());
        let value = serde_json::to_value(&settings).unwrap();

        assert_eq!(value["type"], "Settings");
        assert_eq!(value["audio"]["input"]["encoding"], "mulaw");
        assert_eq!(value["audio"]["input"]["sample_rate"], 8000);
        assert!(value["audio"]["input"].get("container").is_none());
        assert_eq!(value["audio"]["output"]["container"], "none");
        assert_eq!(value["agent"]["language"], "en");
        assert_eq!(value["agent"]["listen"]["provider"]["model"], "nova-3");
        assert_eq!(value["agent"]["think"]["provider"]["type"], "open_ai");
        assert_eq!(value["agent"]["think"]["prompt"], "prompt text");
        assert_eq!(value["agent"]["speak"]["provider"]["model"], "aura-2-thalia-en");

        let function = &value["agent"]["think"]["functions"][0];
        assert_eq!(function["name"], EMERGENCY_FUNCTION);
        assert_eq!(
            function["parameters"]["properties"]["severity"]["enum"],
            serde_json::json!(["critical", "high", "medium"])
        );
        assert_eq!(
            function["parameters"]["required"],
            serde_json::json!(["severity", "reason"])
        );
    }
}
