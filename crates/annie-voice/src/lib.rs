//! Speech-agent integration for the Annie call bridge.
//!
//! The hosted agent performs recognition, reasoning, and synthesis over a
//! single streaming WebSocket session. This crate owns everything about
//! that session that does not depend on the telephony leg: the agent
//! configuration, the persona prompt library, composition of the initial
//! `Settings` message and its function manifest, opening the authenticated
//! connection, and decoding the agent's control events.

pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod prompts;
pub mod settings;

pub use config::{AgentConfig, DEFAULT_AGENT_URL};
pub use connector::{open_session, AgentStream};
pub use error::VoiceError;
pub use events::{AgentEvent, FunctionCallRequest, FunctionCallResponse};
pub use prompts::{sanitize_persona, PromptLibrary, DEFAULT_INSTRUCTIONS};
pub use settings::{
    compose_prompt, compose_settings, function_manifest, personalization_block, Settings,
    EMERGENCY_FUNCTION, SAFETY_DIRECTIVE,
};
