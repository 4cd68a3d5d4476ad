use serde::{Deserialize, Serialize};
use std::fmt;

/// Production speech-agent endpoint.
pub const DEFAULT_AGENT_URL: &str = "wss://agent.deepgram.com/v1/agent/converse";

/// Connection and model settings for the hosted speech agent.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Scheme prefix of the `Authorization` header, e.g. `Token`.
    pub auth_scheme: String,
    pub language: String,
    pub listen_model: String,
    pub think_provider: String,
    pub think_model: String,
    pub think_temperature: f64,
    pub speak_model: String,
    /// Codec shared by both audio directions; the bridge never transcodes.
    pub audio_encoding: String,
    pub sample_rate: u32,
    pub connect_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_AGENT_URL.to_string(),
            api_key: String::new(),
            auth_scheme: "Token".to_string(),
            language: "en".to_string(),
            listen_model: "nova-3".to_string(),
            think_provider: "open_ai".to_string(),
            think_model: "gpt-4o-mini".to_string(),
            think_temperature: 0.3,
            speak_model: "aura-2-thalia-en".to_string(),
            audio_encoding: "mulaw".to_string(),
            sample_rate: 8000,
            connect_timeout_secs: 10,
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("auth_scheme", &self.auth_scheme)
            .field("language", &self.language)
            .field("listen_model", &self.listen_model)
            .field("think_provider", &self.think_provider)
            .field("think_model", &self.think_model)
            .field("think_temperature", &self.think_temperature)
            .field("speak_model", &self.speak_model)
            .field("audio_encoding", &self.audio_encoding)
            .field("sample_rate", &self.sample_rate)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl AgentConfig {
    /// Returns `true` if an API key is configured.
    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Value of the `Authorization` header for the agent handshake.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.auth_scheme, self.api_key.trim())
    }
}
