//! Server configuration loading from file and environment variables.

use annie_types::DEFAULT_PERSONA;
use annie_voice::AgentConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Speech-agent connection and model settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Per-session bridge behavior.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Emergency reporting.
    #[serde(default)]
    pub emergency: EmergencyConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "annie_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Bridge session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Directory holding `<persona>.txt` instruction files.
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,

    /// Persona used when neither the call record nor the query names one.
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Prepend the patient context block to the persona prompt.
    #[serde(default = "default_true")]
    pub personalized_greeting: bool,

    /// How long agent audio waits for the telephony stream token.
    #[serde(default = "default_stream_token_wait_ms")]
    pub stream_token_wait_ms: u64,

    /// Capacity of the inbound audio queue, in 800-byte chunks.
    #[serde(default = "default_audio_queue_capacity")]
    pub audio_queue_capacity: usize,

    /// Capacity of the queue of control messages bound for the agent.
    #[serde(default = "default_control_queue_capacity")]
    pub control_queue_capacity: usize,
}

impl BridgeConfig {
    pub fn stream_token_wait(&self) -> Duration {
        Duration::from_millis(self.stream_token_wait_ms)
    }
}

/// Emergency reporting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EmergencyConfig {
    /// Base URL of the internal API exposing `/api/emergency/event`.
    /// When unset, emergencies are written straight to the store.
    #[serde(default)]
    pub api_base: Option<String>,

    #[serde(default = "default_emergency_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_db_path() -> String {
    "annie.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_prompts_dir() -> String {
    "prompts".to_string()
}

fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}

fn default_true() -> bool {
    true
}

fn default_stream_token_wait_ms() -> u64 {
    5_000
}

fn default_audio_queue_capacity() -> usize {
    64
}

fn default_control_queue_capacity() -> usize {
    32
}

fn default_emergency_timeout_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            prompts_dir: default_prompts_dir(),
            default_persona: default_persona(),
            personalized_greeting: true,
            stream_token_wait_ms: default_stream_token_wait_ms(),
            audio_queue_capacity: default_audio_queue_capacity(),
            control_queue_capacity: default_control_queue_capacity(),
        }
    }
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            timeout_secs: default_emergency_timeout_secs(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `ANNIE_HOST`, `ANNIE_PORT` override `server.host` / `server.port`
/// - `ANNIE_DB_PATH` overrides `database.path`
/// - `ANNIE_LOG_LEVEL`, `ANNIE_LOG_JSON` override `logging`
/// - `DEEPGRAM_API_KEY`, `DEEPGRAM_AGENT_URL` override `agent.api_key` / `agent.url`
/// - `PERSONALIZED_GREETING` overrides `bridge.personalized_greeting`
///   (`0`, `false` or `no` disable it)
/// - `ANNIE_PROMPTS_DIR`, `ANNIE_DEFAULT_AGENT` override the prompt settings
/// - `PUBLIC_HOST` overrides `emergency.api_base`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(parsed) = var("ANNIE_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = var("ANNIE_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(db_path) = var("ANNIE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("ANNIE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("ANNIE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(key) = var("DEEPGRAM_API_KEY") {
        config.agent.api_key = key;
    }
    if let Some(url) = var("DEEPGRAM_AGENT_URL").filter(|v| !v.trim().is_empty()) {
        config.agent.url = url;
    }
    if let Some(flag) = var("PERSONALIZED_GREETING") {
        config.bridge.personalized_greeting =
            !matches!(flag.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no");
    }
    if let Some(dir) = var("ANNIE_PROMPTS_DIR").filter(|v| !v.trim().is_empty()) {
        config.bridge.prompts_dir = dir;
    }
    if let Some(persona) = var("ANNIE_DEFAULT_AGENT").filter(|v| !v.trim().is_empty()) {
        config.bridge.default_persona = persona;
    }
    if let Some(host) = var("PUBLIC_HOST").filter(|v| !v.trim().is_empty()) {
        config.emergency.api_base = Some(host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| env.get(key).cloned());
        config
    }

    #[test]
    fn defaults_match_production_deployment() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.bridge.default_persona, "annie_RPM");
        assert!(config.bridge.personalized_greeting);
        assert_eq!(config.bridge.stream_token_wait(), Duration::from_secs(5));
        assert_eq!(config.emergency.api_base, None);
        assert_eq!(config.agent.listen_model, "nova-3");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).expect("missing file is not an error");
        assert_eq!(config.database.path, Config::default().database.path);
    }

    #[test]
    fn file_sections_are_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8080

[agent]
speak_model = "aura-2-luna-en"

[bridge]
stream_token_wait_ms = 250
personalized_greeting = false

[emergency]
api_base = "http://internal:5000"
"#,
        )
        .unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.agent.speak_model, "aura-2-luna-en");
        assert_eq!(config.agent.language, "en");
        assert_eq!(config.bridge.stream_token_wait_ms, 250);
        assert!(!config.bridge.personalized_greeting);
        assert_eq!(config.bridge.audio_queue_capacity, 64);
        assert_eq!(
            config.emergency.api_base.as_deref(),
            Some("http://internal:5000")
        );
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let config = overrides(&[
            ("ANNIE_PORT", "9000"),
            ("ANNIE_HOST", "0.0.0.0"),
            ("DEEPGRAM_API_KEY", "dg-key"),
            ("PUBLIC_HOST", "http://localhost:5000"),
            ("ANNIE_DEFAULT_AGENT", "cardio"),
            ("ANNIE_LOG_JSON", "1"),
        ]);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.agent.api_key, "dg-key");
        assert_eq!(
            config.emergency.api_base.as_deref(),
            Some("http://localhost:5000")
        );
        assert_eq!(config.bridge.default_persona, "cardio");
        assert!(config.logging.json);
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let config = overrides(&[("ANNIE_PORT", "not-a-port")]);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn personalization_toggle_values() {
        for off in ["0", "false", "No"] {
            let config = overrides(&[("PERSONALIZED_GREETING", off)]);
            assert!(!config.bridge.personalized_greeting, "{off} should disable");
        }
        let config = overrides(&[("PERSONALIZED_GREETING", "1")]);
        assert!(config.bridge.personalized_greeting);
    }
}
