use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors opening or writing to a speech-agent session.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("speech agent credential is not configured")]
    MissingCredential,

    #[error("invalid agent request: {0}")]
    InvalidRequest(String),

    #[error("agent connection failed: {0}")]
    Connect(#[source] tungstenite::Error),

    #[error("agent connection timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("failed to send to agent: {0}")]
    Send(#[source] tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
