//! Opening the upstream agent session.
//!
//! A session is a single authenticated WebSocket. The composed
//! [`Settings`] message is sent before anything else; the returned stream
//! is ready for audio. Failures here are terminal for the call: there is
//! no retry.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::AgentConfig;
use crate::error::VoiceError;
use crate::settings::Settings;

/// An open agent session.
pub type AgentStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the agent and sends `settings` as the first message.
///
/// # Errors
///
/// - `MissingCredential` if no API key is configured.
/// - `InvalidRequest` if the URL or credential cannot form a request.
/// - `ConnectTimeout` / `Connect` if the handshake does not complete.
/// - `Serialization` / `Send` if the settings cannot be delivered.
pub async fn open_session(
    config: &AgentConfig,
    settings: &Settings,
) -> Result<AgentStream, VoiceError> {
    if !config.has_credential() {
        return Err(VoiceError::MissingCredential);
    }

    let mut request = config
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| VoiceError::InvalidRequest(e.to_string()))?;
    let auth = HeaderValue::from_str(&config.authorization())
        .map_err(|_| VoiceError::InvalidRequest("credential is not a valid header value".into()))?;
    request.headers_mut().insert(AUTHORIZATION, auth);

    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let (mut stream, response) =
        tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request))
            .await
            .map_err(|_| VoiceError::ConnectTimeout(config.connect_timeout_secs))?
            .map_err(VoiceError::Connect)?;
    tracing::debug!(status = %response.status(), url = %config.url, "agent handshake complete");

    let payload = serde_json::to_string(settings)?;
    stream
        .send(Message::text(payload))
        .await
        .map_err(VoiceError::Send)?;
    tracing::info!(url = %config.url, "agent session opened, settings sent");

    Ok(stream)
}
