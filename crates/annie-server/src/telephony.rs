//! Telephony media-stream framing.
//!
//! The telephony leg sends JSON control frames tagged by `event`. Audio is
//! 8 kHz mu-law, base64-encoded, 160 bytes (20 ms) per inbound frame.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Bytes forwarded to the agent per chunk: five 20 ms frames, 100 ms.
pub const CHUNK_BYTES: usize = 5 * 160;

/// One inbound telephony frame, reduced to what the bridge acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEvent {
    /// The media stream started and was assigned its stream token.
    Start { stream_sid: Option<String> },
    /// Decoded audio from one side of the call.
    Media { inbound: bool, audio: Vec<u8> },
    Stop,
    /// Any other event (`connected`, `mark`, `dtmf`, ...).
    Other(String),
}

/// Why an inbound telephony frame was dropped.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("media payload is not valid base64: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("frame has no event field")]
    MissingEvent,
}

#[derive(Deserialize)]
struct RawFrame {
    event: Option<String>,
    #[serde(rename = "streamSid")]
    stream_sid: Option<String>,
    start: Option<RawStart>,
    media: Option<RawMedia>,
}

#[derive(Deserialize)]
struct RawStart {
    #[serde(rename = "streamSid")]
    stream_sid: Option<String>,
}

#[derive(Deserialize)]
struct RawMedia {
    track: Option<String>,
    payload: Option<String>,
}

impl TelephonyEvent {
    /// Parses one frame, from either a text or a binary WebSocket message.
    pub fn parse(frame: &[u8]) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_slice(frame)?;
        let event = raw.event.ok_or(FrameError::MissingEvent)?;

        Ok(match event.as_str() {
            "start" => Self::Start {
                stream_sid: raw
                    .start
                    .and_then(|s| s.stream_sid)
                    .or(raw.stream_sid)
                    .filter(|s| !s.is_empty()),
            },
            "media" => {
                let media = raw.media.unwrap_or(RawMedia {
                    track: None,
                    payload: None,
                });
                // Streams configured for one track omit the label.
                let inbound = media
                    .track
                    .as_deref()
                    .map_or(true, |t| t == "inbound" || t == "inbound_track");
                let audio = match media.payload {
                    Some(payload) => STANDARD.decode(payload.as_bytes())?,
                    None => Vec::new(),
                };
                Self::Media { inbound, audio }
            }
            "stop" => Self::Stop,
            _ => Self::Other(event),
        })
    }
}

/// Outbound `media` frame carrying agent audio to the telephony leg.
pub fn media_frame(stream_sid: &str, audio: &[u8]) -> String {
    json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": STANDARD.encode(audio) }
    })
    .to_string()
}

/// Collects inbound audio into fixed-size chunks.
///
/// Only whole chunks are ever emitted; a partial remainder waits for more
/// audio and is discarded if the session ends first.
#[derive(Debug)]
pub struct AudioAccumulator {
    buffer: Vec<u8>,
    chunk_size: usize,
}

impl Default for AudioAccumulator {
    fn default() -> Self {
        Self::new(CHUNK_BYTES)
    }
}

impl AudioAccumulator {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(chunk_size * 2),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Appends audio and drains every complete chunk now available.
    pub fn push(&mut self, audio: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(audio);
        let mut chunks = Vec::new();
        while self.buffer.len() >= self.chunk_size {
            let rest = self.buffer.split_off(self.chunk_size);
            chunks.push(std::mem::replace(&mut self.buffer, rest));
        }
        chunks
    }

    /// Bytes held back waiting for a full chunk.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
