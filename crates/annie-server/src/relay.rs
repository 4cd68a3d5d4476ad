//! The three concurrent paths of a bridged call.
//!
//! - [`receive_telephony`]: telephony frames to the inbound audio queue.
//! - [`send_upstream`]: queued audio and control messages to the agent.
//! - [`receive_upstream`]: agent audio to telephony, agent events to the
//!   dispatcher.
//!
//! Each path returns a [`RelayExit`] when it finishes. They share nothing
//! but the two queues, the stream-token watch, and the hangup token; the
//! lifecycle controller races them and cancels the rest.

use std::time::Duration;

use annie_types::CallStatus;
use annie_voice::AgentStream;
use axum::extract::ws::{Message as TelephonyMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as AgentMessage;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::EventDispatcher;
use crate::lifecycle::LifecycleRecorder;
use crate::telephony::{self, AudioAccumulator, TelephonyEvent};

/// Why a relay path finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// The telephony leg sent `stop`.
    TelephonyStopped,
    /// The telephony socket closed or failed.
    TelephonyClosed,
    /// The agent session closed or failed.
    UpstreamClosed,
    /// The inbound audio queue closed and everything in it was sent.
    SenderDrained,
    /// The hangup token was cancelled.
    Cancelled,
}

/// Reads telephony frames until `stop`, disconnect, or hangup.
///
/// Inbound audio is accumulated into fixed-size chunks and queued for the
/// agent. Dropping `audio_tx` on return tells the sender no more audio is
/// coming.
pub async fn receive_telephony(
    stream: &mut SplitStream<WebSocket>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    token_tx: watch::Sender<Option<String>>,
    recorder: &LifecycleRecorder,
    hangup: &CancellationToken,
) -> RelayExit {
    let mut accumulator = AudioAccumulator::default();

    loop {
        let message = tokio::select! {
            biased;
            () = hangup.cancelled() => return RelayExit::Cancelled,
            message = stream.next() => message,
        };

        let event = match message {
            Some(Ok(TelephonyMessage::Text(text))) => TelephonyEvent::parse(text.as_str().as_bytes()),
            Some(Ok(TelephonyMessage::Binary(bytes))) => TelephonyEvent::parse(&bytes),
            Some(Ok(TelephonyMessage::Close(_))) | None => {
                tracing::info!(pending_bytes = accumulator.pending(), "telephony stream closed");
                return RelayExit::TelephonyClosed;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "telephony receive failed");
                return RelayExit::TelephonyClosed;
            }
        };

        match event {
            Ok(TelephonyEvent::Start { stream_sid }) => {
                let first = token_tx.borrow().is_none();
                match stream_sid {
                    Some(sid) if first => {
                        tracing::info!(stream_sid = %sid, "telephony stream started");
                        token_tx.send_replace(Some(sid));
                        recorder.record_start().await;
                    }
                    Some(sid) => tracing::debug!(stream_sid = %sid, "repeated start frame"),
                    None => tracing::warn!("start frame carried no stream token"),
                }
            }
            Ok(TelephonyEvent::Media { inbound: true, audio }) => {
                for chunk in accumulator.push(&audio) {
                    tracing::trace!(bytes = chunk.len(), "queueing inbound audio");
                    if audio_tx.send(chunk).await.is_err() {
                        tracing::debug!("audio queue closed");
                        return RelayExit::UpstreamClosed;
                    }
                }
            }
            Ok(TelephonyEvent::Media { inbound: false, .. }) => {}
            Ok(TelephonyEvent::Stop) => {
                tracing::info!(pending_bytes = accumulator.pending(), "telephony stream stopped");
                recorder.record_end(CallStatus::Completed).await;
                return RelayExit::TelephonyStopped;
            }
            Ok(TelephonyEvent::Other(event)) => {
                tracing::debug!(event = %event, "ignoring telephony event");
            }
            Err(e) => tracing::warn!(error = %e, "dropping malformed telephony frame"),
        }
    }
}

/// Writes queued audio (binary) and control messages (text) to the agent.
///
/// Finishes once the audio queue is closed and drained, when a write fails,
/// or on hangup.
pub async fn send_upstream(
    sink: &mut SplitSink<AgentStream, AgentMessage>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    mut control_rx: mpsc::Receiver<String>,
    hangup: &CancellationToken,
) -> RelayExit {
    let mut control_open = true;

    loop {
        let message = tokio::select! {
            biased;
            () = hangup.cancelled() => return RelayExit::Cancelled,
            control = control_rx.recv(), if control_open => match control {
                Some(text) => AgentMessage::text(text),
                None => {
                    control_open = false;
                    continue;
                }
            },
            chunk = audio_rx.recv() => match chunk {
                Some(chunk) => AgentMessage::binary(chunk),
                None => return RelayExit::SenderDrained,
            },
        };

        if let Err(e) = sink.send(message).await {
            tracing::warn!(error = %e, "agent send failed");
            return RelayExit::UpstreamClosed;
        }
    }
}

/// Forwards agent audio to telephony and agent events to the dispatcher.
///
/// Audio waits up to `token_wait` for the stream token, then proceeds with
/// whatever token is current (possibly empty); a token that arrives later
/// is picked up for subsequent frames.
pub async fn receive_upstream(
    stream: &mut SplitStream<AgentStream>,
    telephony: &mut SplitSink<WebSocket, TelephonyMessage>,
    mut token_rx: watch::Receiver<Option<String>>,
    token_wait: Duration,
    dispatcher: &EventDispatcher,
    hangup: &CancellationToken,
) -> RelayExit {
    let waited = tokio::select! {
        biased;
        () = hangup.cancelled() => return RelayExit::Cancelled,
        waited = tokio::time::timeout(token_wait, token_rx.wait_for(Option::is_some)) => {
            waited.map(|token| token.is_ok())
        }
    };
    match waited {
        Ok(true) => {}
        Ok(false) => tracing::debug!("telephony ended before a stream token arrived"),
        Err(_) => tracing::warn!(
            wait_ms = token_wait.as_millis() as u64,
            "no stream token yet, forwarding agent audio without one"
        ),
    }

    loop {
        let message = tokio::select! {
            biased;
            () = hangup.cancelled() => return RelayExit::Cancelled,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(AgentMessage::Binary(audio))) => {
                let stream_sid = token_rx.borrow().clone().unwrap_or_default();
                let frame = telephony::media_frame(&stream_sid, &audio);
                if let Err(e) = telephony.send(TelephonyMessage::Text(frame.into())).await {
                    tracing::warn!(error = %e, "telephony send failed");
                    return RelayExit::TelephonyClosed;
                }
            }
            Some(Ok(AgentMessage::Text(text))) => dispatcher.dispatch(text.as_str()).await,
            Some(Ok(AgentMessage::Close(frame))) => {
                tracing::info!(frame = ?frame, "agent closed the session");
                return RelayExit::UpstreamClosed;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "agent receive failed");
                return RelayExit::UpstreamClosed;
            }
            None => {
                tracing::info!("agent stream ended");
                return RelayExit::UpstreamClosed;
            }
        }
    }
}
