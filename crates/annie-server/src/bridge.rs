//! The lifecycle controller for one bridged call.
//!
//! Resolves context, opens the agent session, races the three relay paths,
//! and on every exit path records the call end and closes both sockets.

use std::sync::Arc;
use std::time::Duration;

use annie_types::CallStatus;
use annie_voice::{compose_prompt, compose_settings, open_session, personalization_block, AgentStream};
use axum::extract::ws::{Message as TelephonyMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as AgentMessage;
use tracing::Instrument;
use uuid::Uuid;

use crate::call_target::CallTarget;
use crate::context::load_session_context;
use crate::dispatcher::EventDispatcher;
use crate::functions::FunctionExecutor;
use crate::lifecycle::LifecycleRecorder;
use crate::relay::{self, RelayExit};
use crate::AppState;

/// Upper bound on flushing queued audio after a `stop` frame.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on each close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Bridges one accepted telephony socket to a new agent session.
pub async fn run_bridge(socket: WebSocket, state: Arc<AppState>, target: CallTarget) {
    let session_id = Uuid::new_v4();
    let span = tracing::info_span!("bridge", %session_id, call_id = ?target.call_id);
    bridge_session(socket, state, target).instrument(span).await;
}

async fn bridge_session(socket: WebSocket, state: Arc<AppState>, target: CallTarget) {
    let context = load_session_context(&state.pool, &target, state.prompts.default_persona()).await;
    tracing::info!(
        call_id = ?context.call_id,
        persona = %context.persona,
        persona_source = context.persona_source.as_str(),
        patient_id = ?context.patient_id,
        "bridge session starting"
    );

    let instructions = state.prompts.load(&context.persona).await;
    let personalization = state
        .bridge
        .personalized_greeting
        .then(|| {
            context
                .patient
                .as_ref()
                .map(|patient| personalization_block(patient, context.org.as_ref()))
        })
        .flatten();
    let settings = compose_settings(
        &state.agent,
        compose_prompt(&instructions, personalization.as_deref()),
    );

    let recorder = Arc::new(LifecycleRecorder::new(state.pool.clone(), context.call_id));
    let (mut telephony_tx, mut telephony_rx) = socket.split();

    let agent = match open_session(&state.agent, &settings).await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::error!(
                error = %e,
                call_id = ?context.call_id,
                persona = %context.persona,
                "could not open agent session, dropping call"
            );
            recorder.record_failure().await;
            close_telephony(&mut telephony_tx).await;
            return;
        }
    };
    let (mut agent_tx, mut agent_rx) = agent.split();

    let (audio_tx, audio_rx) = mpsc::channel(state.bridge.audio_queue_capacity.max(1));
    let (control_tx, control_rx) = mpsc::channel(state.bridge.control_queue_capacity.max(1));
    let (token_tx, token_rx) = watch::channel(None);
    let hangup = state.shutdown.child_token();

    let executor = FunctionExecutor::new(
        state.pool.clone(),
        state.emergency_api.clone(),
        context.call_id,
        context.patient_id,
    );
    let dispatcher = EventDispatcher::new(recorder.clone(), executor, control_tx);

    let exit = {
        let inbound =
            relay::receive_telephony(&mut telephony_rx, audio_tx, token_tx, &recorder, &hangup);
        let sender = relay::send_upstream(&mut agent_tx, audio_rx, control_rx, &hangup);
        let upstream = relay::receive_upstream(
            &mut agent_rx,
            &mut telephony_tx,
            token_rx,
            state.bridge.stream_token_wait(),
            &dispatcher,
            &hangup,
        );
        tokio::pin!(inbound, sender, upstream);

        tokio::select! {
            exit = &mut inbound => {
                if exit == RelayExit::TelephonyStopped
                    && tokio::time::timeout(DRAIN_TIMEOUT, &mut sender).await.is_err()
                {
                    tracing::warn!("timed out flushing audio to agent");
                }
                exit
            }
            exit = &mut sender => exit,
            exit = &mut upstream => exit,
        }
    };
    hangup.cancel();

    if recorder.has_started() && !recorder.has_ended() {
        recorder.record_end(CallStatus::Completed).await;
    }

    close_agent(&mut agent_tx).await;
    close_telephony(&mut telephony_tx).await;

    tracing::info!(
        exit = ?exit,
        call_id = ?context.call_id,
        persona = %context.persona,
        "bridge session ended"
    );
}

async fn close_telephony(sink: &mut SplitSink<WebSocket, TelephonyMessage>) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "telephony close failed"),
        Err(_) => tracing::debug!("telephony close timed out"),
    }
}

async fn close_agent(sink: &mut SplitSink<AgentStream, AgentMessage>) {
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "agent close failed"),
        Err(_) => tracing::debug!("agent close timed out"),
    }
}
