//! Telephony media-stream endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, OriginalUri},
    response::IntoResponse,
    Extension,
};

use crate::bridge::run_bridge;
use crate::call_target::CallTarget;
use crate::AppState;

/// Upgrades `/ws` and `/ws/...` connections and bridges them to the agent.
///
/// The call ID is resolved from the raw, still percent-encoded URI.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    OriginalUri(uri): OriginalUri,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let target = CallTarget::resolve(uri.path(), uri.query());
    tracing::info!(
        remote_addr = %addr,
        path = uri.path(),
        call_id = ?target.call_id,
        agent_hint = ?target.agent_hint,
        "telephony stream connecting"
    );

    ws.on_upgrade(move |socket| run_bridge(socket, state, target))
}
