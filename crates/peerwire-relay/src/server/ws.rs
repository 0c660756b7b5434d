//! WebSocket connect endpoint.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{error, warn};

use peerwire_core::ParticipantId;

use super::AppState;
use crate::connection::WsConnection;

/// Query parameters identifying both sides of the call.
#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userID", default)]
    pub user_id: String,
    #[serde(rename = "peerID", default)]
    pub peer_id: String,
}

/// Validate the ids, then upgrade and hand the socket to the relay.
pub async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Response {
    let (participant, peer) = match (
        ParticipantId::parse(&params.user_id),
        ParticipantId::parse(&params.peer_id),
    ) {
        (Ok(participant), Ok(peer)) => (participant, peer),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Rejecting connection request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let relay = Arc::clone(&state.relay);
    ws.max_message_size(state.max_frame_bytes)
        .max_frame_size(state.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let who = participant.clone();
            if let Err(e) = relay
                .accept(WsConnection::new(socket), participant, peer)
                .await
            {
                error!(participant = %who, error = %e, "Session setup failed");
            }
        })
}
