// SPDX-License-Identifier: MIT OR Apache-2.0
//! WebSocket event stream.
//!
//! Clients authenticate with their bearer token (header or `?token=`),
//! get registered in the subscriber registry under their principal id, and
//! receive `{type, payload}` frames routed by the broadcaster. Inbound
//! frames manage group and chat membership.

use crate::auth::authenticate;
use crate::routes::GatewayRejection;
use crate::AppState;
use agw_error::AgentError;
use agw_events::{Frame, SubscriberHandle, SubscriberRegistry};
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Inbound control frames from the client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ControlFrame {
    /// Join a broadcast group.
    JoinGroup {
        /// Group name (e.g. `"sales_dashboard"`).
        group: String,
    },
    /// Leave a broadcast group.
    LeaveGroup {
        /// Group name.
        group: String,
    },
    /// Attach to a chat session.
    JoinChat {
        /// Chat id.
        chat_id: String,
    },
}

/// `GET /ws` — upgrade to the event stream.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    upgrade: WebSocketUpgrade,
) -> Result<Response, GatewayRejection> {
    // Browsers cannot set headers on WS handshakes; accept ?token= too.
    let principal = match authenticate(&headers, &state.secret_key) {
        Ok(principal) => principal,
        Err(_) => {
            let token = query
                .get("token")
                .ok_or_else(|| AgentError::unauthenticated("missing bearer token"))?;
            agw_auth::verify_token(token, &state.secret_key)?
        }
    };

    let subscribers = Arc::clone(&state.subscribers);
    Ok(upgrade.on_upgrade(move |socket| serve_socket(socket, subscribers, principal.id)))
}

async fn serve_socket(
    socket: WebSocket,
    subscribers: Arc<SubscriberRegistry>,
    principal_id: String,
) {
    let (handle, rx) = subscribers.subscribe(&principal_id);
    info!(principal = %principal_id, "websocket subscriber connected");
    pump(socket, Arc::clone(&subscribers), handle, rx).await;
    subscribers.unsubscribe(handle);
    info!(principal = %principal_id, "websocket subscriber disconnected");
}

async fn pump(
    socket: WebSocket,
    subscribers: Arc<SubscriberRegistry>,
    handle: SubscriberHandle,
    mut rx: mpsc::UnboundedReceiver<Frame>,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    let Ok(text) = serde_json::to_string(&frame) else { continue };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    handle_control(&subscribers, handle, &text);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

fn handle_control(subscribers: &SubscriberRegistry, handle: SubscriberHandle, text: &str) {
    match serde_json::from_str::<ControlFrame>(text) {
        Ok(ControlFrame::JoinGroup { group }) => {
            debug!(group = %group, "subscriber joined group");
            subscribers.join_group(handle, group);
        }
        Ok(ControlFrame::LeaveGroup { group }) => {
            subscribers.leave_group(handle, &group);
        }
        Ok(ControlFrame::JoinChat { chat_id }) => {
            subscribers.join_chat(handle, chat_id);
        }
        Err(err) => debug!(error = %err, "ignoring malformed control frame"),
    }
}
