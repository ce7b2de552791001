/// Live notification gateway
///
/// `GET /v1/notifications/ws?token=<access token>` upgrades to a WebSocket.
/// Browsers cannot set headers on the upgrade request, so the access token
/// travels in the query string instead of `Authorization`.
///
/// # Protocol
///
/// ```text
/// server -> client  {"type":"notification","data":{...}}
/// server -> client  {"type":"event","event":"task.moved","data":{...}}
/// client -> server  {"type":"ping"}
/// server -> client  {"type":"pong"}
/// ```
///
/// A session listens to its user's room and its organization's room until
/// the client disconnects or the server shuts down.

use crate::{app::AppState, error::ApiResult, middleware::auth::authenticate_user};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tasklane_shared::{
    auth::middleware::AuthContext,
    notifications::{organization_room, user_room, HubMessage},
};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

/// Frames a client may send
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Ping,
}

/// Publishes an event to every session of an organization
pub async fn broadcast_event(
    state: &AppState,
    organization_id: Uuid,
    event: &str,
    data: serde_json::Value,
) {
    let delivered = state
        .hub
        .publish(
            &organization_room(organization_id),
            &HubMessage::Event {
                event: event.to_string(),
                data,
            },
        )
        .await;

    tracing::debug!(org_id = %organization_id, event, delivered, "Event published");
}

pub async fn notifications_ws(
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayQuery>,
    State(state): State<AppState>,
) -> ApiResult<Response> {
    let auth = authenticate_user(&state, &query.token).await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, auth)))
}

/// What to do with a frame read from a room
enum Forward {
    Send(String),
    Skip,
    Close,
}

fn forward(result: Result<String, RecvError>, room: &str) -> Forward {
    match result {
        Ok(frame) => Forward::Send(frame),
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(room, skipped, "Slow WebSocket client dropped frames");
            Forward::Skip
        }
        Err(RecvError::Closed) => Forward::Close,
    }
}

fn reply_to(text: &str) -> Option<String> {
    match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Ping) => Some(HubMessage::Pong.to_json()),
        Err(_) => None,
    }
}

#[tracing::instrument(skip(socket, state, auth), fields(user_id = %auth.user_id))]
async fn handle_socket(socket: WebSocket, state: AppState, auth: AuthContext) {
    let user_room = user_room(auth.user_id);
    let org_room = organization_room(auth.organization_id);

    let mut user_rx: broadcast::Receiver<String> = state.hub.subscribe(&user_room).await;
    let mut org_rx: broadcast::Receiver<String> = state.hub.subscribe(&org_room).await;

    tracing::info!("WebSocket session opened");

    let (mut sender, mut receiver) = socket.split();

    loop {
        let outgoing = tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            result = user_rx.recv() => forward(result, &user_room),
            result = org_rx.recv() => forward(result, &org_room),
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match reply_to(&text) {
                    Some(reply) => Forward::Send(reply),
                    None => {
                        tracing::debug!("Ignoring unknown client frame");
                        Forward::Skip
                    }
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => Forward::Skip,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    break;
                }
            },
        };

        match outgoing {
            Forward::Send(frame) => {
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            Forward::Skip => {}
            Forward::Close => break,
        }
    }

    drop(user_rx);
    drop(org_rx);
    state.hub.release(&user_room).await;
    state.hub.release(&org_room).await;

    tracing::info!("WebSocket session closed");
}
