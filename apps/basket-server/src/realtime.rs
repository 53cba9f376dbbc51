//! WebSocket transport for cart change notifications.
//!
//! `GET /ws?group_id=<uuid>` upgrades after a membership check, registers a
//! [`ChannelConnection`] with the hub and pumps events into the socket until either side
//! goes away. Client messages are ignored.

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use basket_events::Connection;
use basket_events_memory::ChannelConnection;
use basket_storage::GroupId;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::routes::Caller;
use crate::server::BasketServer;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    group_id: Option<String>,
}

pub async fn ws_handler(
    State(server): State<BasketServer>,
    Caller(caller): Caller,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    // Bad input is answered on the socket, so clients see one failure mode.
    let group_id = match params.group_id.as_deref().map(|raw| Uuid::parse_str(raw.trim())) {
        Some(Ok(id)) => GroupId(id),
        Some(Err(_)) => {
            return ws.on_upgrade(|socket| reject_socket(socket, "group_id must be a UUID"));
        }
        None => return ws.on_upgrade(|socket| reject_socket(socket, "group_id is required")),
    };

    if let Err(e) = server.assert_member(&group_id, &caller).await {
        tracing::info!(group_id = %group_id, profile_id = %caller, "refused realtime subscription");
        return e.into_response();
    }

    ws.on_upgrade(move |socket| serve_socket(server, group_id, socket))
}

async fn reject_socket(mut socket: WebSocket, reason: &'static str) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::from_static(reason),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn serve_socket(server: BasketServer, group_id: GroupId, socket: WebSocket) {
    let (conn, mut events) = ChannelConnection::new(server.config.ws_buffer);
    let connection_id = conn.id();

    if let Err(e) = server.hub.subscribe(&group_id, conn).await {
        tracing::warn!(group_id = %group_id, error = %e, "subscribe failed");
        return;
    }
    tracing::info!(
        group_id = %group_id,
        connection_id = %connection_id,
        subscribers = server.hub.subscriber_count(&group_id),
        "realtime client connected"
    );

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            event = events.recv() => {
                // None: the hub dropped us, usually because we fell behind.
                let Some(event) = event else { break };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode cart event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    if let Err(e) = server.hub.unsubscribe(&connection_id).await {
        tracing::warn!(connection_id = %connection_id, error = %e, "unsubscribe failed");
    }
    tracing::info!(group_id = %group_id, connection_id = %connection_id, "realtime client disconnected");
}
