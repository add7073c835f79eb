use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, trace, warn};
use uuid::Uuid;

use carmarket_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh socket may stay silent before `authenticate`.
const AUTHENTICATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection.
///
/// `session_user` is the user owning the session cookie sent with the upgrade
/// request. The client must still send `{"type":"authenticate","userId":..}`
/// naming that same user before it receives anything.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, session_user: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for the authenticate command
    let Some(user_id) = wait_for_authenticate(&mut receiver, session_user).await else {
        warn!("WebSocket client failed to authenticate, closing");
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    info!(%user_id, "connected to gateway");

    // Step 2: Confirm
    if !send_event(&mut sender, &GatewayEvent::Authenticated { user_id }).await {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, user_id).await;
}

/// A claimed id is accepted only when it matches the cookie's session.
pub fn authorize(claimed: Uuid, session_user: Option<Uuid>) -> bool {
    session_user == Some(claimed)
}

async fn wait_for_authenticate(
    receiver: &mut SplitStream<WebSocket>,
    session_user: Option<Uuid>,
) -> Option<Uuid> {
    let handshake = async {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let Ok(GatewayCommand::Authenticate { user_id }) =
                        serde_json::from_str::<GatewayCommand>(&text)
                    else {
                        warn!("expected authenticate, got: {}", preview(&text));
                        continue;
                    };

                    if authorize(user_id, session_user) {
                        return Some(user_id);
                    }
                    warn!(claimed = %user_id, session = ?session_user, "authenticate does not match session");
                    return None;
                }
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    };

    tokio::time::timeout(AUTHENTICATE_TIMEOUT, handshake)
        .await
        .ok()
        .flatten()
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    user_id: Uuid,
) {
    // Subscribe before going online so our own presence event is not missed
    let mut broadcast_rx = dispatcher.subscribe();
    let (conn_id, mut user_rx) = dispatcher.connect(user_id).await;

    // Tell this client who is already here
    for uid in dispatcher.online_users().await {
        if uid == user_id {
            continue;
        }
        let event = GatewayEvent::UserStatusUpdate {
            user_id: uid,
            online: true,
        };
        if !send_event(&mut sender, &event).await {
            dispatcher.disconnect(user_id, conn_id).await;
            return;
        }
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} messages", n);
                            continue;
                        }
                        Err(_) => break,
                    };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read from client. Only control frames matter after authentication.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Text(text) => {
                    trace!(%user_id, "ignoring client text frame: {}", preview(&text));
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(user_id, conn_id).await;
    info!(%user_id, "disconnected from gateway");
}

/// First 200 characters, for logs.
fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Serialize and send. Returns false once the socket is unusable.
async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &GatewayEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}
