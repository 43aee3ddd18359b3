use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use connect_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, presence
/// snapshot, then the event loop. Authentication happens upstream — the
/// gateway binds the connection to whatever identity the client presents.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for the Identify command
    let user_id = match wait_for_identify(&mut receiver).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    // Step 2: Send Ready
    let ready = GatewayEvent::Ready { user_id };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Step 3: Send the current presence snapshot so the client sees who is
    // already here before live updates start. Expiry is applied inside the
    // snapshot read.
    for presence in dispatcher.presence_snapshot() {
        let event = GatewayEvent::PresenceUpdate {
            user_id: presence.user_id,
            status: presence.status,
            custom_status: presence.custom_status,
        };
        if send_event(&mut sender, &event).await.is_err() {
            return;
        }
    }

    // Now register and go online (broadcasts to everyone else)
    let conn_id = dispatcher.user_connected(user_id).await;

    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_clone = dispatcher.clone();

    // Per-connection channel subscriptions (shared between send and recv
    // tasks). This is the server-side equivalent of "selecting" a channel.
    let subscribed_channels: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed_channels.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts -> client, with heartbeat
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
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    // Channel-scoped events only go to subscribed channels
                    if let Some(channel_id) = event.channel_id() {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&channel_id) {
                            continue;
                        }
                    }

                    if send_event(&mut sender, &event).await.is_err() {
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
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_subscriptions = subscribed_channels.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_clone, user_id, cmd, &recv_subscriptions);
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            log_preview(&text)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
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

    // Closing a connection never rolls back committed messages — it only
    // affects presence, and only if this connection still owns it.
    dispatcher.user_disconnected(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

/// First 200 bytes of a raw payload for logging, cut back to a char
/// boundary so a multi-byte character straddling the limit can't panic
/// the slice.
fn log_preview(text: &str) -> &str {
    let mut cut = text.len().min(200);
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    &text[..cut]
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(text.into())).await
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Option<Uuid> {
    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { user_id }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    return Some(user_id);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

fn handle_command(
    dispatcher: &Dispatcher,
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { channel_ids } => {
            info!("{} subscribing to {} channels", user_id, channel_ids.len());
            let mut subs = subscriptions.write().expect("subscription lock poisoned");
            *subs = channel_ids.into_iter().collect();
        }

        GatewayCommand::StartTyping { channel_id } => {
            dispatcher.broadcast(GatewayEvent::TypingStart {
                channel_id,
                user_id,
            });
        }

        GatewayCommand::SetStatus { status } => {
            dispatcher.set_status(user_id, status);
        }

        GatewayCommand::SetCustomStatus {
            emoji,
            text,
            expires_in,
        } => {
            dispatcher.set_custom_status(user_id, emoji, text, expires_in);
        }

        GatewayCommand::ClearCustomStatus => {
            dispatcher.clear_custom_status(user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_preview_cuts_multibyte_payload_on_char_boundary() {
        // 199 ASCII bytes, then a two-byte char straddling the 200-byte cut
        let payload = format!("{}é and more", "x".repeat(199));
        let preview = log_preview(&payload);
        assert_eq!(preview.len(), 199);
        assert!(preview.chars().all(|c| c == 'x'));
    }

    #[test]
    fn log_preview_keeps_short_payloads_whole() {
        assert_eq!(log_preview("not json"), "not json");
        assert_eq!(log_preview(""), "");
    }

    #[test]
    fn log_preview_caps_long_ascii_payloads_at_200() {
        let payload = "y".repeat(512);
        assert_eq!(log_preview(&payload).len(), 200);
    }
}
