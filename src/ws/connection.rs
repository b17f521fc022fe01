//! Per-socket read/write loop.
//!
//! Forwards queued notifications to the client and answers client commands
//! until the transport closes or the client logs out. The connection is
//! released from the registry on every exit path.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::messages::{ServerEvent, WsCommand, WsMessage};
use crate::domain::Connection;
use crate::domain::connection::OutboundReceiver;
use crate::service::ReconnectionHandler;

/// What the loop should do after handling a client text frame.
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    /// Send this JSON and keep going.
    Send(String),
    /// Send this JSON, then close.
    Close(String),
}

/// Runs the read/write loop for a single registered connection.
///
/// - Greets the client with its connection id.
/// - Forwards notifications from the outbound queue.
/// - Handles `ping` and `logout` commands.
pub async fn run_connection(
    socket: WebSocket,
    connection: Arc<Connection>,
    mut outbound: OutboundReceiver,
    handshakes: ReconnectionHandler,
) {
    let connection_id = connection.id();
    let user_id = connection.user_id();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let greeting = WsMessage::event(&ServerEvent::Connected {
        connection_id,
        user_id,
    });
    let mut open = send_text(&mut ws_tx, greeting.to_json()).await;

    while open {
        tokio::select! {
            // Incoming frame from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match handle_text_message(&text) {
                        Reply::Send(json) => open = send_text(&mut ws_tx, json).await,
                        Reply::Close(json) => {
                            tracing::info!(%user_id, %connection_id, "client logged out");
                            let _ = send_text(&mut ws_tx, json).await;
                            let _ = ws_tx.send(Message::Close(None)).await;
                            open = false;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => open = false,
                    Some(Err(err)) => {
                        tracing::debug!(%connection_id, error = %err, "ws transport error");
                        open = false;
                    }
                    _ => {}
                }
            }
            // Notification queued by the dispatcher
            queued = outbound.recv() => {
                match queued {
                    Some(notification) => {
                        let event = ServerEvent::Notification((*notification).clone());
                        open = send_text(&mut ws_tx, WsMessage::event(&event).to_json()).await;
                        if !open {
                            tracing::warn!(
                                %user_id,
                                %connection_id,
                                notification_id = %notification.id,
                                "notification lost: socket closed mid-send"
                            );
                        }
                    }
                    None => open = false,
                }
            }
        }
    }

    // Refuse further deliveries before the registry forgets the connection.
    let lost = discard_pending(&mut outbound, &connection);
    handshakes.release(user_id, connection_id).await;
    tracing::debug!(%user_id, %connection_id, lost, "ws connection closed");
}

/// Closes the outbound queue and reports every notification still in it as
/// a failed delivery. Returns how many were lost.
fn discard_pending(outbound: &mut OutboundReceiver, connection: &Connection) -> usize {
    outbound.close();
    let mut lost = 0usize;
    while let Ok(notification) = outbound.try_recv() {
        tracing::warn!(
            user_id = %connection.user_id(),
            connection_id = %connection.id(),
            notification_id = %notification.id,
            "notification lost: connection closed before send"
        );
        lost = lost.saturating_add(1);
    }
    lost
}

async fn send_text(ws_tx: &mut SplitSink<WebSocket, Message>, json: String) -> bool {
    ws_tx.send(Message::text(json)).await.is_ok()
}

/// Handles a text frame from the client.
fn handle_text_message(text: &str) -> Reply {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return Reply::Send(WsMessage::error(String::new(), 400, "malformed JSON").to_json());
    };

    match serde_json::from_value::<WsCommand>(msg.payload) {
        Ok(WsCommand::Ping) => Reply::Send(
            WsMessage::response(msg.id, serde_json::json!({ "pong": true })).to_json(),
        ),
        Ok(WsCommand::Logout) => Reply::Close(
            WsMessage::response(msg.id, serde_json::json!({ "logged_out": true })).to_json(),
        ),
        Err(_) => Reply::Send(WsMessage::error(msg.id, 404, "unknown command").to_json()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{Notification, UserId};
    use crate::ws::messages::WsMessageType;
    use tokio::sync::mpsc::error::TrySendError;

    fn command(id: &str, name: &str) -> String {
        serde_json::json!({
            "id": id,
            "type": "command",
            "timestamp": chrono::Utc::now(),
            "payload": { "command": name },
        })
        .to_string()
    }

    fn parse(reply: &str) -> WsMessage {
        let Ok(msg) = serde_json::from_str::<WsMessage>(reply) else {
            panic!("reply is not an envelope: {reply}");
        };
        msg
    }

    #[test]
    fn ping_gets_correlated_pong() {
        let Reply::Send(json) = handle_text_message(&command("req-1", "ping")) else {
            panic!("ping must not close");
        };
        let msg = parse(&json);
        assert_eq!(msg.id, "req-1");
        assert_eq!(msg.msg_type, WsMessageType::Response);
        assert_eq!(msg.payload.get("pong"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn logout_closes() {
        assert!(matches!(
            handle_text_message(&command("req-2", "logout")),
            Reply::Close(_)
        ));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let Reply::Send(json) = handle_text_message(&command("req-3", "subscribe")) else {
            panic!("unknown command must not close");
        };
        assert_eq!(parse(&json).msg_type, WsMessageType::Error);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let Reply::Send(json) = handle_text_message("{not json") else {
            panic!("malformed input must not close");
        };
        let msg = parse(&json);
        assert_eq!(msg.msg_type, WsMessageType::Error);
        assert_eq!(msg.payload.get("code"), Some(&serde_json::json!(400)));
    }

    #[test]
    fn queued_notifications_are_reported_on_close() {
        let user = UserId::new(12);
        let (connection, mut outbound) = Connection::open(user, "t".to_string(), 16);
        for n in 0..3 {
            let queued = connection.try_send(Arc::new(Notification::new(user, serde_json::json!(n))));
            assert!(queued.is_ok());
        }

        assert_eq!(discard_pending(&mut outbound, &connection), 3);

        let late = connection.try_send(Arc::new(Notification::new(user, serde_json::json!("late"))));
        assert!(matches!(late, Err(TrySendError::Closed(_))));
        assert_eq!(discard_pending(&mut outbound, &connection), 0);
    }
}
