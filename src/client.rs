//! WebSocket client for the notification gateway.
//!
//! ```no_run
//! # async fn demo(token: &str) -> Result<(), notify_gateway::client::ClientError> {
//! use notify_gateway::client::NotificationClient;
//! use notify_gateway::domain::UserId;
//!
//! let client = NotificationClient::connect("ws://127.0.0.1:3000", UserId::new(42), token).await?;
//! client.on_notification(|n| println!("{}", n.payload));
//! client.disconnect().await
//! # }
//! ```
//!
//! The client keeps no history. After a disconnect, a new
//! [`NotificationClient::connect`] yields a new connection id and only
//! notifications dispatched from then on.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::domain::{ConnectionId, Notification, UserId};
use crate::ws::messages::{ServerEvent, WsMessage, WsMessageType};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Callback = Box<dyn Fn(&Notification) + Send + Sync>;
type Callbacks = Arc<Mutex<Vec<Callback>>>;

/// How long [`NotificationClient::disconnect`] waits for the server's close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client-side failures.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// WebSocket transport or HTTP upgrade failure, including a refused
    /// handshake.
    #[error("transport error: {0}")]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),

    /// The token cannot be carried in an `Authorization` header.
    #[error("token is not a valid header value")]
    InvalidToken,

    /// The socket closed before the server announced the connection.
    #[error("connection closed before greeting")]
    NoGreeting,

    /// The first server message was not a `connected` event.
    #[error("unexpected greeting: {0}")]
    UnexpectedGreeting(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// A live connection to the gateway.
pub struct NotificationClient {
    user_id: UserId,
    connection_id: ConnectionId,
    sink: SplitSink<Socket, Message>,
    callbacks: Callbacks,
    reader: JoinHandle<()>,
}

impl NotificationClient {
    /// Opens a connection for `user_id` authenticated with `token`.
    ///
    /// `base_url` is the gateway's WebSocket origin, e.g.
    /// `ws://127.0.0.1:3000`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the server refuses the
    /// handshake (401) or the socket fails, [`ClientError::InvalidToken`]
    /// if `token` cannot be sent as a header, and a greeting error if the
    /// server does not announce the connection.
    pub async fn connect(base_url: &str, user_id: UserId, token: &str) -> Result<Self, ClientError> {
        let request = handshake_request(base_url, user_id, token)?;
        let (stream, _response) = connect_async(request).await?;
        let (sink, mut source) = stream.split();

        let connection_id = read_greeting(&mut source).await?;
        tracing::debug!(%user_id, %connection_id, "connected to gateway");

        let callbacks: Callbacks = Arc::new(Mutex::new(Vec::new()));
        let reader = tokio::spawn(read_loop(source, Arc::clone(&callbacks)));

        Ok(Self {
            user_id,
            connection_id,
            sink,
            callbacks,
            reader,
        })
    }

    /// Registers a callback invoked for every notification received from
    /// now on.
    pub fn on_notification<F>(&self, callback: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.push(Box::new(callback));
        }
    }

    /// Connection id announced by the server.
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// User this connection is bound to.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Closes the connection and waits for the reader task to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the close frame cannot be sent.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        let sent = self.sink.send(Message::Close(None)).await;
        self.finish().await;
        sent.map_err(ClientError::from)
    }

    /// Sends the `logout` command; the server acknowledges and closes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the command cannot be sent.
    pub async fn logout(mut self) -> Result<(), ClientError> {
        let command = WsMessage {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Command,
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({ "command": "logout" }),
        };
        let sent = self.sink.send(Message::text(command.to_json())).await;
        self.finish().await;
        sent.map_err(ClientError::from)
    }

    async fn finish(self) {
        let mut reader = self.reader;
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut reader).await.is_err() {
            reader.abort();
        }
    }
}

impl fmt::Debug for NotificationClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationClient")
            .field("user_id", &self.user_id)
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

/// Upgrade request for `user_id`; the token travels as a bearer header so
/// it never needs escaping into the query string.
fn handshake_request(base_url: &str, user_id: UserId, token: &str) -> Result<Request, ClientError> {
    let url = format!("{}/ws?user_id={user_id}", base_url.trim_end_matches('/'));
    let mut request = url.into_client_request()?;
    let bearer =
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ClientError::InvalidToken)?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

async fn read_greeting(source: &mut SplitStream<Socket>) -> Result<ConnectionId, ClientError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => {
                return match parse_event(&text) {
                    Some(ServerEvent::Connected { connection_id, .. }) => Ok(connection_id),
                    _ => Err(ClientError::UnexpectedGreeting(text.to_string())),
                };
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(_)) | None => return Err(ClientError::NoGreeting),
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

async fn read_loop(mut source: SplitStream<Socket>, callbacks: Callbacks) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Some(ServerEvent::Notification(notification)) = parse_event(&text)
                    && let Ok(callbacks) = callbacks.lock()
                {
                    for callback in callbacks.iter() {
                        callback(&notification);
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "gateway connection lost");
                break;
            }
        }
    }
}

/// Extracts a server event from an envelope; responses and errors yield
/// `None`.
fn parse_event(text: &str) -> Option<ServerEvent> {
    let msg = serde_json::from_str::<WsMessage>(text).ok()?;
    if msg.msg_type != WsMessageType::Event {
        return None;
    }
    serde_json::from_value(msg.payload).ok()
}
