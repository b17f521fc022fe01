//! A single live real-time connection.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::{ConnectionId, Notification, UserId};

/// Sending half of a connection's outbound notification queue.
pub type OutboundSender = mpsc::Sender<Arc<Notification>>;

/// Receiving half, drained by the socket task.
pub type OutboundReceiver = mpsc::Receiver<Arc<Notification>>;

/// One authenticated transport session bound to exactly one user.
///
/// Created after a successful handshake and dropped when the transport closes
/// or the client logs out. The owning user never changes.
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    token: String,
    created_at: DateTime<Utc>,
    outbound: OutboundSender,
}

impl Connection {
    /// Creates a connection with a freshly minted id together with the
    /// receiving end of its outbound queue.
    #[must_use]
    pub fn open(user_id: UserId, token: String, capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            user_id,
            token,
            created_at: Utc::now(),
            outbound,
        };
        (connection, rx)
    }

    /// Transport-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Owning user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Handshake completion time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Queues `notification` without waiting.
    ///
    /// # Errors
    ///
    /// Returns the channel error when the queue is full or the socket task
    /// has already gone away.
    pub fn try_send(
        &self,
        notification: Arc<Notification>,
    ) -> Result<(), mpsc::error::TrySendError<Arc<Notification>>> {
        self.outbound.try_send(notification)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("token", &format_args!("<redacted {} bytes>", self.token.len()))
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
