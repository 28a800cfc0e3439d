//! Owner mailbox with selective receive.
//!
//! Every notification a bridge emits lands in its owner's mailbox, tagged with
//! the bridge identity and, for notifications produced on behalf of a specific
//! blocking call, that call's [`CallId`].
//!
//! [`Mailbox::select`] is the selective wait: it takes the first notification
//! the picker accepts and keeps everything else, in arrival order, for later
//! consumers.

use std::collections::VecDeque;
use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};
use crate::message::{Ref, Topic};

/// Identity of a running bridge.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct BridgeId(Uuid);

impl BridgeId {
    /// Mint a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First segment is enough to tell bridges apart in logs
        let full = self.0.to_string();
        f.write_str(full.split('-').next().unwrap_or(&full))
    }
}

/// Identity of one blocking call, unique per bridge handle.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct CallId(pub u64);

/// What a notification reports.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    /// The socket connected.
    Connected,
    /// The socket disconnected.
    Disconnected {
        /// Disconnect reason.
        reason: Value,
    },
    /// A join was accepted.
    JoinOk {
        /// Joined topic.
        topic: Topic,
        /// Join response payload.
        payload: Value,
    },
    /// A join was refused.
    JoinError {
        /// Refused topic.
        topic: Topic,
        /// Refusal reason.
        reason: Value,
    },
    /// A leave request was accepted by the client.
    LeaveRef {
        /// Topic being left.
        topic: Topic,
        /// Ref of the leave request.
        reference: Ref,
    },
    /// A leave request was refused.
    LeaveError {
        /// Topic that could not be left.
        topic: Topic,
        /// Refusal reason.
        reason: Value,
    },
    /// A channel closed.
    ChannelClosed {
        /// Closed topic.
        topic: Topic,
        /// Close payload.
        payload: Value,
    },
    /// A message arrived on a joined topic.
    Message {
        /// Topic of the message.
        topic: Topic,
        /// Event name.
        event: String,
        /// Message payload.
        payload: Value,
    },
    /// A reply to a push arrived.
    Reply {
        /// Topic the push was sent on.
        topic: Topic,
        /// Ref of the push being answered.
        reference: Ref,
        /// Reply payload.
        payload: Value,
    },
}

/// A tagged notification delivered to an owner mailbox.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Bridge that emitted the notification.
    pub bridge: BridgeId,
    /// Blocking call the notification answers, if any.
    pub call: Option<CallId>,
    /// Notification body.
    pub kind: NotificationKind,
}

impl Notification {
    /// Whether this notification was emitted by `bridge`.
    #[must_use]
    pub fn is_from(&self, bridge: BridgeId) -> bool {
        self.bridge == bridge
    }

    /// Whether this notification answers `call` on `bridge`.
    #[must_use]
    pub fn answers(&self, bridge: BridgeId, call: CallId) -> bool {
        self.bridge == bridge && self.call == Some(call)
    }
}

/// Producer side of a mailbox. Cheap to clone.
#[derive(Clone, Debug)]
pub struct MailboxSender {
    tx: mpsc::UnboundedSender<Notification>,
}

impl MailboxSender {
    /// Append a notification. Returns `false` if the mailbox is gone.
    pub fn deliver(&self, notification: Notification) -> bool {
        match self.tx.send(notification) {
            Ok(()) => true,
            Err(mpsc::error::SendError(dropped)) => {
                log::warn!(
                    "[Mailbox] Owner gone, dropping {:?} from bridge {}",
                    dropped.kind,
                    dropped.bridge
                );
                false
            }
        }
    }
}

/// Owner inbox.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<Notification>,
    /// Received but not yet consumed, oldest first.
    deferred: VecDeque<Notification>,
}

impl Mailbox {
    /// Create a mailbox and its producer handle.
    #[must_use]
    pub fn channel() -> (MailboxSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MailboxSender { tx },
            Self {
                rx,
                deferred: VecDeque::new(),
            },
        )
    }

    /// Wait for the first notification `pick` accepts.
    ///
    /// `pick` returns `Ok(value)` to consume a notification or hands it back
    /// with `Err(notification)` to leave it in the mailbox. Notifications that
    /// are already buffered are offered first, oldest first.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Timeout`] if nothing matches before `deadline`, or
    /// [`BridgeError::Closed`] if every producer is gone and nothing buffered
    /// matches.
    pub async fn select<T, F>(&mut self, deadline: Instant, mut pick: F) -> BridgeResult<T>
    where
        F: FnMut(Notification) -> Result<T, Notification>,
    {
        let mut index = 0;
        while let Some(notification) = self.deferred.remove(index) {
            match pick(notification) {
                Ok(value) => return Ok(value),
                Err(notification) => {
                    self.deferred.insert(index, notification);
                    index += 1;
                }
            }
        }

        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(notification)) => match pick(notification) {
                    Ok(value) => return Ok(value),
                    Err(notification) => self.deferred.push_back(notification),
                },
                Ok(None) => return Err(BridgeError::Closed),
                Err(_) => return Err(BridgeError::Timeout),
            }
        }
    }

    /// Number of notifications waiting to be consumed.
    pub fn pending(&mut self) -> usize {
        self.pull_ready();
        self.deferred.len()
    }

    /// Remove and return every waiting notification, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        self.pull_ready();
        self.deferred.drain(..).collect()
    }

    /// Move everything already delivered into the buffer without waiting.
    fn pull_ready(&mut self) {
        while let Ok(notification) = self.rx.try_recv() {
            self.deferred.push_back(notification);
        }
    }
}
