//! Blocking correlation bridge.
//!
//! `Bridge` lets synchronous code drive an event-driven [`ProtocolClient`]
//! with ordinary blocking calls. Each bridge runs its own socket task (actor)
//! that owns the client and a [`SyncHandler`]; the handle talks to it only by
//! message passing.
//!
//! # Architecture
//!
//! ```text
//! caller thread                      socket task (tokio)
//! ─────────────                      ───────────────────
//! Bridge::join() ──Control::Join──>  SyncHandler::on_control ──> client.join()
//!      │                                                             │
//!      │            Mailbox  <──Notification(JoinOk, call)── on_joined() <─ SocketEvent
//!      └── select(call, deadline) ─────┘
//! ```
//!
//! Every blocking call suspends only the calling thread, at one selective
//! wait on the mailbox with a deadline. The socket task keeps forwarding
//! events while the caller waits.
//!
//! # Timeouts
//!
//! A timeout abandons the wait, not the action: a join that times out may
//! still be accepted later. Join and leave answers are tagged with the call
//! that requested them, so such a late answer stays in the mailbox instead of
//! satisfying a later call. Connect status and messages are not tied to a
//! call and are consumed by whichever call asks for them first.
//!
//! # Runtime
//!
//! [`Bridge::start`] spawns onto the ambient tokio runtime when there is one
//! and otherwise creates a small dedicated runtime. Blocking calls must not be
//! made from inside an async context; use `spawn_blocking` or a plain thread.
//!
//! # Example
//!
//! ```ignore
//! let (client, remote) = ScriptedClient::new();
//! let mut bridge = Bridge::start(BridgeConfig::default().with_auto_connect(false), client)?;
//!
//! bridge.connect()?;
//! remote.connected();
//! bridge.wait_connect_status(Duration::from_secs(1))?;
//!
//! remote.auto_join(json!({"id": 1}));
//! let (topic, reply) = bridge.join("room:1", json!({}), Duration::from_secs(1))?;
//! ```
//!
//! Rust guideline compliant 2026-01

pub mod commands;
pub mod handler;
pub mod state;

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::mailbox::{BridgeId, CallId, Mailbox, Notification, NotificationKind};
use crate::message::{Ref, Topic};
use crate::socket::{self, ProtocolClient};

pub use commands::{BridgeControl, BridgeInbound, BridgeQuery, BridgeReply};
pub use handler::SyncHandler;
pub use state::{BridgeStatus, ConnectionState, TopicState};

/// Stand-in deadline for timeouts too long to represent as an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Outcome of [`Bridge::wait_connect_status`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectStatus {
    /// The socket connected.
    Connected,
    /// The socket disconnected, with the reason given by the client.
    Disconnected(Value),
}

/// A message received by [`Bridge::await_message`].
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    /// Topic the message arrived on.
    pub topic: Topic,
    /// Event name.
    pub event: String,
    /// Message payload.
    pub payload: Value,
}

/// Runtime the bridge's socket task runs on.
#[derive(Debug)]
struct BridgeRuntime {
    handle: Handle,
    /// Present when no ambient runtime existed at start.
    _owned: Option<Runtime>,
}

impl BridgeRuntime {
    fn ambient_or_owned() -> BridgeResult<Self> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(Self {
                handle,
                _owned: None,
            });
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("channel-bridge")
            .enable_all()
            .build()
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            _owned: Some(runtime),
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

/// Handle to a running bridge.
///
/// Owned exclusively by whoever started it. Dropping the handle stops the
/// socket task.
#[derive(Debug)]
pub struct Bridge {
    id: BridgeId,
    inbound: mpsc::UnboundedSender<BridgeInbound>,
    mailbox: Mailbox,
    next_call: u64,
    default_timeout: Duration,
    task: Option<JoinHandle<()>>,
    // Declared last so the task handle is released before an owned runtime
    // shuts down.
    runtime: BridgeRuntime,
}

impl Bridge {
    /// Start a bridge around `client`.
    ///
    /// If `config.auto_connect` is set, a connection is requested
    /// immediately; otherwise the bridge stays idle until [`Bridge::connect`].
    ///
    /// # Errors
    ///
    /// [`BridgeError::Runtime`] if no runtime is available and one cannot be
    /// created.
    pub fn start<C>(config: BridgeConfig, client: C) -> BridgeResult<Self>
    where
        C: ProtocolClient + 'static,
    {
        let runtime = BridgeRuntime::ambient_or_owned()?;
        Ok(Self::spawn(runtime, config, client))
    }

    /// Start a bridge on a specific runtime.
    pub fn start_on<C>(handle: Handle, config: BridgeConfig, client: C) -> Self
    where
        C: ProtocolClient + 'static,
    {
        let runtime = BridgeRuntime {
            handle,
            _owned: None,
        };
        Self::spawn(runtime, config, client)
    }

    fn spawn<C>(runtime: BridgeRuntime, config: BridgeConfig, client: C) -> Self
    where
        C: ProtocolClient + 'static,
    {
        let id = BridgeId::new();
        let (mailbox_tx, mailbox) = Mailbox::channel();
        let (inbound, inbound_rx) = mpsc::unbounded_channel();

        let handler = SyncHandler::new(
            id,
            mailbox_tx,
            config.url.clone(),
            config.query_params.clone(),
            config.auto_connect,
            config.serializer.build(),
        );

        log::info!(
            "[Bridge {}] Starting (url={}, auto_connect={})",
            id,
            config.url,
            config.auto_connect
        );
        let task = runtime.handle.spawn(socket::run(handler, client, inbound_rx));

        Self {
            id,
            inbound,
            mailbox,
            next_call: 0,
            default_timeout: config.default_timeout(),
            task: Some(task),
            runtime,
        }
    }

    /// Identity carried by every notification this bridge emits.
    #[must_use]
    pub fn id(&self) -> BridgeId {
        self.id
    }

    /// Timeout configured as the default for this bridge.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Whether the socket task is still accepting requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.inbound.is_closed()
    }

    // ============================================================
    // Connection
    // ============================================================

    /// Request a (re)connect with the configured URL. Does not wait.
    pub fn connect(&self) -> BridgeResult<()> {
        self.control(BridgeControl::Connect)
    }

    /// Request a (re)connect with a different URL and query parameters,
    /// which replace the configured ones. Does not wait.
    pub fn connect_to(
        &self,
        url: impl Into<String>,
        query_params: Vec<(String, String)>,
    ) -> BridgeResult<()> {
        self.control(BridgeControl::ConnectTo {
            url: url.into(),
            query_params,
        })
    }

    /// Wait for the next connected or disconnected notification.
    pub fn wait_connect_status(&mut self, timeout: Duration) -> BridgeResult<ConnectStatus> {
        let id = self.id;
        self.wait(timeout, |n| match n {
            Notification {
                bridge,
                kind: NotificationKind::Connected,
                ..
            } if bridge == id => Ok(ConnectStatus::Connected),
            Notification {
                bridge,
                kind: NotificationKind::Disconnected { reason },
                ..
            } if bridge == id => Ok(ConnectStatus::Disconnected(reason)),
            other => Err(other),
        })
    }

    // ============================================================
    // Channels
    // ============================================================

    /// Join a topic and wait for the remote answer.
    ///
    /// Returns the joined topic and the join response payload.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Rejected`] with the refusal reason, or
    /// [`BridgeError::Timeout`] if no answer arrives in time.
    pub fn join(
        &mut self,
        topic: impl Into<Topic>,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<(Topic, Value)> {
        let topic = topic.into();
        let call = self.next_call();
        log::debug!("[Bridge {}] Joining {} (call {:?})", self.id, topic, call);
        self.control(BridgeControl::Join {
            call,
            topic,
            payload,
        })?;

        let id = self.id;
        self.wait(timeout, |n| {
            if !n.answers(id, call) {
                return Err(n);
            }
            match n.kind {
                NotificationKind::JoinOk { topic, payload } => Ok(Ok((topic, payload))),
                NotificationKind::JoinError { reason, .. } => Ok(Err(BridgeError::Rejected(reason))),
                kind => Err(Notification { kind, ..n }),
            }
        })?
    }

    /// Leave a topic, waiting first for the leave acknowledgment and then for
    /// the channel to close.
    ///
    /// `timeout` bounds each of the two waits independently. Returns the
    /// channel close payload.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Rejected`] if the leave is refused (the close is not
    /// awaited then), or [`BridgeError::Timeout`].
    pub fn leave(
        &mut self,
        topic: impl Into<Topic>,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        let topic = topic.into();
        let call = self.next_call();
        log::debug!("[Bridge {}] Leaving {} (call {:?})", self.id, topic, call);
        self.control(BridgeControl::Leave {
            call,
            topic,
            payload,
        })?;

        let id = self.id;
        let reference: Ref = self.wait(timeout, |n| {
            if !n.answers(id, call) {
                return Err(n);
            }
            match n.kind {
                NotificationKind::LeaveRef { reference, .. } => Ok(Ok(reference)),
                NotificationKind::LeaveError { reason, .. } => Ok(Err(BridgeError::Rejected(reason))),
                kind => Err(Notification { kind, ..n }),
            }
        })??;
        log::debug!("[Bridge {}] Leave acknowledged (ref {})", self.id, reference);

        self.wait(timeout, |n| {
            if !n.answers(id, call) {
                return Err(n);
            }
            match n.kind {
                NotificationKind::ChannelClosed { payload, .. } => Ok(payload),
                kind => Err(Notification { kind, ..n }),
            }
        })
    }

    /// Whether the protocol client reports the topic as joined.
    ///
    /// Answered by the socket task after any push it is still performing, so
    /// the wait is bounded by [`Bridge::default_timeout`].
    pub fn is_joined(&self, topic: impl Into<Topic>) -> BridgeResult<bool> {
        let (msg, rx) = BridgeQuery::is_joined(topic.into());
        match self.query(msg, rx, self.default_timeout)? {
            BridgeReply::IsJoined(joined) => Ok(joined),
            other => Err(unexpected_reply(&other)),
        }
    }

    // ============================================================
    // Messages
    // ============================================================

    /// Push a message and return the ref its reply will carry.
    ///
    /// Waits only for the protocol client to accept the push, bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Rejected`] if the client refuses the push, or
    /// [`BridgeError::Timeout`].
    pub fn push(
        &self,
        topic: impl Into<Topic>,
        event: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<Ref> {
        let (msg, rx) = BridgeQuery::push(topic.into(), event, payload);
        match self.query(msg, rx, timeout)? {
            BridgeReply::Pushed(result) => result.map_err(BridgeError::Rejected),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Push a message and wait for the reply carrying its ref.
    ///
    /// `timeout` bounds the push and the reply wait independently. Replies
    /// for other refs are left in the mailbox.
    pub fn push_sync(
        &mut self,
        topic: impl Into<Topic>,
        event: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        let topic = topic.into();
        let reference = self.push(topic.clone(), event, payload, timeout)?;
        self.await_reply(&topic, &reference, timeout)
    }

    /// Wait for the reply to an earlier [`Bridge::push`].
    pub fn await_reply(
        &mut self,
        topic: &Topic,
        reference: &Ref,
        timeout: Duration,
    ) -> BridgeResult<Value> {
        let id = self.id;
        self.wait(timeout, |n| {
            let answers = n.is_from(id)
                && matches!(
                    &n.kind,
                    NotificationKind::Reply { topic: t, reference: r, .. }
                        if t == topic && r == reference
                );
            if !answers {
                return Err(n);
            }
            match n.kind {
                NotificationKind::Reply { payload, .. } => Ok(payload),
                kind => Err(Notification { kind, ..n }),
            }
        })
    }

    /// Wait for the next message on any topic.
    pub fn await_message(&mut self, timeout: Duration) -> BridgeResult<IncomingMessage> {
        let id = self.id;
        self.wait(timeout, |n| match n {
            Notification {
                bridge,
                kind:
                    NotificationKind::Message {
                        topic,
                        event,
                        payload,
                    },
                ..
            } if bridge == id => Ok(IncomingMessage {
                topic,
                event,
                payload,
            }),
            other => Err(other),
        })
    }

    // ============================================================
    // Introspection
    // ============================================================

    /// Snapshot of the bridge's connection and topic states.
    ///
    /// Bounded by [`Bridge::default_timeout`], like [`Bridge::is_joined`].
    pub fn status(&self) -> BridgeResult<BridgeStatus> {
        let (msg, rx) = BridgeQuery::status();
        match self.query(msg, rx, self.default_timeout)? {
            BridgeReply::Status(status) => Ok(status),
            other => Err(unexpected_reply(&other)),
        }
    }

    /// Number of notifications waiting in the mailbox.
    pub fn pending_notifications(&mut self) -> usize {
        self.mailbox.pending()
    }

    /// Remove and return every waiting notification, oldest first.
    pub fn drain_mailbox(&mut self) -> Vec<Notification> {
        self.mailbox.drain()
    }

    /// Stop the socket task and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    // ============================================================
    // Internals
    // ============================================================

    fn next_call(&mut self) -> CallId {
        self.next_call += 1;
        CallId(self.next_call)
    }

    fn control(&self, control: BridgeControl) -> BridgeResult<()> {
        self.inbound
            .send(control.into_inbound())
            .map_err(|_| BridgeError::Closed)
    }

    fn query(
        &self,
        msg: BridgeInbound,
        rx: tokio::sync::oneshot::Receiver<BridgeReply>,
        timeout: Duration,
    ) -> BridgeResult<BridgeReply> {
        self.inbound.send(msg).map_err(|_| BridgeError::Closed)?;
        self.runtime.block_on(async move {
            tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| BridgeError::Timeout)?
                .map_err(|_| BridgeError::Closed)
        })
    }

    fn wait<T, F>(&mut self, timeout: Duration, pick: F) -> BridgeResult<T>
    where
        F: FnMut(Notification) -> Result<T, Notification>,
    {
        let now = Instant::now();
        // Saturate very long timeouts (e.g. Duration::MAX) to "far away".
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.runtime.block_on(self.mailbox.select(deadline, pick))
    }

    fn shutdown(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        log::info!("[Bridge {}] Stopping", self.id);

        // Closing the inbound channel ends the socket loop.
        let (closed, _) = mpsc::unbounded_channel();
        drop(std::mem::replace(&mut self.inbound, closed));

        if Handle::try_current().is_err() {
            let _ = self.runtime.block_on(task);
        }
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unexpected_reply(reply: &BridgeReply) -> BridgeError {
    BridgeError::Runtime(format!("unexpected reply {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedClient;
    use serde_json::json;

    fn idle_config() -> BridgeConfig {
        BridgeConfig::new("ws://test/socket").with_auto_connect(false)
    }

    #[test]
    fn test_ids_are_distinct() {
        let (a, _ra) = ScriptedClient::new();
        let (b, _rb) = ScriptedClient::new();
        let a = Bridge::start(idle_config(), a).unwrap();
        let b = Bridge::start(idle_config(), b).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_call_ids_increase() {
        let (client, _remote) = ScriptedClient::new();
        let mut bridge = Bridge::start(idle_config(), client).unwrap();
        assert_eq!(bridge.next_call(), CallId(1));
        assert_eq!(bridge.next_call(), CallId(2));
    }

    #[test]
    fn test_stop_closes_inbound() {
        let (client, remote) = ScriptedClient::new();
        let bridge = Bridge::start(idle_config(), client).unwrap();
        assert!(bridge.is_running());
        bridge.stop();

        // Socket task gone, the client's sink has no listener
        assert!(!remote.connected());
    }

    #[test]
    fn test_default_timeout_from_config() {
        let (client, _remote) = ScriptedClient::new();
        let config = idle_config().with_default_timeout(Duration::from_millis(1234));
        let bridge = Bridge::start(config, client).unwrap();
        assert_eq!(bridge.default_timeout(), Duration::from_millis(1234));
    }

    #[test]
    fn test_is_joined_follows_client() {
        let (client, remote) = ScriptedClient::new();
        let bridge = Bridge::start(idle_config(), client).unwrap();
        assert!(!bridge.is_joined("room:1").unwrap());

        remote.joined("room:1", json!({}));
        assert!(bridge.is_joined("room:1").unwrap());
    }
}
