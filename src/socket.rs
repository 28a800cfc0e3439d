//! Socket contract between a protocol client and its callback handler.
//!
//! A [`ProtocolClient`] owns the transport and channel bookkeeping. It reports
//! what happens on the socket as [`SocketEvent`]s through an [`EventSink`] and
//! accepts action requests (join, leave, push, joined?).
//!
//! A [`SocketHandler`] is the callback side: it is told about every event and
//! answers control and query messages sent to it by its owner.
//!
//! [`run`] ties the two together. It is the single task that owns both the
//! handler and the client:
//!
//! ```text
//!   owner ──Inbound::Control/Query──┐
//!                                   ▼
//!                              run() loop ──on_*()──> SocketHandler
//!                                   ▲                      │
//!   ProtocolClient ──SocketEvent────┘      join/leave/push │
//!         ▲────────────────────────────────────────────────┘
//! ```
//!
//! Events are dispatched in the order the client emitted them. Handlers must
//! return promptly from event callbacks; the loop does not read the next event
//! until the callback returns.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::message::{Ref, Topic};
use crate::serializer::Serializer;

/// Something that happened on the socket, reported by the protocol client.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// The socket connected.
    Connected,
    /// The socket disconnected (or failed to connect).
    Disconnected {
        /// Why the socket went away.
        reason: Value,
    },
    /// A join was accepted.
    Joined {
        /// Joined topic.
        topic: Topic,
        /// Join response payload.
        payload: Value,
    },
    /// A join was refused by the remote side.
    JoinError {
        /// Topic that was refused.
        topic: Topic,
        /// Refusal payload.
        payload: Value,
    },
    /// A channel closed (after a leave, or closed by the server).
    ChannelClosed {
        /// Closed topic.
        topic: Topic,
        /// Close payload.
        payload: Value,
    },
    /// A message was broadcast on a joined topic.
    Message {
        /// Topic of the message.
        topic: Topic,
        /// Event name.
        event: String,
        /// Message payload.
        payload: Value,
    },
    /// The remote side replied to a push.
    Reply {
        /// Topic the push was sent on.
        topic: Topic,
        /// Ref of the push being answered.
        reference: Ref,
        /// Reply payload.
        payload: Value,
    },
}

/// Cloneable sender used by a protocol client to report socket events.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SocketEvent>,
}

impl EventSink {
    /// Wrap an event sender.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<SocketEvent>) -> Self {
        Self { tx }
    }

    /// Report an event. Returns `false` if the handler side has stopped.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Whether the handler side has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Parameters of a connect request.
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    /// Socket endpoint URL.
    pub url: String,
    /// Query parameters for the connect request.
    pub query_params: Vec<(String, String)>,
    /// Wire codec the client must frame messages with.
    pub serializer: Arc<dyn Serializer>,
}

/// Asynchronous protocol client surface consumed by a handler.
///
/// Implementors perform the actual connection management. Failures of
/// `join`/`leave`/`push` are reported as a reason value; the remote outcome of
/// an accepted request arrives later as a [`SocketEvent`].
#[async_trait]
pub trait ProtocolClient: Send {
    /// Give the client the sink it reports events through.
    fn attach(&mut self, sink: EventSink);

    /// Request a (re)connection. Always accepted; the outcome is reported as
    /// [`SocketEvent::Connected`] or [`SocketEvent::Disconnected`].
    async fn connect(&mut self, request: ConnectRequest);

    /// Send a join request for a topic.
    async fn join(&mut self, topic: &Topic, payload: Value) -> Result<Ref, Value>;

    /// Send a leave request for a topic.
    async fn leave(&mut self, topic: &Topic, payload: Value) -> Result<Ref, Value>;

    /// Push a message on a joined topic, returning the ref its reply will carry.
    async fn push(&mut self, topic: &Topic, event: &str, payload: Value) -> Result<Ref, Value>;

    /// Whether the topic is currently joined.
    fn is_joined(&self, topic: &Topic) -> bool;
}

/// What the handler wants done when it starts.
#[derive(Clone, Debug)]
pub struct InitAction {
    /// Request a connection immediately.
    pub connect: bool,
    /// Request used for this and later plain `Connect` outcomes.
    pub request: ConnectRequest,
}

/// Result of handling a control message.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlOutcome {
    /// Nothing further to do.
    Ok,
    /// Connect with the current request.
    Connect,
    /// Connect with an overridden URL and query parameters, which also become
    /// the current request.
    ConnectTo {
        /// New endpoint URL.
        url: String,
        /// New query parameters.
        query_params: Vec<(String, String)>,
    },
}

/// Callback interface driven by [`run`].
///
/// Event callbacks are synchronous and must not block. Control and query
/// handlers receive the client so they can act on the socket.
#[async_trait]
pub trait SocketHandler: Send {
    /// Fire-and-forget messages from the owner.
    type Control: Send;
    /// Request/response messages from the owner.
    type Query: Send;
    /// Answer to a query.
    type Reply: Send;

    /// Called once before any event.
    fn init(&mut self) -> InitAction;

    /// The socket connected.
    fn on_connected(&mut self);

    /// The socket disconnected.
    fn on_disconnected(&mut self, reason: Value);

    /// A join was accepted.
    fn on_joined(&mut self, topic: Topic, payload: Value);

    /// A join was refused.
    fn on_join_error(&mut self, topic: Topic, payload: Value);

    /// A channel closed.
    fn on_channel_closed(&mut self, topic: Topic, payload: Value);

    /// A message arrived on a joined topic.
    fn on_message(&mut self, topic: Topic, event: String, payload: Value);

    /// A reply to a push arrived.
    fn on_reply(&mut self, topic: Topic, reference: Ref, payload: Value);

    /// Handle a control message from the owner.
    async fn on_control(
        &mut self,
        control: Self::Control,
        client: &mut dyn ProtocolClient,
    ) -> ControlOutcome;

    /// Answer a query from the owner.
    async fn on_query(&mut self, query: Self::Query, client: &mut dyn ProtocolClient) -> Self::Reply;
}

/// Message from the owner to the socket task.
#[derive(Debug)]
pub enum Inbound<C, Q, R> {
    /// Fire-and-forget control message.
    Control(C),
    /// Query answered on the enclosed channel.
    Query(Q, oneshot::Sender<R>),
}

/// Sender half used by an owner to reach a running socket task.
pub type InboundSender<H> = mpsc::UnboundedSender<
    Inbound<<H as SocketHandler>::Control, <H as SocketHandler>::Query, <H as SocketHandler>::Reply>,
>;

/// Receiver half consumed by [`run`].
pub type InboundReceiver<H> = mpsc::UnboundedReceiver<
    Inbound<<H as SocketHandler>::Control, <H as SocketHandler>::Query, <H as SocketHandler>::Reply>,
>;

/// Drive a handler and a client until the owner drops its inbound sender.
pub async fn run<H, C>(mut handler: H, mut client: C, mut inbound: InboundReceiver<H>)
where
    H: SocketHandler,
    C: ProtocolClient,
{
    let (event_tx, mut events) = mpsc::unbounded_channel();
    client.attach(EventSink::new(event_tx));

    let init = handler.init();
    let mut request = init.request;
    if init.connect {
        log::debug!("[Socket] Connecting to {} on start", request.url);
        client.connect(request.clone()).await;
    }

    loop {
        tokio::select! {
            // Drain socket events first so notifications keep their order
            // relative to the control messages that caused them.
            biased;

            Some(event) = events.recv() => dispatch(&mut handler, event),

            msg = inbound.recv() => match msg {
                Some(Inbound::Control(control)) => {
                    match handler.on_control(control, &mut client).await {
                        ControlOutcome::Ok => {}
                        ControlOutcome::Connect => {
                            log::debug!("[Socket] Connecting to {}", request.url);
                            client.connect(request.clone()).await;
                        }
                        ControlOutcome::ConnectTo { url, query_params } => {
                            log::debug!("[Socket] Connecting to {} (override)", url);
                            request.url = url;
                            request.query_params = query_params;
                            client.connect(request.clone()).await;
                        }
                    }
                }
                Some(Inbound::Query(query, reply_tx)) => {
                    let reply = handler.on_query(query, &mut client).await;
                    let _ = reply_tx.send(reply);
                }
                None => {
                    log::debug!("[Socket] Owner gone, stopping");
                    break;
                }
            },
        }
    }
}

/// Route one socket event to the matching callback.
fn dispatch<H: SocketHandler>(handler: &mut H, event: SocketEvent) {
    match event {
        SocketEvent::Connected => handler.on_connected(),
        SocketEvent::Disconnected { reason } => handler.on_disconnected(reason),
        SocketEvent::Joined { topic, payload } => handler.on_joined(topic, payload),
        SocketEvent::JoinError { topic, payload } => handler.on_join_error(topic, payload),
        SocketEvent::ChannelClosed { topic, payload } => handler.on_channel_closed(topic, payload),
        SocketEvent::Message {
            topic,
            event,
            payload,
        } => handler.on_message(topic, event, payload),
        SocketEvent::Reply {
            topic,
            reference,
            payload,
        } => handler.on_reply(topic, reference, payload),
    }
}
