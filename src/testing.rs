//! In-process protocol client for tests.
//!
//! [`ScriptedClient`] implements [`ProtocolClient`] without any transport. It
//! records every action it is asked to perform and answers with configurable
//! results. Its paired [`ScriptedRemote`] plays the server: it injects socket
//! events and can be told to answer joins, leaves and pushes automatically.
//!
//! ```ignore
//! let (client, remote) = ScriptedClient::new();
//! let mut bridge = Bridge::start(config.with_auto_connect(false), client)?;
//!
//! bridge.connect()?;
//! remote.connected();
//! assert_eq!(bridge.wait_connect_status(Duration::from_secs(1))?, ConnectStatus::Connected);
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::message::{Ref, Topic};
use crate::socket::{ConnectRequest, EventSink, ProtocolClient, SocketEvent};

/// An action the client was asked to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientAction {
    /// Connect request.
    Connect {
        /// Endpoint URL.
        url: String,
        /// Query parameters.
        query_params: Vec<(String, String)>,
    },
    /// Join request.
    Join {
        /// Topic.
        topic: Topic,
        /// Join payload.
        payload: Value,
    },
    /// Leave request.
    Leave {
        /// Topic.
        topic: Topic,
        /// Leave payload.
        payload: Value,
    },
    /// Push request.
    Push {
        /// Topic.
        topic: Topic,
        /// Event name.
        event: String,
        /// Payload.
        payload: Value,
        /// Ref handed back, if the push was accepted.
        reference: Option<Ref>,
    },
}

/// Shared script state.
#[derive(Debug, Default)]
struct Script {
    sink: Option<EventSink>,
    actions: Vec<ClientAction>,
    last_connect: Option<ConnectRequest>,
    joined: HashSet<Topic>,
    next_ref: u64,
    fail_join: Option<Value>,
    fail_leave: Option<Value>,
    fail_push: Option<Value>,
    push_delay: Option<Duration>,
    auto_connect: bool,
    auto_join: Option<Value>,
    auto_reject_join: Option<Value>,
    auto_close_on_leave: Option<Value>,
    auto_reply: Option<Value>,
}

impl Script {
    fn mint_ref(&mut self) -> Ref {
        self.next_ref += 1;
        Ref(self.next_ref.to_string())
    }

    /// Track joined topics the way a real client would.
    fn observe(&mut self, event: &SocketEvent) {
        match event {
            SocketEvent::Joined { topic, .. } => {
                self.joined.insert(topic.clone());
            }
            SocketEvent::JoinError { topic, .. } | SocketEvent::ChannelClosed { topic, .. } => {
                self.joined.remove(topic);
            }
            SocketEvent::Disconnected { .. } => self.joined.clear(),
            _ => {}
        }
    }

    fn emit(&mut self, event: SocketEvent) -> bool {
        self.observe(&event);
        match &self.sink {
            Some(sink) => sink.emit(event),
            None => {
                log::warn!("[ScriptedClient] No sink attached, dropping {:?}", event);
                false
            }
        }
    }
}

/// Protocol client that follows a script instead of talking to a server.
#[derive(Debug)]
pub struct ScriptedClient {
    script: Arc<Mutex<Script>>,
}

/// Server side of a [`ScriptedClient`]. Cheap to clone and `Send`, so tests
/// can drive it from another thread while a bridge call is blocked.
#[derive(Debug, Clone)]
pub struct ScriptedRemote {
    script: Arc<Mutex<Script>>,
}

impl ScriptedClient {
    /// Create a client and its remote.
    #[must_use]
    pub fn new() -> (Self, ScriptedRemote) {
        let script = Arc::new(Mutex::new(Script::default()));
        (
            Self {
                script: Arc::clone(&script),
            },
            ScriptedRemote { script },
        )
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("script lock poisoned")
    }
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    fn attach(&mut self, sink: EventSink) {
        self.script().sink = Some(sink);
    }

    async fn connect(&mut self, request: ConnectRequest) {
        let mut script = self.script();
        script.actions.push(ClientAction::Connect {
            url: request.url.clone(),
            query_params: request.query_params.clone(),
        });
        script.last_connect = Some(request);
        if script.auto_connect {
            script.emit(SocketEvent::Connected);
        }
    }

    async fn join(&mut self, topic: &Topic, payload: Value) -> Result<Ref, Value> {
        let mut script = self.script();
        script.actions.push(ClientAction::Join {
            topic: topic.clone(),
            payload,
        });
        if let Some(reason) = script.fail_join.take() {
            return Err(reason);
        }

        let reference = script.mint_ref();
        if let Some(reason) = script.auto_reject_join.clone() {
            script.emit(SocketEvent::JoinError {
                topic: topic.clone(),
                payload: reason,
            });
        } else if let Some(response) = script.auto_join.clone() {
            script.emit(SocketEvent::Joined {
                topic: topic.clone(),
                payload: response,
            });
        }
        Ok(reference)
    }

    async fn leave(&mut self, topic: &Topic, payload: Value) -> Result<Ref, Value> {
        let mut script = self.script();
        script.actions.push(ClientAction::Leave {
            topic: topic.clone(),
            payload,
        });
        if let Some(reason) = script.fail_leave.take() {
            return Err(reason);
        }

        let reference = script.mint_ref();
        if let Some(payload) = script.auto_close_on_leave.clone() {
            script.emit(SocketEvent::ChannelClosed {
                topic: topic.clone(),
                payload,
            });
        }
        Ok(reference)
    }

    async fn push(&mut self, topic: &Topic, event: &str, payload: Value) -> Result<Ref, Value> {
        let delay = self.script().push_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script();
        let result = match script.fail_push.take() {
            Some(reason) => Err(reason),
            None => Ok(script.mint_ref()),
        };
        script.actions.push(ClientAction::Push {
            topic: topic.clone(),
            event: event.to_string(),
            payload,
            reference: result.as_ref().ok().cloned(),
        });

        if let (Ok(reference), Some(reply)) = (&result, script.auto_reply.clone()) {
            script.emit(SocketEvent::Reply {
                topic: topic.clone(),
                reference: reference.clone(),
                payload: reply,
            });
        }
        result
    }

    fn is_joined(&self, topic: &Topic) -> bool {
        self.script().joined.contains(topic)
    }
}

impl ScriptedRemote {
    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("script lock poisoned")
    }

    /// Inject a socket event. Returns `false` if no bridge is listening.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.script().emit(event)
    }

    /// Inject a connected event.
    pub fn connected(&self) -> bool {
        self.emit(SocketEvent::Connected)
    }

    /// Inject a disconnected event.
    pub fn disconnected(&self, reason: Value) -> bool {
        self.emit(SocketEvent::Disconnected { reason })
    }

    /// Inject a join acceptance.
    pub fn joined(&self, topic: impl Into<Topic>, payload: Value) -> bool {
        self.emit(SocketEvent::Joined {
            topic: topic.into(),
            payload,
        })
    }

    /// Inject a join refusal.
    pub fn join_error(&self, topic: impl Into<Topic>, payload: Value) -> bool {
        self.emit(SocketEvent::JoinError {
            topic: topic.into(),
            payload,
        })
    }

    /// Inject a channel close.
    pub fn channel_closed(&self, topic: impl Into<Topic>, payload: Value) -> bool {
        self.emit(SocketEvent::ChannelClosed {
            topic: topic.into(),
            payload,
        })
    }

    /// Inject a broadcast message.
    pub fn message(&self, topic: impl Into<Topic>, event: impl Into<String>, payload: Value) -> bool {
        self.emit(SocketEvent::Message {
            topic: topic.into(),
            event: event.into(),
            payload,
        })
    }

    /// Inject a reply to a push.
    pub fn reply(&self, topic: impl Into<Topic>, reference: Ref, payload: Value) -> bool {
        self.emit(SocketEvent::Reply {
            topic: topic.into(),
            reference,
            payload,
        })
    }

    /// Whether a bridge is attached to the client and still listening.
    pub fn is_attached(&self) -> bool {
        self.script().sink.as_ref().is_some_and(|sink| !sink.is_closed())
    }

    /// Every action recorded so far, oldest first.
    pub fn actions(&self) -> Vec<ClientAction> {
        self.script().actions.clone()
    }

    /// The most recent connect request.
    pub fn last_connect(&self) -> Option<ConnectRequest> {
        self.script().last_connect.clone()
    }

    /// Refs handed out for accepted pushes, oldest first.
    pub fn push_refs(&self) -> Vec<Ref> {
        self.script()
            .actions
            .iter()
            .filter_map(|action| match action {
                ClientAction::Push {
                    reference: Some(reference),
                    ..
                } => Some(reference.clone()),
                _ => None,
            })
            .collect()
    }

    /// Poll until `predicate` holds for the recorded actions or `timeout`
    /// elapses. Blocks the calling thread.
    pub fn wait_for_actions<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&[ClientAction]) -> bool,
    {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if predicate(&self.script().actions) {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Make the next join request fail locally with `reason`.
    pub fn fail_next_join(&self, reason: Value) {
        self.script().fail_join = Some(reason);
    }

    /// Make the next leave request fail locally with `reason`.
    pub fn fail_next_leave(&self, reason: Value) {
        self.script().fail_leave = Some(reason);
    }

    /// Make the next push fail locally with `reason`.
    pub fn fail_next_push(&self, reason: Value) {
        self.script().fail_push = Some(reason);
    }

    /// Delay every push before it returns a ref.
    pub fn delay_pushes(&self, delay: Duration) {
        self.script().push_delay = Some(delay);
    }

    /// Answer every connect request with a connected event.
    pub fn auto_connect(&self) {
        self.script().auto_connect = true;
    }

    /// Accept every join with `response`.
    pub fn auto_join(&self, response: Value) {
        self.script().auto_join = Some(response);
    }

    /// Refuse every join with `reason`.
    pub fn auto_reject_joins(&self, reason: Value) {
        self.script().auto_reject_join = Some(reason);
    }

    /// Close the channel with `payload` right after every accepted leave.
    pub fn auto_close_on_leave(&self, payload: Value) {
        self.script().auto_close_on_leave = Some(payload);
    }

    /// Reply to every accepted push with `payload`.
    pub fn auto_reply(&self, payload: Value) {
        self.script().auto_reply = Some(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_records_actions_and_mints_refs() {
        let (mut client, remote) = ScriptedClient::new();
        let topic = Topic::from("room:1");

        let join_ref = client.join(&topic, json!({})).await.unwrap();
        let push_ref = client.push(&topic, "shout", json!({"a": 1})).await.unwrap();

        assert_ne!(join_ref, push_ref);
        assert_eq!(remote.push_refs(), vec![push_ref]);
        assert_eq!(remote.actions().len(), 2);
    }

    #[tokio::test]
    async fn test_one_shot_failures() {
        let (mut client, remote) = ScriptedClient::new();
        let topic = Topic::from("room:1");
        remote.fail_next_push(json!("not joined"));

        assert_eq!(
            client.push(&topic, "e", json!(null)).await,
            Err(json!("not joined"))
        );
        assert!(client.push(&topic, "e", json!(null)).await.is_ok());
    }

    #[tokio::test]
    async fn test_emit_tracks_joined_topics() {
        let (mut client, remote) = ScriptedClient::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.attach(EventSink::new(tx));
        let topic = Topic::from("room:1");

        assert!(remote.joined("room:1", json!({})));
        assert!(client.is_joined(&topic));
        remote.channel_closed("room:1", json!({}));
        assert!(!client.is_joined(&topic));

        assert!(matches!(rx.recv().await, Some(SocketEvent::Joined { .. })));
        assert!(matches!(rx.recv().await, Some(SocketEvent::ChannelClosed { .. })));
    }

    #[test]
    fn test_detached_once_listener_drops() {
        let (mut client, remote) = ScriptedClient::new();
        let (tx, rx) = mpsc::unbounded_channel();
        client.attach(EventSink::new(tx));
        assert!(remote.is_attached());

        drop(rx);
        assert!(!remote.is_attached());
        assert!(!remote.connected());
    }

    #[test]
    fn test_emit_without_sink() {
        let (_client, remote) = ScriptedClient::new();
        assert!(!remote.is_attached());
        assert!(!remote.connected());
    }
}
