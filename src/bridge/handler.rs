//! Socket handler that turns callbacks into mailbox notifications.
//!
//! Every callback is forwarded to the owner mailbox immediately, tagged with
//! the bridge identity. Join and leave results are additionally tagged with
//! the [`CallId`] of the blocking call that asked for them, so a late answer
//! to a call that already timed out can never satisfy a newer call.
//!
//! Calls on one topic are queued: the remote side answers a topic's requests
//! in the order they were sent, so each answer takes the oldest call still
//! waiting on that topic.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::commands::{BridgeControl, BridgeQuery, BridgeReply};
use super::state::{BridgeStatus, TopicState};
use crate::mailbox::{BridgeId, CallId, MailboxSender, Notification, NotificationKind};
use crate::message::{Ref, Topic};
use crate::serializer::Serializer;
use crate::socket::{
    ConnectRequest, ControlOutcome, InitAction, ProtocolClient, SocketHandler,
};

/// Callback side of a bridge.
#[derive(Debug)]
pub struct SyncHandler {
    id: BridgeId,
    mailbox: MailboxSender,
    url: String,
    query_params: Vec<(String, String)>,
    auto_connect: bool,
    serializer: Arc<dyn Serializer>,
    /// Join calls waiting for the remote answer, oldest first per topic.
    pending_joins: PendingCalls,
    /// Leave calls waiting for the channel to close, oldest first per topic.
    pending_leaves: PendingCalls,
    status: BridgeStatus,
}

impl SyncHandler {
    /// Create a handler delivering to `mailbox`.
    #[must_use]
    pub fn new(
        id: BridgeId,
        mailbox: MailboxSender,
        url: String,
        query_params: Vec<(String, String)>,
        auto_connect: bool,
        serializer: Arc<dyn Serializer>,
    ) -> Self {
        Self {
            id,
            mailbox,
            url,
            query_params,
            auto_connect,
            serializer,
            pending_joins: PendingCalls::default(),
            pending_leaves: PendingCalls::default(),
            status: BridgeStatus::default(),
        }
    }

    fn notify(&self, call: Option<CallId>, kind: NotificationKind) {
        self.mailbox.deliver(Notification {
            bridge: self.id,
            call,
            kind,
        });
    }
}

/// Calls awaiting an answer, queued per topic in request order.
#[derive(Debug, Default)]
struct PendingCalls {
    by_topic: HashMap<Topic, VecDeque<CallId>>,
}

impl PendingCalls {
    fn push(&mut self, topic: Topic, call: CallId) {
        self.by_topic.entry(topic).or_default().push_back(call);
    }

    /// Oldest call waiting on `topic`.
    fn take(&mut self, topic: &Topic) -> Option<CallId> {
        let queue = self.by_topic.get_mut(topic)?;
        let call = queue.pop_front();
        if queue.is_empty() {
            self.by_topic.remove(topic);
        }
        call
    }

    /// Drop `call` without it being answered.
    fn forget(&mut self, topic: &Topic, call: CallId) {
        if let Some(queue) = self.by_topic.get_mut(topic) {
            queue.retain(|pending| *pending != call);
            if queue.is_empty() {
                self.by_topic.remove(topic);
            }
        }
    }

    fn clear(&mut self) {
        self.by_topic.clear();
    }
}

#[async_trait]
impl SocketHandler for SyncHandler {
    type Control = BridgeControl;
    type Query = BridgeQuery;
    type Reply = BridgeReply;

    fn init(&mut self) -> InitAction {
        if self.auto_connect {
            self.status.connecting();
        }
        InitAction {
            connect: self.auto_connect,
            request: ConnectRequest {
                url: self.url.clone(),
                query_params: self.query_params.clone(),
                serializer: Arc::clone(&self.serializer),
            },
        }
    }

    fn on_connected(&mut self) {
        log::debug!("[Bridge {}] Connected", self.id);
        self.status.connected();
        self.notify(None, NotificationKind::Connected);
    }

    fn on_disconnected(&mut self, reason: Value) {
        log::debug!("[Bridge {}] Disconnected: {}", self.id, reason);
        self.status.disconnected(reason.clone());
        // Requests sent on the old socket are never answered.
        self.pending_joins.clear();
        self.pending_leaves.clear();
        self.notify(None, NotificationKind::Disconnected { reason });
    }

    fn on_joined(&mut self, topic: Topic, payload: Value) {
        let call = self.pending_joins.take(&topic);
        log::debug!("[Bridge {}] Joined {} (call {:?})", self.id, topic, call);
        self.status.set_topic(topic.clone(), TopicState::Joined);
        self.notify(call, NotificationKind::JoinOk { topic, payload });
    }

    fn on_join_error(&mut self, topic: Topic, payload: Value) {
        let call = self.pending_joins.take(&topic);
        log::warn!("[Bridge {}] Join {} refused: {}", self.id, topic, payload);
        self.status
            .set_topic(topic.clone(), TopicState::JoinFailed(payload.clone()));
        self.notify(
            call,
            NotificationKind::JoinError {
                topic,
                reason: payload,
            },
        );
    }

    fn on_channel_closed(&mut self, topic: Topic, payload: Value) {
        let call = self.pending_leaves.take(&topic);
        log::debug!("[Bridge {}] Channel {} closed", self.id, topic);
        self.status.set_topic(topic.clone(), TopicState::Left);
        self.notify(call, NotificationKind::ChannelClosed { topic, payload });
    }

    fn on_message(&mut self, topic: Topic, event: String, payload: Value) {
        self.notify(
            None,
            NotificationKind::Message {
                topic,
                event,
                payload,
            },
        );
    }

    fn on_reply(&mut self, topic: Topic, reference: Ref, payload: Value) {
        self.notify(
            None,
            NotificationKind::Reply {
                topic,
                reference,
                payload,
            },
        );
    }

    async fn on_control(
        &mut self,
        control: BridgeControl,
        client: &mut dyn ProtocolClient,
    ) -> ControlOutcome {
        match control {
            BridgeControl::Connect => {
                self.status.connecting();
                ControlOutcome::Connect
            }
            BridgeControl::ConnectTo { url, query_params } => {
                self.status.connecting();
                self.url.clone_from(&url);
                self.query_params.clone_from(&query_params);
                ControlOutcome::ConnectTo { url, query_params }
            }
            BridgeControl::Join {
                call,
                topic,
                payload,
            } => {
                // Registered before the request goes out; the answer is
                // dispatched only after this handler returns.
                self.pending_joins.push(topic.clone(), call);
                self.status.set_topic(topic.clone(), TopicState::Joining);

                if let Err(reason) = client.join(&topic, payload).await {
                    log::warn!("[Bridge {}] Join {} not sent: {}", self.id, topic, reason);
                    self.pending_joins.forget(&topic, call);
                    self.status
                        .set_topic(topic.clone(), TopicState::JoinFailed(reason.clone()));
                    self.notify(Some(call), NotificationKind::JoinError { topic, reason });
                }
                ControlOutcome::Ok
            }
            BridgeControl::Leave {
                call,
                topic,
                payload,
            } => {
                match client.leave(&topic, payload).await {
                    Ok(reference) => {
                        self.pending_leaves.push(topic.clone(), call);
                        self.status.set_topic(topic.clone(), TopicState::Leaving);
                        self.notify(Some(call), NotificationKind::LeaveRef { topic, reference });
                    }
                    Err(reason) => {
                        log::warn!("[Bridge {}] Leave {} refused: {}", self.id, topic, reason);
                        self.notify(Some(call), NotificationKind::LeaveError { topic, reason });
                    }
                }
                ControlOutcome::Ok
            }
        }
    }

    async fn on_query(&mut self, query: BridgeQuery, client: &mut dyn ProtocolClient) -> BridgeReply {
        match query {
            BridgeQuery::Push {
                topic,
                event,
                payload,
            } => BridgeReply::Pushed(client.push(&topic, &event, payload).await),
            BridgeQuery::IsJoined(topic) => BridgeReply::IsJoined(client.is_joined(&topic)),
            BridgeQuery::Status => BridgeReply::Status(self.status.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::state::ConnectionState;
    use crate::mailbox::Mailbox;
    use crate::serializer::SerializerKind;
    use crate::testing::{ClientAction, ScriptedClient};
    use serde_json::json;

    fn handler(auto_connect: bool) -> (SyncHandler, Mailbox, BridgeId) {
        let (tx, mailbox) = Mailbox::channel();
        let id = BridgeId::new();
        let handler = SyncHandler::new(
            id,
            tx,
            "ws://test".into(),
            vec![],
            auto_connect,
            SerializerKind::Plain.build(),
        );
        (handler, mailbox, id)
    }

    #[test]
    fn test_init_reflects_auto_connect() {
        let (mut h, _mailbox, _) = handler(true);
        let init = h.init();
        assert!(init.connect);
        assert_eq!(init.request.url, "ws://test");
        assert_eq!(h.status.connection, ConnectionState::Connecting);

        let (mut h, _mailbox, _) = handler(false);
        assert!(!h.init().connect);
    }

    #[test]
    fn test_callbacks_forward_tagged_notifications() {
        let (mut h, mut mailbox, id) = handler(false);
        h.on_connected();
        h.on_message("room:1".into(), "ping".into(), json!(1));
        h.on_reply("room:1".into(), "9".into(), json!({"status": "ok"}));

        let got = mailbox.drain();
        assert_eq!(got.len(), 3);
        assert!(got.iter().all(|n| n.bridge == id && n.call.is_none()));
        assert_eq!(got[0].kind, NotificationKind::Connected);
        assert_eq!(
            got[2].kind,
            NotificationKind::Reply {
                topic: "room:1".into(),
                reference: "9".into(),
                payload: json!({"status": "ok"}),
            }
        );
    }

    #[tokio::test]
    async fn test_join_result_tagged_with_call() {
        let (mut h, mut mailbox, id) = handler(false);
        let (mut client, remote) = ScriptedClient::new();

        h.on_control(
            BridgeControl::Join {
                call: CallId(3),
                topic: "room:1".into(),
                payload: json!({}),
            },
            &mut client,
        )
        .await;
        assert_eq!(
            remote.actions(),
            vec![ClientAction::Join {
                topic: "room:1".into(),
                payload: json!({}),
            }]
        );
        assert_eq!(h.status.topic(&"room:1".into()), Some(&TopicState::Joining));

        h.on_joined("room:1".into(), json!({"id": 1}));
        let n = mailbox.drain().pop().unwrap();
        assert!(n.answers(id, CallId(3)));

        // A second answer for the same topic has no call left to satisfy
        h.on_joined("room:1".into(), json!({"id": 2}));
        assert_eq!(mailbox.drain().pop().unwrap().call, None);
    }

    #[tokio::test]
    async fn test_join_not_sent_reports_error() {
        let (mut h, mut mailbox, _) = handler(false);
        let (mut client, remote) = ScriptedClient::new();
        remote.fail_next_join(json!("not connected"));

        h.on_control(
            BridgeControl::Join {
                call: CallId(1),
                topic: "room:1".into(),
                payload: json!({}),
            },
            &mut client,
        )
        .await;

        let n = mailbox.drain().pop().unwrap();
        assert_eq!(n.call, Some(CallId(1)));
        assert_eq!(
            n.kind,
            NotificationKind::JoinError {
                topic: "room:1".into(),
                reason: json!("not connected"),
            }
        );
        assert!(h.pending_joins.by_topic.is_empty());
    }

    fn join_control(call: u64) -> BridgeControl {
        BridgeControl::Join {
            call: CallId(call),
            topic: "room:1".into(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn test_join_answers_follow_request_order() {
        let (mut h, mut mailbox, _) = handler(false);
        let (mut client, _remote) = ScriptedClient::new();

        // Call 1 is still unanswered when call 2 goes out
        h.on_control(join_control(1), &mut client).await;
        h.on_control(join_control(2), &mut client).await;

        h.on_joined("room:1".into(), json!({"id": "first"}));
        h.on_joined("room:1".into(), json!({"id": "second"}));

        let calls: Vec<_> = mailbox.drain().into_iter().map(|n| n.call).collect();
        assert_eq!(calls, vec![Some(CallId(1)), Some(CallId(2))]);
        assert!(h.pending_joins.by_topic.is_empty());
    }

    #[tokio::test]
    async fn test_failed_join_leaves_older_call_pending() {
        let (mut h, mut mailbox, _) = handler(false);
        let (mut client, remote) = ScriptedClient::new();

        h.on_control(join_control(1), &mut client).await;
        remote.fail_next_join(json!("busy"));
        h.on_control(join_control(2), &mut client).await;
        mailbox.drain();

        h.on_joined("room:1".into(), json!({}));
        assert_eq!(mailbox.drain().pop().unwrap().call, Some(CallId(1)));
    }

    #[tokio::test]
    async fn test_disconnect_drops_pending_calls() {
        let (mut h, mut mailbox, _) = handler(false);
        let (mut client, _remote) = ScriptedClient::new();

        h.on_control(join_control(1), &mut client).await;
        h.on_disconnected(json!("closed"));
        mailbox.drain();

        h.on_joined("room:1".into(), json!({}));
        assert_eq!(mailbox.drain().pop().unwrap().call, None);
    }

    #[tokio::test]
    async fn test_leave_flow_tags_ack_and_close() {
        let (mut h, mut mailbox, id) = handler(false);
        let (mut client, _remote) = ScriptedClient::new();

        h.on_control(
            BridgeControl::Leave {
                call: CallId(4),
                topic: "room:1".into(),
                payload: json!({}),
            },
            &mut client,
        )
        .await;
        h.on_channel_closed("room:1".into(), json!({"reason": "left"}));

        let got = mailbox.drain();
        assert!(matches!(got[0].kind, NotificationKind::LeaveRef { .. }));
        assert!(got.iter().all(|n| n.answers(id, CallId(4))));
        assert_eq!(h.status.topic(&"room:1".into()), Some(&TopicState::Left));
    }

    #[tokio::test]
    async fn test_connect_to_updates_request() {
        let (mut h, _mailbox, _) = handler(false);
        let (mut client, _remote) = ScriptedClient::new();

        let outcome = h
            .on_control(
                BridgeControl::ConnectTo {
                    url: "ws://other".into(),
                    query_params: vec![("vsn".into(), "2.0.0".into())],
                },
                &mut client,
            )
            .await;

        assert_eq!(
            outcome,
            ControlOutcome::ConnectTo {
                url: "ws://other".into(),
                query_params: vec![("vsn".into(), "2.0.0".into())],
            }
        );
        assert_eq!(h.init().request.url, "ws://other");
    }

    #[tokio::test]
    async fn test_status_query() {
        let (mut h, _mailbox, _) = handler(false);
        let (mut client, _remote) = ScriptedClient::new();
        h.on_connected();

        let reply = h.on_query(BridgeQuery::Status, &mut client).await;
        match reply {
            BridgeReply::Status(status) => assert!(status.is_connected()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
