//! Test doubles shared by the engine's unit tests.

use crate::executor::{ChainExecutor, EventFacts, ExecutorDeps};
use crate::processor::{Collaborators, WebhookProcessor};
use crate::trigger::LocalClock;
use async_trait::async_trait;
use chatflow_booking::{BookingSubFlow, InMemoryBookingStore};
use chatflow_conversation::{
    InMemoryConversationStore, InMemoryDailyClaimStore, InMemoryExecutionLogStore,
    InMemorySentMessageStore,
};
use chatflow_core::AccountId;
use chatflow_integration::{
    Channel, HttpActionError, HttpActionLimits, HttpTransport, InMemoryChannelDirectory,
    InMemorySettingsStore, InteractiveMessage, LocationMessage, MediaMessage, MessagingClient,
    MessagingError, PreparedRequest, SecureHttpAction, TransportResponse,
};
use chatflow_workflow::{InMemoryWorkflowSource, Workflow, WorkflowGraph};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rootcause::Report;
use serde_json::{Value as JsonValue, json};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const PHONE: &str = "919800000001";
pub(crate) const TOKEN: &str = "hook-token";

/// A message the fake provider accepted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sent {
    Text(String),
    Interactive(InteractiveMessage),
    Media(MediaMessage),
    Location(LocationMessage),
}

/// Messaging client that records sends and hands out sequential ids.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingMessenger {
    sent: Arc<Mutex<Vec<(String, Sent)>>>,
    next_id: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl RecordingMessenger {
    pub(crate) fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn resume_sends(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<(String, Sent)> {
        self.sent.lock().expect("lock").clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|(_, sent)| match sent {
                Sent::Text(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    /// Provider id and payload of the last interactive message.
    pub(crate) fn last_interactive(&self) -> Option<(String, InteractiveMessage)> {
        self.sent()
            .into_iter()
            .rev()
            .find_map(|(id, sent)| match sent {
                Sent::Interactive(message) => Some((id, message)),
                _ => None,
            })
    }

    fn accept(&self, sent: Sent) -> Result<String, Report<MessagingError>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MessagingError::Provider {
                status: 503,
                details: "provider unavailable".to_string(),
            }
            .into());
        }
        let id = format!("wamid.out.{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().expect("lock").push((id.clone(), sent));
        Ok(id)
    }
}

#[async_trait]
impl MessagingClient for RecordingMessenger {
    async fn send_text(
        &self,
        _token: &str,
        _to: &str,
        body: &str,
    ) -> Result<String, Report<MessagingError>> {
        self.accept(Sent::Text(body.to_string()))
    }

    async fn send_interactive(
        &self,
        _token: &str,
        _to: &str,
        message: &InteractiveMessage,
    ) -> Result<String, Report<MessagingError>> {
        self.accept(Sent::Interactive(message.clone()))
    }

    async fn send_media(
        &self,
        _token: &str,
        _to: &str,
        message: &MediaMessage,
    ) -> Result<String, Report<MessagingError>> {
        self.accept(Sent::Media(message.clone()))
    }

    async fn send_location(
        &self,
        _token: &str,
        _to: &str,
        message: &LocationMessage,
    ) -> Result<String, Report<MessagingError>> {
        self.accept(Sent::Location(message.clone()))
    }
}

/// HTTP transport that answers every request with one canned reply.
#[derive(Debug, Clone, Default)]
pub(crate) struct StubTransport {
    reply: Arc<Mutex<Option<(u16, JsonValue)>>>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl StubTransport {
    pub(crate) fn reply(&self, status: u16, body: JsonValue) {
        *self.reply.lock().expect("lock") = Some((status, body));
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, HttpActionError> {
        self.urls.lock().expect("lock").push(request.url.to_string());
        let (status, body) = self
            .reply
            .lock()
            .expect("lock")
            .clone()
            .unwrap_or((200, json!({})));
        Ok(TransportResponse {
            status,
            body: serde_json::to_vec(&body).expect("encode"),
        })
    }
}

/// In-memory collaborators for one account.
pub(crate) struct Harness {
    pub account_id: AccountId,
    pub workflows: InMemoryWorkflowSource,
    pub conversations: InMemoryConversationStore,
    pub sent_messages: InMemorySentMessageStore,
    pub execution_logs: InMemoryExecutionLogStore,
    pub daily_claims: InMemoryDailyClaimStore,
    pub channels: InMemoryChannelDirectory,
    pub settings: InMemorySettingsStore,
    pub bookings: InMemoryBookingStore,
    pub messenger: RecordingMessenger,
    pub transport: StubTransport,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let harness = Self::without_channel();
        harness
            .channels
            .insert(Channel::new(harness.account_id, "channel-token"));
        harness
    }

    pub(crate) fn without_channel() -> Self {
        Self {
            account_id: AccountId::new(),
            workflows: InMemoryWorkflowSource::new(),
            conversations: InMemoryConversationStore::new(),
            sent_messages: InMemorySentMessageStore::new(),
            execution_logs: InMemoryExecutionLogStore::new(),
            daily_claims: InMemoryDailyClaimStore::new(),
            channels: InMemoryChannelDirectory::new(),
            settings: InMemorySettingsStore::new(),
            bookings: InMemoryBookingStore::new(),
            messenger: RecordingMessenger::default(),
            transport: StubTransport::default(),
        }
    }

    /// Builds an active workflow with the harness token and stores it.
    pub(crate) fn workflow(&self, graph: WorkflowGraph) -> Workflow {
        let workflow = Workflow::new(self.account_id, "Support", TOKEN).with_graph(graph);
        self.workflows.insert(workflow.clone());
        workflow
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            workflows: Arc::new(self.workflows.clone()),
            conversations: Arc::new(self.conversations.clone()),
            sent_messages: Arc::new(self.sent_messages.clone()),
            execution_logs: Arc::new(self.execution_logs.clone()),
            daily_claims: Arc::new(self.daily_claims.clone()),
        }
    }

    pub(crate) fn executor(&self) -> ChainExecutor {
        let deps = ExecutorDeps {
            conversations: Arc::new(self.conversations.clone()),
            sent_messages: Arc::new(self.sent_messages.clone()),
            messaging: Arc::new(self.messenger.clone()),
            channels: Arc::new(self.channels.clone()),
            settings: Arc::new(self.settings.clone()),
        };
        ChainExecutor::new(
            deps,
            SecureHttpAction::new(Arc::new(self.transport.clone()), HttpActionLimits::default()),
            BookingSubFlow::new(Arc::new(self.bookings.clone()), 7),
        )
    }

    pub(crate) fn processor(&self) -> WebhookProcessor {
        WebhookProcessor::new(self.collaborators(), self.executor(), clock())
    }
}

pub(crate) fn clock() -> LocalClock {
    LocalClock::from_offset_minutes(330).expect("offset")
}

/// Monday 2026-03-09, 08:00 at +05:30.
pub(crate) fn morning() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-09T02:30:00Z")
        .expect("timestamp")
        .with_timezone(&Utc)
}

pub(crate) fn facts() -> EventFacts {
    EventFacts {
        phone: PHONE.to_string(),
        text: Some("hi".to_string()),
        timestamp: morning(),
        local_date: NaiveDate::from_ymd_opt(2026, 3, 9).expect("date"),
        local_time: NaiveTime::from_hms_opt(8, 0, 0).expect("time"),
    }
}

pub(crate) fn text_event(body: &str, at: DateTime<Utc>) -> JsonValue {
    json!({
        "id": format!("wamid.in.{}", at.timestamp()),
        "from_me": false,
        "type": "text",
        "chat_id": format!("{PHONE}@s.whatsapp.net"),
        "timestamp": at.timestamp(),
        "text": {"body": body}
    })
}

pub(crate) fn button_event(id: &str, title: &str, quoted: Option<&str>) -> JsonValue {
    json!({
        "id": "wamid.in.reply",
        "type": "reply",
        "chat_id": format!("{PHONE}@s.whatsapp.net"),
        "timestamp": morning().timestamp(),
        "reply": {
            "type": "buttons_reply",
            "buttons_reply": {"id": format!("ButtonsV3:{id}"), "title": title}
        },
        "context": {"quoted_id": quoted}
    })
}

pub(crate) fn list_event(id: &str, title: &str, quoted: Option<&str>) -> JsonValue {
    json!({
        "id": "wamid.in.reply",
        "type": "reply",
        "chat_id": format!("{PHONE}@s.whatsapp.net"),
        "timestamp": morning().timestamp(),
        "reply": {
            "type": "list_reply",
            "list_reply": {"id": format!("ListV3:{id}"), "title": title}
        },
        "context": {"quoted_id": quoted}
    })
}

pub(crate) fn payload(messages: Vec<JsonValue>) -> JsonValue {
    json!({ "messages": messages })
}
