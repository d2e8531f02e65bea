//! The webhook processor.
//!
//! Handles one webhook delivery for an `(account, token)` pair. Each
//! message event in the payload is classified and handled in order:
//!
//! - text: a booking sub-flow waiting for free text takes it first;
//!   otherwise the first text of the local day sends the entry node of
//!   every entry-node workflow of the account, and later texts are
//!   inquiries
//! - interactive reply: offered to the token's workflows in creation
//!   order, skipping those that did not send the quoted message; the
//!   first workflow that routes it wins
//!
//! Every read-modify-write of a conversation state holds the per-key lock
//! for `(workflow, phone)`.

use crate::error::{ExecutionError, WebhookError};
use crate::executor::{ChainExecutor, ChainReport, ChainStart, EventFacts};
use crate::inbound::{InboundEvent, ReplyEvent, TextEvent, WebhookPayload};
use crate::ownership::{Ownership, OwnershipResolver};
use crate::trigger::{FirstMessageTrigger, LocalClock, TriggerDecision};
use chatflow_booking::ReplyHandling;
use chatflow_conversation::{
    ConversationKey, ConversationState, ConversationStore, DailyClaimStore, ExecutionLogStore,
    KeyedLocks, MessageKind, SentMessageStore,
};
use chatflow_core::AccountId;
use chatflow_workflow::{Workflow, WorkflowSource, resolve_reply};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rootcause::Report;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a delivery was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// At least one chain ran.
    Ok,
    /// A booking sub-flow consumed free text.
    Captured,
    /// A repeat text of the day.
    Inquiry,
    /// A reply no workflow could route.
    NotHandled,
    /// Nothing in the payload needed handling.
    Ignored,
}

impl WebhookOutcome {
    /// Returns the acknowledgement status string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Captured => "captured",
            Self::Inquiry => "inquiry",
            Self::NotHandled => "not_handled",
            Self::Ignored => "ignored",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Ok | Self::Captured => 4,
            Self::Inquiry => 3,
            Self::NotHandled => 2,
            Self::Ignored => 1,
        }
    }

    /// Combines the outcomes of two events of one delivery.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

/// Stores the processor reads and writes directly.
#[derive(Clone)]
pub struct Collaborators {
    pub workflows: Arc<dyn WorkflowSource>,
    pub conversations: Arc<dyn ConversationStore>,
    pub sent_messages: Arc<dyn SentMessageStore>,
    pub execution_logs: Arc<dyn ExecutionLogStore>,
    pub daily_claims: Arc<dyn DailyClaimStore>,
}

/// Processes webhook deliveries.
#[derive(Clone)]
pub struct WebhookProcessor {
    stores: Collaborators,
    executor: ChainExecutor,
    trigger: FirstMessageTrigger,
    ownership: OwnershipResolver,
    clock: LocalClock,
    locks: Arc<KeyedLocks<ConversationKey>>,
}

impl WebhookProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(stores: Collaborators, executor: ChainExecutor, clock: LocalClock) -> Self {
        let trigger = FirstMessageTrigger::new(
            Arc::clone(&stores.daily_claims),
            Arc::clone(&stores.workflows),
            clock,
        );
        let ownership = OwnershipResolver::new(Arc::clone(&stores.sent_messages));
        Self {
            stores,
            executor,
            trigger,
            ownership,
            clock,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Handles one delivery.
    ///
    /// `received_at` stands in for events without a timestamp.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if no active workflow of the account uses
    /// `token`, and `Persistence` if storage the engine cannot work
    /// without fails. Failures inside a chain are logged, not returned.
    #[instrument(skip(self, token, payload), fields(account_id = %account_id))]
    pub async fn handle(
        &self,
        account_id: AccountId,
        token: &str,
        payload: &JsonValue,
        received_at: DateTime<Utc>,
    ) -> Result<WebhookOutcome, Report<WebhookError>> {
        let workflows = self
            .stores
            .workflows
            .find_by_webhook_token(account_id, token)
            .await
            .map_err(|e| WebhookError::Persistence {
                details: e.to_string(),
            })?;
        if workflows.is_empty() {
            warn!("no workflow for webhook token");
            return Err(WebhookError::Unauthorized.into());
        }
        for workflow in &workflows {
            for issue in workflow.graph.validate() {
                warn!(workflow_id = %workflow.id, %issue, "workflow graph issue");
            }
        }

        let payload = WebhookPayload::deserialize(payload).unwrap_or_else(|e| {
            debug!(error = %e, "payload has no message list");
            WebhookPayload::default()
        });

        let mut outcome = WebhookOutcome::Ignored;
        for raw in &payload.messages {
            let event_outcome = match InboundEvent::from_raw(raw, received_at) {
                InboundEvent::Ignorable(reason) => {
                    debug!(?reason, "ignoring event");
                    WebhookOutcome::Ignored
                }
                InboundEvent::Text(event) => {
                    self.handle_text(account_id, &workflows, event, raw).await?
                }
                InboundEvent::InteractiveReply(event) => {
                    self.handle_reply(&workflows, event, raw).await?
                }
            };
            outcome = outcome.merge(event_outcome);
        }
        info!(outcome = outcome.as_str(), events = payload.messages.len(), "delivery handled");
        Ok(outcome)
    }

    fn facts(&self, phone: &str, text: Option<String>, timestamp: DateTime<Utc>) -> EventFacts {
        EventFacts {
            phone: phone.to_string(),
            text,
            timestamp,
            local_date: self.clock.local_date(timestamp),
            local_time: self.clock.local_time(timestamp),
        }
    }

    async fn handle_text(
        &self,
        account_id: AccountId,
        workflows: &[Workflow],
        event: TextEvent,
        raw: &JsonValue,
    ) -> Result<WebhookOutcome, Report<WebhookError>> {
        let facts = self.facts(&event.phone, Some(event.body.clone()), event.timestamp);

        for workflow in workflows {
            if self.capture_text(workflow, &facts, &event.body, raw).await? {
                return Ok(WebhookOutcome::Captured);
            }
        }

        let decision = self
            .trigger
            .evaluate(account_id, &event.phone, event.timestamp)
            .await
            .map_err(|e| WebhookError::Persistence {
                details: e.to_string(),
            })?;
        let starting = match decision {
            TriggerDecision::Inquiry => return Ok(WebhookOutcome::Inquiry),
            TriggerDecision::FirstOfDay(starting) => starting,
        };
        if starting.is_empty() {
            debug!("no workflow has an entry node");
            return Ok(WebhookOutcome::NotHandled);
        }

        let runs = starting
            .iter()
            .map(|workflow| self.start_entry(workflow, &facts, raw));
        let mut persistence = None;
        for (workflow, result) in starting.iter().zip(join_all(runs).await) {
            if let Err(e) = result {
                warn!(workflow_id = %workflow.id, error = %e, "entry chain failed");
                persistence.get_or_insert(e);
            }
        }
        match persistence {
            Some(e) => Err(WebhookError::Persistence {
                details: e.to_string(),
            }
            .into()),
            None => Ok(WebhookOutcome::Ok),
        }
    }

    // Returns true if the workflow's booking sub-flow consumed the text.
    async fn capture_text(
        &self,
        workflow: &Workflow,
        facts: &EventFacts,
        text: &str,
        raw: &JsonValue,
    ) -> Result<bool, Report<WebhookError>> {
        let key = ConversationKey::new(workflow.id, facts.phone.as_str());
        let _guard = self.locks.lock(&key).await;
        let Some(mut state) = self.load(workflow, &facts.phone).await? else {
            return Ok(false);
        };
        let Some(node_id) = state
            .context
            .booking()
            .filter(|booking| booking.step.awaits_text())
            .map(|booking| booking.node_id.clone())
        else {
            return Ok(false);
        };

        let scope = facts.booking_scope(workflow.account_id);
        let report = match self
            .executor
            .booking()
            .handle_text(&scope, text, &mut state.context)
            .await
        {
            Ok(None) => return Ok(false),
            Ok(Some(step)) => {
                state.record_inbound(facts.timestamp, facts.local_date);
                self.executor
                    .run(workflow, facts, &mut state, ChainStart::FlowStep { node_id, step })
                    .await
            }
            Err(e) => ChainReport {
                responses: Vec::new(),
                error: Some(ExecutionError::Booking {
                    node_id,
                    details: e.to_string(),
                }),
            },
        };
        self.finish(workflow, facts, &state, &report, MessageKind::Text, raw)
            .await?;
        Ok(true)
    }

    async fn start_entry(
        &self,
        workflow: &Workflow,
        facts: &EventFacts,
        raw: &JsonValue,
    ) -> Result<(), Report<WebhookError>> {
        let Some(entry) = workflow.entry_node_id.clone() else {
            return Ok(());
        };
        let key = ConversationKey::new(workflow.id, facts.phone.as_str());
        let _guard = self.locks.lock(&key).await;
        let mut state = self
            .load(workflow, &facts.phone)
            .await?
            .unwrap_or_else(|| ConversationState::new(workflow.id, facts.phone.as_str()));
        state.record_inbound(facts.timestamp, facts.local_date);
        state.context.clear_sub_flows();

        let report = self
            .executor
            .run(workflow, facts, &mut state, ChainStart::Entry(entry))
            .await;
        self.finish(workflow, facts, &state, &report, MessageKind::Text, raw)
            .await
    }

    async fn handle_reply(
        &self,
        workflows: &[Workflow],
        event: ReplyEvent,
        raw: &JsonValue,
    ) -> Result<WebhookOutcome, Report<WebhookError>> {
        let record = self
            .ownership
            .lookup(event.quoted_id.as_deref())
            .await
            .map_err(|e| WebhookError::Persistence {
                details: e.to_string(),
            })?;
        let facts = self.facts(&event.phone, event.title.clone(), event.timestamp);

        for workflow in workflows {
            let ownership = Ownership::of(record.as_ref(), workflow.id);
            if !ownership.may_handle() {
                debug!(workflow_id = %workflow.id, ?ownership, "reply belongs to another workflow");
                continue;
            }
            if self.route_reply(workflow, &facts, &event, raw).await? {
                return Ok(WebhookOutcome::Ok);
            }
        }
        debug!(reply_id = %event.reply_id, "no workflow routed the reply");
        Ok(WebhookOutcome::NotHandled)
    }

    // Returns true if the workflow handled the reply.
    async fn route_reply(
        &self,
        workflow: &Workflow,
        facts: &EventFacts,
        event: &ReplyEvent,
        raw: &JsonValue,
    ) -> Result<bool, Report<WebhookError>> {
        let key = ConversationKey::new(workflow.id, facts.phone.as_str());
        let _guard = self.locks.lock(&key).await;
        let mut state = self
            .load(workflow, &facts.phone)
            .await?
            .unwrap_or_else(|| ConversationState::new(workflow.id, facts.phone.as_str()));

        if let Some(node_id) = state.context.booking().map(|booking| booking.node_id.clone()) {
            let scope = facts.booking_scope(workflow.account_id);
            let handling = self
                .executor
                .booking()
                .handle_reply(&scope, &event.reply_id, &mut state.context)
                .await;
            match handling {
                Ok(ReplyHandling::Handled(step)) => {
                    state.record_inbound(facts.timestamp, facts.local_date);
                    let report = self
                        .executor
                        .run(workflow, facts, &mut state, ChainStart::FlowStep { node_id, step })
                        .await;
                    self.finish(workflow, facts, &state, &report, event.kind, raw)
                        .await?;
                    return Ok(true);
                }
                Ok(ReplyHandling::Rejected) => {
                    debug!(reply_id = %event.reply_id, "booking selection rejected; state reset");
                    self.executor.save(&state).await.map_err(|e| {
                        WebhookError::Persistence {
                            details: e.to_string(),
                        }
                    })?;
                }
                Ok(ReplyHandling::NotForFlow) => {}
                Err(e) => {
                    let report = ChainReport {
                        responses: Vec::new(),
                        error: Some(ExecutionError::Booking {
                            node_id,
                            details: e.to_string(),
                        }),
                    };
                    self.finish(workflow, facts, &state, &report, event.kind, raw)
                        .await?;
                    return Ok(true);
                }
            }
        }

        let Some(resolution) = resolve_reply(&workflow.graph, &event.reply_id) else {
            return Ok(false);
        };
        debug!(
            workflow_id = %workflow.id,
            reply_id = %event.reply_id,
            strategy = %resolution.strategy,
            target = %resolution.edge.target,
            "reply resolved"
        );
        let target = resolution.edge.target.clone();

        state.record_inbound(facts.timestamp, facts.local_date);
        state.context.clear_sub_flows();
        let report = self
            .executor
            .run(workflow, facts, &mut state, ChainStart::Node(target))
            .await;
        self.finish(workflow, facts, &state, &report, event.kind, raw)
            .await?;
        Ok(true)
    }

    async fn load(
        &self,
        workflow: &Workflow,
        phone: &str,
    ) -> Result<Option<ConversationState>, Report<WebhookError>> {
        let state = self
            .stores
            .conversations
            .load(workflow.id, phone)
            .await
            .map_err(|e| WebhookError::Persistence {
                details: e.to_string(),
            })?;
        Ok(state)
    }

    // Writes the execution log and, for a clean chain, the final state.
    async fn finish(
        &self,
        workflow: &Workflow,
        facts: &EventFacts,
        state: &ConversationState,
        report: &ChainReport,
        kind: MessageKind,
        raw: &JsonValue,
    ) -> Result<(), Report<WebhookError>> {
        let entry = report.to_log(workflow, &facts.phone, kind, raw.clone());
        if let Err(e) = self.stores.execution_logs.append(&entry).await {
            warn!(workflow_id = %workflow.id, error = %e, "failed to append execution log");
        }

        match &report.error {
            Some(error) if error.is_persistence() => Err(WebhookError::Persistence {
                details: error.to_string(),
            }
            .into()),
            Some(_) => Ok(()),
            None => self.executor.save(state).await.map_err(|e| {
                WebhookError::Persistence {
                    details: e.to_string(),
                }
                .into()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        Harness, PHONE, TOKEN, button_event, list_event, morning, payload, text_event,
    };
    use chatflow_booking::BookingSelection;
    use chatflow_conversation::ExecutionStatus;
    use chatflow_workflow::{
        BookAppointmentConfig, Edge, Node, NodeId, NodeKind, QuickReplyConfig, ReplyButton,
        TextMessageConfig, WorkflowGraph,
    };
    use chrono::{Duration, NaiveTime, Weekday};
    use serde_json::json;

    fn text(id: &str, body: &str) -> Node {
        Node::new(
            id,
            NodeKind::Text(TextMessageConfig {
                text: body.to_string(),
            }),
        )
    }

    fn menu(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::QuickReply(QuickReplyConfig {
                body: "How can we help?".to_string(),
                buttons: vec![
                    ReplyButton::new("btn_hours", "Hours"),
                    ReplyButton::new("btn_agent", "Agent"),
                ],
                ..QuickReplyConfig::default()
            }),
        )
    }

    fn welcome_graph() -> WorkflowGraph {
        WorkflowGraph::new()
            .with_node(text("welcome", "Welcome!"))
            .with_node(menu("menu"))
            .with_node(text("hours", "We open at 9."))
            .with_node(text("agent", "An agent will call you."))
            .with_edge(Edge::new("welcome", "menu"))
            .with_edge(Edge::new("menu", "hours").with_handle("btn_hours"))
            .with_edge(Edge::new("menu", "agent").with_handle("btn_agent"))
    }

    fn entry_workflow(h: &Harness, graph: WorkflowGraph, entry: &str) -> Workflow {
        let workflow = Workflow::new(h.account_id, "Welcome", TOKEN)
            .with_graph(graph)
            .with_entry_node(entry);
        h.workflows.insert(workflow.clone());
        workflow
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let h = Harness::new();
        let err = h
            .processor()
            .handle(h.account_id, "wrong", &payload(vec![]), morning())
            .await
            .expect_err("unauthorized");
        assert_eq!(err.current_context(), &WebhookError::Unauthorized);
    }

    #[tokio::test]
    async fn first_text_of_day_sends_entry_node() {
        let h = Harness::new();
        let workflow = entry_workflow(&h, welcome_graph(), "welcome");
        let processor = h.processor();

        let outcome = processor
            .handle(h.account_id, TOKEN, &payload(vec![text_event("hi", morning())]), morning())
            .await
            .expect("handled");

        assert_eq!(outcome, WebhookOutcome::Ok);
        assert_eq!(h.messenger.texts(), vec!["Welcome!"]);
        assert_eq!(h.messenger.sent().len(), 1);
        let state = h.conversations.get(workflow.id, PHONE).expect("state");
        assert_eq!(state.current_node_id, Some(NodeId::from("welcome")));
        assert_eq!(state.last_message_at, Some(morning()));
        let logs = h.execution_logs.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, ExecutionStatus::Success);
        assert_eq!(logs[0].responses.len(), 1);
    }

    #[tokio::test]
    async fn second_text_same_day_is_inquiry() {
        let h = Harness::new();
        let workflow = entry_workflow(&h, welcome_graph(), "welcome");
        let processor = h.processor();
        let later = morning() + Duration::hours(3);

        processor
            .handle(h.account_id, TOKEN, &payload(vec![text_event("hi", morning())]), morning())
            .await
            .expect("first");
        let before = h.conversations.get(workflow.id, PHONE);
        let outcome = processor
            .handle(h.account_id, TOKEN, &payload(vec![text_event("hello?", later)]), later)
            .await
            .expect("second");

        assert_eq!(outcome, WebhookOutcome::Inquiry);
        assert_eq!(h.messenger.sent().len(), 1);
        assert_eq!(h.conversations.get(workflow.id, PHONE), before);
    }

    #[tokio::test]
    async fn entry_chains_are_isolated_per_workflow() {
        let h = Harness::new();
        let broken = Workflow::new(h.account_id, "Broken", "other-token")
            .with_graph(WorkflowGraph::new().with_node(Node::new(
                "start",
                NodeKind::from_parts("aiAgent", json!({})),
            )))
            .with_entry_node("start");
        h.workflows.insert(broken);
        let workflow = entry_workflow(&h, welcome_graph(), "welcome");

        let outcome = h
            .processor()
            .handle(h.account_id, TOKEN, &payload(vec![text_event("hi", morning())]), morning())
            .await
            .expect("handled");

        assert_eq!(outcome, WebhookOutcome::Ok);
        assert_eq!(h.messenger.texts(), vec!["Welcome!"]);
        assert!(h.conversations.get(workflow.id, PHONE).is_some());
        let failed = h
            .execution_logs
            .entries()
            .into_iter()
            .filter(|entry| entry.status == ExecutionStatus::Failed)
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn button_reply_follows_its_edge() {
        let h = Harness::new();
        let workflow = entry_workflow(&h, welcome_graph(), "menu");
        let processor = h.processor();
        processor
            .handle(h.account_id, TOKEN, &payload(vec![text_event("hi", morning())]), morning())
            .await
            .expect("first");
        let (quoted, _) = h.messenger.last_interactive().expect("menu sent");

        let outcome = processor
            .handle(
                h.account_id,
                TOKEN,
                &payload(vec![button_event("btn_hours", "Hours", Some(&quoted))]),
                morning(),
            )
            .await
            .expect("reply");

        assert_eq!(outcome, WebhookOutcome::Ok);
        assert_eq!(h.messenger.texts(), vec!["We open at 9."]);
        let state = h.conversations.get(workflow.id, PHONE).expect("state");
        assert_eq!(state.current_node_id, Some(NodeId::from("hours")));
    }

    #[tokio::test]
    async fn reply_owned_by_other_workflow_is_skipped() {
        let h = Harness::new();
        let first = h.workflow(welcome_graph());
        let second = h.workflow(
            WorkflowGraph::new()
                .with_node(menu("menu2"))
                .with_node(text("hours2", "Second workflow hours."))
                .with_edge(Edge::new("menu2", "hours2").with_handle("btn_hours")),
        );
        h.sent_messages
            .record(&chatflow_conversation::SentMessageRecord::new(
                second.id,
                "wamid.out.menu2",
                PHONE,
                "quickReply",
            ))
            .await
            .expect("record");

        let outcome = h
            .processor()
            .handle(
                h.account_id,
                TOKEN,
                &payload(vec![button_event("btn_hours", "Hours", Some("wamid.out.menu2"))]),
                morning(),
            )
            .await
            .expect("reply");

        assert_eq!(outcome, WebhookOutcome::Ok);
        assert_eq!(h.messenger.texts(), vec!["Second workflow hours."]);
        assert!(h.conversations.get(first.id, PHONE).is_none());
        assert!(h.conversations.get(second.id, PHONE).is_some());
    }

    #[tokio::test]
    async fn untracked_reply_goes_to_first_workflow() {
        let h = Harness::new();
        let first = h.workflow(welcome_graph());
        let second = h.workflow(welcome_graph());

        let outcome = h
            .processor()
            .handle(
                h.account_id,
                TOKEN,
                &payload(vec![button_event("btn_agent", "Agent", None)]),
                morning(),
            )
            .await
            .expect("reply");

        assert_eq!(outcome, WebhookOutcome::Ok);
        assert_eq!(h.messenger.texts(), vec!["An agent will call you."]);
        assert!(h.conversations.get(first.id, PHONE).is_some());
        assert!(h.conversations.get(second.id, PHONE).is_none());
    }

    #[tokio::test]
    async fn unknown_reply_is_not_handled() {
        let h = Harness::new();
        h.workflow(welcome_graph());

        let outcome = h
            .processor()
            .handle(
                h.account_id,
                TOKEN,
                &payload(vec![button_event("btn_missing", "?", None)]),
                morning(),
            )
            .await
            .expect("reply");

        assert_eq!(outcome, WebhookOutcome::NotHandled);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn ignorable_events_are_acknowledged() {
        let h = Harness::new();
        h.workflow(welcome_graph());
        let echo = json!({"from_me": true, "chat_id": "919800000001@s.whatsapp.net", "text": {"body": "hi"}});

        let outcome = h
            .processor()
            .handle(h.account_id, TOKEN, &payload(vec![echo]), morning())
            .await
            .expect("handled");

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert!(h.execution_logs.entries().is_empty());
    }

    async fn deliver(
        processor: &WebhookProcessor,
        h: &Harness,
        event: JsonValue,
        at: DateTime<Utc>,
    ) -> WebhookOutcome {
        processor
            .handle(h.account_id, TOKEN, &payload(vec![event]), at)
            .await
            .expect("handled")
    }

    // Walks a booking up to the name question.
    async fn walk_to_name(h: &Harness, processor: &WebhookProcessor, capacity: u32) -> Workflow {
        let dept = h.bookings.add_department(h.account_id, "Dental");
        let staff = h.bookings.add_staff(h.account_id, dept.id, "Dr. Rao");
        let slot = h.bookings.add_slot(
            h.account_id,
            staff.id,
            Weekday::Mon,
            NaiveTime::from_hms_opt(10, 30, 0).expect("time"),
            capacity,
        );
        let workflow = entry_workflow(
            h,
            WorkflowGraph::new()
                .with_node(Node::new(
                    "book",
                    NodeKind::BookAppointment(BookAppointmentConfig::default()),
                ))
                .with_node(text("done", "See you soon."))
                .with_edge(Edge::new("book", "done").with_handle("booked")),
            "book",
        );

        let outcome = deliver(processor, h, text_event("hi", morning()), morning()).await;
        assert_eq!(outcome, WebhookOutcome::Ok);
        let (quoted, _) = h.messenger.last_interactive().expect("departments");
        let dept_row = BookingSelection::Department(dept.id).row_id();
        let event = list_event(&dept_row, "Dental", Some(&quoted));
        let outcome = deliver(processor, h, event, morning()).await;
        assert_eq!(outcome, WebhookOutcome::Ok);

        let (quoted, _) = h.messenger.last_interactive().expect("staff");
        let staff_row = BookingSelection::Staff(staff.id).row_id();
        let event = list_event(&staff_row, "Dr. Rao", Some(&quoted));
        deliver(processor, h, event, morning()).await;

        let (quoted, _) = h.messenger.last_interactive().expect("slots");
        let slot_row = BookingSelection::Slot {
            slot_id: slot.id,
            date: morning().date_naive(),
        }
        .row_id();
        let event = list_event(&slot_row, "Mon 09 Mar 10:30", Some(&quoted));
        deliver(processor, h, event, morning()).await;
        workflow
    }

    #[tokio::test]
    async fn booking_walk_through_webhooks() {
        let h = Harness::new();
        let processor = h.processor();
        let workflow = walk_to_name(&h, &processor, 1).await;

        // Name capture arrives as plain text and must not count as an inquiry.
        let later = morning() + Duration::minutes(5);
        let outcome = deliver(&processor, &h, text_event("Asha", later), later).await;
        assert_eq!(outcome, WebhookOutcome::Captured);

        let bookings = h.bookings.bookings();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].customer_name.as_deref(), Some("Asha"));
        assert_eq!(h.messenger.texts().last().map(String::as_str), Some("See you soon."));
        let state = h.conversations.get(workflow.id, PHONE).expect("state");
        assert_eq!(state.current_node_id, Some(NodeId::from("done")));
        assert!(state.context.booking().is_none());
    }

    #[tokio::test]
    async fn failed_confirmation_send_does_not_book_twice() {
        let h = Harness::new();
        let processor = h.processor();
        let workflow = walk_to_name(&h, &processor, 2).await;

        h.messenger.fail_sends();
        let later = morning() + Duration::minutes(5);
        let outcome = deliver(&processor, &h, text_event("Asha", later), later).await;
        assert_eq!(outcome, WebhookOutcome::Captured);
        assert_eq!(h.bookings.bookings().len(), 1);
        let state = h.conversations.get(workflow.id, PHONE).expect("state");
        assert!(state.context.booking().is_none());

        // The provider redelivers the same text once sends work again.
        h.messenger.resume_sends();
        let retry = later + Duration::minutes(1);
        let outcome = deliver(&processor, &h, text_event("Asha", retry), retry).await;
        assert_eq!(outcome, WebhookOutcome::Inquiry);
        assert_eq!(h.bookings.bookings().len(), 1);
    }

    #[tokio::test]
    async fn replayed_reply_owned_elsewhere_stays_unhandled() {
        let h = Harness::new();
        let workflow = h.workflow(welcome_graph());
        let elsewhere = Workflow::new(h.account_id, "Elsewhere", "other-token");
        h.sent_messages
            .record(&chatflow_conversation::SentMessageRecord::new(
                elsewhere.id,
                "wamid.out.elsewhere",
                PHONE,
                "quickReply",
            ))
            .await
            .expect("record");
        let processor = h.processor();
        let reply = payload(vec![button_event("btn_hours", "Hours", Some("wamid.out.elsewhere"))]);

        for _ in 0..2 {
            let outcome = processor
                .handle(h.account_id, TOKEN, &reply, morning())
                .await
                .expect("reply");
            assert_eq!(outcome, WebhookOutcome::NotHandled);
        }
        assert!(h.conversations.get(workflow.id, PHONE).is_none());
        assert!(h.messenger.sent().is_empty());
        assert!(h.execution_logs.entries().is_empty());
    }

    #[test]
    fn outcome_merge_prefers_work_done() {
        assert_eq!(
            WebhookOutcome::Ignored.merge(WebhookOutcome::Inquiry),
            WebhookOutcome::Inquiry
        );
        assert_eq!(
            WebhookOutcome::Ok.merge(WebhookOutcome::NotHandled),
            WebhookOutcome::Ok
        );
        assert_eq!(WebhookOutcome::NotHandled.as_str(), "not_handled");
    }
}
