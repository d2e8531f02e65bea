//! The node executor.
//!
//! Runs a chain of nodes from a starting node, continuing through message
//! and action nodes and stopping at the first node that waits for the
//! participant. Conversation state is saved after every node, before the
//! chain moves on, so a failure later in the chain never replays an
//! earlier node against stale state.
//!
//! A chain visits at most as many nodes as the graph has; exceeding that
//! means the graph has a cycle of non-interactive nodes and the chain is
//! aborted.

use crate::error::ExecutionError;
use crate::render::{OutboundMessage, render_flow_message, render_node};
use chatflow_booking::{BookingScope, BookingSubFlow, FlowStep, FlowTransition};
use chatflow_conversation::{
    ConversationContext, ConversationState, ConversationStore, MessageKind, SentMessageRecord,
    SentMessageStore, SentResponse, WorkflowExecutionLog,
};
use chatflow_core::AccountId;
use chatflow_integration::{
    ChannelDirectory, DomainAllowlist, MessagingClient, SecureHttpAction, SettingsStore,
    setting_keys,
};
use chatflow_workflow::{
    HttpActionConfig, Node, NodeId, NodeKind, Workflow, resolve_outcome, resolve_primary_outcome,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Facts about the inbound event a chain runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFacts {
    pub phone: String,
    /// Text body, or the title of the pressed button or row.
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub local_date: NaiveDate,
    pub local_time: NaiveTime,
}

impl EventFacts {
    /// Template scope for HTTP actions: the context variables plus
    /// `phone`, `text` and `timestamp`.
    #[must_use]
    pub fn template_scope(&self, context: &ConversationContext) -> JsonValue {
        let mut scope = context.vars().clone();
        scope.insert("phone".to_string(), json!(self.phone));
        scope.insert("text".to_string(), json!(self.text));
        scope.insert("timestamp".to_string(), json!(self.timestamp.to_rfc3339()));
        JsonValue::Object(scope)
    }

    /// Scope for the booking sub-flow.
    #[must_use]
    pub fn booking_scope(&self, account_id: AccountId) -> BookingScope {
        BookingScope {
            account_id,
            phone: self.phone.clone(),
            today: self.local_date,
            now: self.local_time,
        }
    }
}

/// Where a chain starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStart {
    /// Execute this node first.
    Node(NodeId),
    /// Execute only this node and leave the conversation on it.
    Entry(NodeId),
    /// Deliver a booking step produced for this booking node, then carry
    /// on from its outcome.
    FlowStep { node_id: NodeId, step: FlowStep },
}

/// What one chain did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainReport {
    pub responses: Vec<SentResponse>,
    pub error: Option<ExecutionError>,
}

impl ChainReport {
    /// Builds the execution log entry for this chain.
    #[must_use]
    pub fn to_log(
        &self,
        workflow: &Workflow,
        phone: &str,
        kind: MessageKind,
        trigger: JsonValue,
    ) -> WorkflowExecutionLog {
        let entry = WorkflowExecutionLog::new(workflow.id, phone, kind, trigger)
            .with_responses(self.responses.clone());
        match &self.error {
            Some(error) => entry.failed(error.to_string()),
            None => entry,
        }
    }
}

/// Collaborators the executor sends and stores through.
#[derive(Clone)]
pub struct ExecutorDeps {
    pub conversations: Arc<dyn ConversationStore>,
    pub sent_messages: Arc<dyn SentMessageStore>,
    pub messaging: Arc<dyn MessagingClient>,
    pub channels: Arc<dyn ChannelDirectory>,
    pub settings: Arc<dyn SettingsStore>,
}

/// Executes node chains.
#[derive(Clone)]
pub struct ChainExecutor {
    deps: ExecutorDeps,
    http: SecureHttpAction,
    booking: BookingSubFlow,
}

// Per-chain scratch: the send token and pacing are looked up once.
struct Chain<'a> {
    workflow: &'a Workflow,
    facts: &'a EventFacts,
    responses: Vec<SentResponse>,
    token: Option<String>,
    delay: Option<Duration>,
    sends: usize,
}

impl ChainExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(deps: ExecutorDeps, http: SecureHttpAction, booking: BookingSubFlow) -> Self {
        Self {
            deps,
            http,
            booking,
        }
    }

    /// Returns the booking sub-flow driver.
    #[must_use]
    pub fn booking(&self) -> &BookingSubFlow {
        &self.booking
    }

    /// Runs a chain. Never fails: the first error stops the chain and is
    /// returned in the report with every response sent before it.
    #[instrument(skip_all, fields(workflow_id = %workflow.id, phone = %facts.phone))]
    pub async fn run(
        &self,
        workflow: &Workflow,
        facts: &EventFacts,
        state: &mut ConversationState,
        start: ChainStart,
    ) -> ChainReport {
        let mut chain = Chain {
            workflow,
            facts,
            responses: Vec::new(),
            token: None,
            delay: None,
            sends: 0,
        };
        let result = self.drive(&mut chain, state, start).await;
        let error = match result {
            Ok(()) => {
                info!(responses = chain.responses.len(), "chain complete");
                None
            }
            Err(e) => {
                warn!(error = %e, responses = chain.responses.len(), "chain stopped");
                Some(e)
            }
        };
        ChainReport {
            responses: chain.responses,
            error,
        }
    }

    async fn drive(
        &self,
        chain: &mut Chain<'_>,
        state: &mut ConversationState,
        start: ChainStart,
    ) -> Result<(), ExecutionError> {
        let workflow = chain.workflow;
        let graph = &workflow.graph;
        let limit = graph.node_count();
        let mut visited = 0usize;
        let (mut current, mut pending_step, single) = match start {
            ChainStart::Node(node_id) => (Some(node_id), None, false),
            ChainStart::Entry(node_id) => (Some(node_id), None, true),
            ChainStart::FlowStep { node_id, step } => (Some(node_id), Some(step), false),
        };

        while let Some(node_id) = current.take() {
            let Some(node) = graph.node(&node_id) else {
                warn!(node_id = %node_id, "edge target does not exist; chain ends");
                return Ok(());
            };
            visited += 1;
            if visited > limit {
                error!(node_id = %node_id, limit, "chain visited more nodes than the graph has");
                return Err(ExecutionError::CycleDetected { node_id, limit });
            }

            let next = match pending_step.take() {
                Some(step) => self.deliver_step(chain, state, node, step).await?,
                None => self.execute_node(chain, state, node).await?,
            };
            if single {
                return Ok(());
            }
            current = next;
        }
        Ok(())
    }

    async fn execute_node(
        &self,
        chain: &mut Chain<'_>,
        state: &mut ConversationState,
        node: &Node,
    ) -> Result<Option<NodeId>, ExecutionError> {
        debug!(node_id = %node.id, kind = node.kind.type_tag(), "executing node");
        match &node.kind {
            NodeKind::Text(_) | NodeKind::Media(_) | NodeKind::Location(_) => {
                if let Some(message) = render_node(&node.kind) {
                    self.send(chain, node, &message).await?;
                }
                self.save_at(state, node).await?;
                Ok(chain
                    .workflow
                    .graph
                    .first_outgoing(&node.id)
                    .map(|edge| edge.target.clone()))
            }
            NodeKind::QuickReply(_)
            | NodeKind::List(_)
            | NodeKind::Buttons(_)
            | NodeKind::Carousel(_) => {
                if let Some(message) = render_node(&node.kind) {
                    let message_id = self.send(chain, node, &message).await?;
                    self.record_sent(chain, node, &message_id).await;
                }
                self.save_at(state, node).await?;
                Ok(None)
            }
            NodeKind::HttpAction(config) => self.run_http(chain, state, node, config).await,
            NodeKind::BookAppointment(config) => {
                let scope = chain.facts.booking_scope(chain.workflow.account_id);
                let step = self
                    .booking
                    .start_booking(&scope, &node.id, config, &mut state.context)
                    .await
                    .map_err(|e| booking_error(node, &e))?;
                self.deliver_step(chain, state, node, step).await
            }
            NodeKind::CheckBookings(config) => {
                let scope = chain.facts.booking_scope(chain.workflow.account_id);
                let step = self
                    .booking
                    .start_check(&scope, &node.id, config, &mut state.context)
                    .await
                    .map_err(|e| booking_error(node, &e))?;
                self.deliver_step(chain, state, node, step).await
            }
            NodeKind::Unsupported { kind, reason } => Err(ExecutionError::UnsupportedNode {
                node_id: node.id.clone(),
                kind: kind.clone(),
                reason: reason.clone(),
            }),
        }
    }

    async fn run_http(
        &self,
        chain: &mut Chain<'_>,
        state: &mut ConversationState,
        node: &Node,
        config: &HttpActionConfig,
    ) -> Result<Option<NodeId>, ExecutionError> {
        let scope = chain.facts.template_scope(&state.context);
        let allowlist = self.allowlist().await;
        let outcome = self.http.execute(config, &scope, &allowlist).await;

        state
            .context
            .set(node.id.as_str(), outcome.to_context_value());
        state.context.merge(outcome.mapped.clone());
        self.save_at(state, node).await?;

        let handle = outcome.handle();
        let next = resolve_outcome(&chain.workflow.graph, &node.id, handle);
        if next.is_none() {
            debug!(node_id = %node.id, handle, "no edge for http outcome");
        }
        Ok(next.map(|edge| edge.target.clone()))
    }

    async fn deliver_step(
        &self,
        chain: &mut Chain<'_>,
        state: &mut ConversationState,
        node: &Node,
        step: FlowStep,
    ) -> Result<Option<NodeId>, ExecutionError> {
        // The sub-flow may already have written a booking; its state must
        // be stored before a send can fail.
        self.save_at(state, node).await?;
        for message in &step.messages {
            let outbound = render_flow_message(message);
            let message_id = self.send(chain, node, &outbound).await?;
            if outbound.is_interactive() {
                self.record_sent(chain, node, &message_id).await;
            }
        }

        match step.transition {
            FlowTransition::AwaitReply | FlowTransition::Stop => Ok(None),
            FlowTransition::Follow(handle) => {
                let next = resolve_primary_outcome(&chain.workflow.graph, &node.id, handle);
                if next.is_none() {
                    debug!(node_id = %node.id, handle, "no edge for booking outcome");
                }
                Ok(next.map(|edge| edge.target.clone()))
            }
        }
    }

    async fn send(
        &self,
        chain: &mut Chain<'_>,
        node: &Node,
        message: &OutboundMessage,
    ) -> Result<String, ExecutionError> {
        if chain.sends > 0 {
            let delay = self.pacing(chain).await;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        let token = self.token(chain).await?;
        let to = chain.facts.phone.as_str();
        let messaging = &self.deps.messaging;
        let sent = match message {
            OutboundMessage::Text(body) => messaging.send_text(&token, to, body).await,
            OutboundMessage::Interactive(message) => {
                messaging.send_interactive(&token, to, message).await
            }
            OutboundMessage::Media(message) => messaging.send_media(&token, to, message).await,
            OutboundMessage::Location(message) => {
                messaging.send_location(&token, to, message).await
            }
        };
        let message_id = sent.map_err(|e| ExecutionError::SendFailed {
            node_id: node.id.clone(),
            details: e.to_string(),
        })?;

        chain.sends += 1;
        chain.responses.push(SentResponse {
            node_id: node.id.clone(),
            kind: node.kind.type_tag().to_string(),
            provider_message_id: Some(message_id.clone()),
        });
        Ok(message_id)
    }

    async fn token(&self, chain: &mut Chain<'_>) -> Result<String, ExecutionError> {
        if let Some(token) = &chain.token {
            return Ok(token.clone());
        }
        let account_id = chain.workflow.account_id;
        let channel = self
            .deps
            .channels
            .active_channel(account_id)
            .await
            .map_err(|e| ExecutionError::Lookup {
                details: e.to_string(),
            })?
            .filter(|channel| channel.is_usable())
            .ok_or(ExecutionError::NoChannel { account_id })?;
        chain.token = Some(channel.token.clone());
        Ok(channel.token)
    }

    async fn pacing(&self, chain: &mut Chain<'_>) -> Duration {
        if let Some(delay) = chain.delay {
            return delay;
        }
        let delay = match self
            .deps
            .settings
            .get_setting(setting_keys::CHAIN_MESSAGE_DELAY_MS)
            .await
        {
            Ok(value) => value
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(Duration::ZERO, Duration::from_millis),
            Err(e) => {
                warn!(error = %e, "could not read chain pacing; sending without delay");
                Duration::ZERO
            }
        };
        chain.delay = Some(delay);
        delay
    }

    async fn allowlist(&self) -> DomainAllowlist {
        match self
            .deps
            .settings
            .get_setting(setting_keys::HTTP_ACTION_ALLOWED_DOMAINS)
            .await
        {
            Ok(Some(value)) => DomainAllowlist::parse(&value),
            Ok(None) => DomainAllowlist::default(),
            Err(e) => {
                warn!(error = %e, "could not read http allowlist; rejecting all domains");
                DomainAllowlist::default()
            }
        }
    }

    async fn record_sent(&self, chain: &Chain<'_>, node: &Node, message_id: &str) {
        let record = SentMessageRecord::new(
            chain.workflow.id,
            message_id,
            chain.facts.phone.as_str(),
            node.kind.type_tag(),
        );
        if let Err(e) = self.deps.sent_messages.record(&record).await {
            warn!(error = %e, message_id, "failed to record sent message");
        }
    }

    async fn save_at(
        &self,
        state: &mut ConversationState,
        node: &Node,
    ) -> Result<(), ExecutionError> {
        state.advance_to(node.id.clone());
        self.save(state).await
    }

    /// Saves conversation state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn save(&self, state: &ConversationState) -> Result<(), ExecutionError> {
        self.deps.conversations.save(state).await.map_err(|e| {
            error!(error = %e, "failed to save conversation state");
            ExecutionError::StateSaveFailed {
                details: e.to_string(),
            }
        })
    }
}

fn booking_error(node: &Node, error: &impl std::fmt::Display) -> ExecutionError {
    ExecutionError::Booking {
        node_id: node.id.clone(),
        details: error.to_string(),
    }
}
