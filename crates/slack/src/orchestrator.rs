//! Two-phase slash command protocol.
//!
//! [`CommandOrchestrator::acknowledge`] is the deadline-bound phase: it is synchronous, never
//! touches the knowledge backend, and returns the single acknowledgment together with the
//! job for the second phase. [`CommandOrchestrator::fulfill`] consumes that job on another
//! task, queries the backend and delivers exactly one terminal reply.

use std::sync::Arc;

use kbbridge_core::{mrkdwn, BackendError, KnowledgeClient, UsageError};
use tracing::{error, info, warn};

use crate::{
    blocks::answer_message,
    commands::CommandInvocation,
    messages::MessageTemplates,
    respond::{CommandReply, Responder, ResponseTarget},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvocationState {
    AckPending,
    Fulfilling,
    Delivered,
    Failed,
}

impl InvocationState {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::AckPending => "ack_pending",
            Self::Fulfilling => "fulfilling",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acknowledgement {
    Usage(String),
    Accepted(String),
}

impl Acknowledgement {
    pub fn text(&self) -> &str {
        match self {
            Self::Usage(text) | Self::Accepted(text) => text,
        }
    }
}

/// Work handed from the acknowledgment phase to the fulfillment phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FulfillmentJob {
    pub invocation: CommandInvocation,
    pub query: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckDecision {
    pub ack: Acknowledgement,
    pub job: Option<FulfillmentJob>,
}

impl AckDecision {
    /// `None` when the invocation ends with its acknowledgment.
    pub fn next_state(&self) -> Option<InvocationState> {
        self.job.as_ref().map(|_| InvocationState::Fulfilling)
    }
}

pub struct CommandOrchestrator {
    knowledge: Arc<dyn KnowledgeClient>,
    responder: Arc<dyn Responder>,
    templates: MessageTemplates,
}

impl CommandOrchestrator {
    pub fn new(
        knowledge: Arc<dyn KnowledgeClient>,
        responder: Arc<dyn Responder>,
        templates: MessageTemplates,
    ) -> Self {
        Self { knowledge, responder, templates }
    }

    pub fn acknowledge(&self, invocation: CommandInvocation) -> AckDecision {
        let query = match require_query(&invocation) {
            Ok(query) => query.to_owned(),
            Err(usage) => {
                info!(
                    event_name = "orchestrator.ack.usage",
                    correlation_id = %invocation.correlation_id,
                    command = %invocation.command_name,
                    reason = %usage,
                    "invocation without question answered with usage hint"
                );
                return AckDecision {
                    ack: Acknowledgement::Usage(self.templates.usage(&usage.command)),
                    job: None,
                };
            }
        };

        info!(
            event_name = "orchestrator.ack.accepted",
            correlation_id = %invocation.correlation_id,
            command = %invocation.command_name,
            requester_id = %invocation.requester_id,
            conversation_id = %invocation.conversation_id,
            "invocation accepted for fulfillment"
        );
        let ack =
            Acknowledgement::Accepted(self.templates.accepted(&invocation.command_name, &query));
        AckDecision { ack, job: Some(FulfillmentJob { invocation, query }) }
    }

    /// Runs to completion. Backend and delivery failures end in [`InvocationState::Failed`]
    /// and are never returned to the caller.
    pub async fn fulfill(&self, job: FulfillmentJob) -> InvocationState {
        let FulfillmentJob { invocation, query } = job;
        let correlation_id = invocation.correlation_id.as_str();
        let command = invocation.command_name.as_str();
        info!(
            event_name = "orchestrator.fulfillment.started",
            correlation_id,
            command,
            query = %query,
            "querying knowledge base"
        );

        let (reply, state) = match self.knowledge.query(&query).await {
            Ok(answer) => {
                info!(
                    event_name = "orchestrator.fulfillment.answered",
                    correlation_id,
                    references = answer.reference_count(),
                    guardrail_action = answer.guardrail_action.as_key(),
                    "knowledge base answered"
                );
                let translated = mrkdwn::convert(&answer.text);
                (CommandReply::Answer(answer_message(command, &translated)), InvocationState::Delivered)
            }
            Err(backend) => {
                error!(
                    event_name = "orchestrator.backend_error",
                    correlation_id,
                    kind = backend.kind().as_key(),
                    error = backend.description(),
                    "knowledge base query failed"
                );
                (CommandReply::Error(self.failure_text(command, &backend)), InvocationState::Failed)
            }
        };

        let reply_kind = reply.as_key();
        match self.responder.respond(&ResponseTarget::from(&invocation), reply).await {
            Ok(()) => {
                info!(
                    event_name = "orchestrator.fulfillment.delivered",
                    correlation_id,
                    reply = reply_kind,
                    state = state.as_key(),
                    "terminal reply delivered"
                );
                state
            }
            Err(delivery) => {
                error!(
                    event_name = "orchestrator.delivery_failed",
                    correlation_id,
                    reply = reply_kind,
                    error = %delivery,
                    "terminal reply could not be delivered"
                );
                InvocationState::Failed
            }
        }
    }

    fn failure_text(&self, command: &str, backend: &BackendError) -> String {
        let text = self.templates.failure(command, backend.description());
        if text.contains(backend.description()) {
            return text;
        }
        // A custom template that drops the description would hide the cause from the user.
        warn!(event_name = "messages.failure_without_error", command, "appending error description");
        format!("{text} Error: {}", backend.description())
    }
}

fn require_query(invocation: &CommandInvocation) -> Result<&str, UsageError> {
    invocation
        .query_text
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .ok_or_else(|| UsageError { command: invocation.command_name.clone() })
}
