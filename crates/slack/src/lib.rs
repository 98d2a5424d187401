//! Slack side of the knowledge base bridge.
//!
//! - **Signature** (`signature`) - `v0` request signing and replay window
//! - **Slash Commands** (`commands`) - form parsing into a [`CommandInvocation`]
//! - **Orchestrator** (`orchestrator`) - fast acknowledgment, deferred fulfillment
//! - **Delivery** (`respond`, `worker`) - reply posting and the fulfillment hand-off
//! - **Block Kit** (`blocks`, `messages`) - reply envelopes and configurable wording
//!
//! # Flow
//!
//! ```text
//! POST /slack/commands → SignatureVerifier → normalize_command → acknowledge ─→ ack (HTTP 200)
//!                                                                   │
//!                                          FulfillmentQueue ←───────┘
//!                                                 ↓  (AckGate opens once the ack is written)
//!                             fulfill → KnowledgeClient → mrkdwn → Responder
//! ```

pub mod blocks;
pub mod commands;
pub mod messages;
pub mod orchestrator;
pub mod respond;
pub mod signature;
pub mod worker;

pub use commands::{normalize_command, CommandInvocation, CommandParseError, SlashCommandPayload};
pub use messages::{MessageTemplates, TemplateError};
pub use orchestrator::{
    AckDecision, Acknowledgement, CommandOrchestrator, FulfillmentJob, InvocationState,
};
pub use respond::{CommandReply, DeliveryError, Responder, ResponseTarget, SlackResponder};
pub use signature::{SignatureError, SignatureVerifier};
pub use worker::{ack_gate, fulfillment_channel, AckGate, AckSent, FulfillmentQueue, FulfillmentWorker};
