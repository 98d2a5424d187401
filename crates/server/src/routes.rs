use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures_util::StreamExt;
use kbbridge_slack::{
    ack_gate, normalize_command,
    signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER},
    AckSent, CommandOrchestrator, CommandParseError, FulfillmentQueue, SignatureVerifier,
    SlashCommandPayload,
};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::health::{self, HealthState};

#[derive(Clone)]
pub struct AppState {
    pub command: String,
    pub verifier: Arc<SignatureVerifier>,
    pub orchestrator: Arc<CommandOrchestrator>,
    pub queue: FulfillmentQueue,
}

/// Immediate reply to Slack. Only the invoking user sees it.
#[derive(Debug, Serialize)]
struct EphemeralAck<'a> {
    response_type: &'static str,
    text: &'a str,
}

pub fn router(state: AppState, health_state: HealthState) -> Router {
    Router::new()
        .route("/slack/commands", post(slash_command))
        .with_state(state)
        .merge(health::router(health_state))
        .layer(TraceLayer::new_for_http())
}

async fn slash_command(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    let verified = state.verifier.verify(
        header_str(&headers, TIMESTAMP_HEADER),
        header_str(&headers, SIGNATURE_HEADER),
        &body,
    );
    if let Err(error) = verified {
        warn!(
            event_name = "ingress.slack.signature_rejected",
            correlation_id = %correlation_id,
            reason = error.as_key(),
            error = %error,
            "rejecting unsigned or stale slack request"
        );
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid slack signature" })))
            .into_response();
    }

    let payload = match SlashCommandPayload::from_form(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "ingress.slack.malformed_form",
                correlation_id = %correlation_id,
                error = %error,
                "slash command body could not be parsed"
            );
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error.to_string() })))
                .into_response();
        }
    };

    if payload.is_ssl_check() {
        debug!(event_name = "ingress.slack.ssl_check", correlation_id = %correlation_id);
        return StatusCode::OK.into_response();
    }

    debug!(
        event_name = "ingress.slack.command_received",
        correlation_id = %correlation_id,
        command = %payload.command,
        text = %payload.text,
        user_id = %payload.user_id,
        channel_id = %payload.channel_id,
        team_id = payload.team_id.as_deref().unwrap_or("unknown"),
        trigger_id = payload.trigger_id.as_deref().unwrap_or("unknown"),
        "slash command received"
    );

    let invocation = match normalize_command(payload, &state.command, correlation_id.as_str()) {
        Ok(invocation) => invocation,
        Err(CommandParseError::UnsupportedCommand(command)) => {
            info!(
                event_name = "ingress.slack.unsupported_command",
                correlation_id = %correlation_id,
                command = %command,
                "ignoring command routed to the wrong app"
            );
            let text =
                format!("Unsupported command `{command}`. This app answers `{}`.", state.command);
            return ephemeral(&text);
        }
        Err(error) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error.to_string() })))
                .into_response();
        }
    };

    let decision = state.orchestrator.acknowledge(invocation);
    let ack = ephemeral(decision.ack.text());
    let Some(job) = decision.job else {
        info!(
            event_name = "ingress.slack.ack_sent",
            correlation_id = %correlation_id,
            fulfilling = false,
            "slash command acknowledged"
        );
        return ack;
    };

    let (sent, gate) = ack_gate();
    state.queue.submit(job, gate);
    info!(
        event_name = "ingress.slack.ack_sent",
        correlation_id = %correlation_id,
        fulfilling = true,
        "slash command acknowledged"
    );
    release_after_body(ack, sent)
}

fn ephemeral(text: &str) -> Response {
    (StatusCode::OK, Json(EphemeralAck { response_type: "ephemeral", text })).into_response()
}

/// Moves `sent` into the response body. The fulfillment gate opens when the body is
/// dropped, which happens once it has been written out or the connection is gone.
fn release_after_body(response: Response, sent: AckSent) -> Response {
    let (parts, body) = response.into_parts();
    let body = body.into_data_stream().map(move |chunk| {
        let _held = &sent;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(body))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
