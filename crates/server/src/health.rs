use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use kbbridge_core::AppConfig;
use kbbridge_slack::FulfillmentQueue;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    command: String,
    knowledge_base_id: String,
    queue: FulfillmentQueue,
}

impl HealthState {
    pub fn new(config: &AppConfig, queue: FulfillmentQueue) -> Self {
        Self {
            command: config.slack.command.clone(),
            knowledge_base_id: config.knowledge_base.knowledge_base_id.clone(),
            queue,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub knowledge_base: HealthCheck,
    pub fulfillment: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let fulfillment = if state.queue.is_accepting() {
        HealthCheck { status: "ready", detail: "fulfillment worker accepting jobs".to_string() }
    } else {
        HealthCheck { status: "degraded", detail: "fulfillment worker stopped".to_string() }
    };
    let ready = fulfillment.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: format!("kbbridge-server answering {}", state.command),
        },
        knowledge_base: HealthCheck {
            status: "configured",
            detail: format!("knowledge base {}", state.knowledge_base_id),
        },
        fulfillment,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
