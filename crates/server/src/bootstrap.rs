use std::{sync::Arc, time::Duration};

use kbbridge_aws::{AwsClients, KnowledgeClientError};
use kbbridge_core::{
    config::{AppConfig, ConfigError, LoadOptions},
    KnowledgeClient, ParameterStore, ResolutionError, SecretResolver,
};
use kbbridge_slack::{
    fulfillment_channel, CommandOrchestrator, DeliveryError, FulfillmentWorker, MessageTemplates,
    SignatureVerifier, SlackResponder, TemplateError,
};
use thiserror::Error;
use tracing::info;

use crate::{health::HealthState, routes::AppState};

const DELIVERY_TIMEOUT_SECS: u64 = 10;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
    pub health: HealthState,
    pub worker: FulfillmentWorker,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("message templates are invalid: {0}")]
    Template(#[from] TemplateError),
    #[error("secret resolution failed: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("knowledge base client could not be built: {0}")]
    KnowledgeClient(#[from] KnowledgeClientError),
    #[error("reply delivery client could not be built: {0}")]
    Delivery(#[from] DeliveryError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        command = %config.slack.command,
        region = %config.knowledge_base.region,
        "starting application bootstrap"
    );

    let aws = AwsClients::load(&config.knowledge_base.region).await;
    let resolver = SecretResolver::new(aws.parameter_store());
    let knowledge = Arc::new(aws.knowledge_client(&config.knowledge_base)?);

    assemble(config, &resolver, knowledge).await
}

/// Wires the application from already-built collaborators. Both Slack secrets are resolved
/// here, once, so no request pays for a parameter store round trip.
pub async fn assemble<S>(
    config: AppConfig,
    resolver: &SecretResolver<S>,
    knowledge: Arc<dyn KnowledgeClient>,
) -> Result<Application, BootstrapError>
where
    S: ParameterStore,
{
    let templates = MessageTemplates::new(&config.messages)?;

    let signing_secret = resolver.resolve(&config.slack.signing_secret_parameter).await?;
    let bot_token = resolver.resolve(&config.slack.bot_token_parameter).await?;
    info!(
        event_name = "system.bootstrap.secrets_resolved",
        correlation_id = "bootstrap",
        resolved = resolver.resolved_count(),
        "slack credentials resolved"
    );

    let responder = Arc::new(SlackResponder::new(
        &config.slack.api_base_url,
        bot_token,
        Duration::from_secs(DELIVERY_TIMEOUT_SECS),
    )?);
    let orchestrator = Arc::new(CommandOrchestrator::new(knowledge, responder, templates));
    let (queue, worker) = fulfillment_channel(orchestrator.clone());

    let state = AppState {
        command: config.slack.command.clone(),
        verifier: Arc::new(SignatureVerifier::new(
            signing_secret,
            config.slack.request_tolerance_secs,
        )),
        orchestrator,
        queue: queue.clone(),
    };
    let health = HealthState::new(&config, queue);

    Ok(Application { config, state, health, worker })
}
