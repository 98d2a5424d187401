//! AWS implementations of the bridge's external collaborators.

pub mod bedrock;
pub mod ssm;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use kbbridge_core::config::KnowledgeBaseConfig;
use tracing::info;

pub use bedrock::{BedrockKnowledgeClient, KnowledgeClientError};
pub use ssm::SsmParameterStore;

/// Shared SDK configuration loaded once at startup. Every client is built from it, so
/// credentials and region are resolved a single time per process.
#[derive(Clone, Debug)]
pub struct AwsClients {
    sdk_config: SdkConfig,
}

impl AwsClients {
    pub async fn load(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;
        info!(event_name = "aws.config.loaded", region, "aws sdk configuration loaded");
        Self { sdk_config }
    }

    pub fn parameter_store(&self) -> SsmParameterStore {
        SsmParameterStore::new(aws_sdk_ssm::Client::new(&self.sdk_config))
    }

    pub fn knowledge_client(
        &self,
        config: &KnowledgeBaseConfig,
    ) -> Result<BedrockKnowledgeClient, KnowledgeClientError> {
        BedrockKnowledgeClient::new(
            aws_sdk_bedrockagentruntime::Client::new(&self.sdk_config),
            &config.knowledge_base_id,
            &config.model_arn,
        )
    }
}

#[cfg(test)]
mod tests {
    use kbbridge_core::config::KnowledgeBaseConfig;

    use super::AwsClients;

    #[tokio::test]
    async fn builds_clients_from_one_sdk_config() {
        let clients = AwsClients::load("us-east-1").await;

        let _store = clients.parameter_store();
        let knowledge = clients.knowledge_client(&KnowledgeBaseConfig {
            knowledge_base_id: "KB123".to_owned(),
            model_arn: "arn:aws:bedrock:us-east-1::foundation-model/anthropic.claude-v2".to_owned(),
            region: "us-east-1".to_owned(),
        });

        assert!(knowledge.is_ok());
    }
}
