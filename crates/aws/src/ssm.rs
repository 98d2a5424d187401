use async_trait::async_trait;
use aws_sdk_ssm::{error::DisplayErrorContext, Client};
use kbbridge_core::{ParameterStore, ResolutionError};
use tracing::debug;

/// SSM Parameter Store reads with decryption, so `SecureString` parameters come back in clear.
#[derive(Clone, Debug)]
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<String, ResolutionError> {
        debug!(event_name = "aws.ssm.get_parameter", parameter = name, "reading parameter");

        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|error| {
                let not_found = error
                    .as_service_error()
                    .is_some_and(|service| service.is_parameter_not_found());
                if not_found {
                    ResolutionError::NotFound { name: name.to_owned() }
                } else {
                    ResolutionError::Unreachable {
                        name: name.to_owned(),
                        description: DisplayErrorContext(&error).to_string(),
                    }
                }
            })?;

        output
            .parameter()
            .and_then(|parameter| parameter.value())
            .map(str::to_owned)
            .ok_or_else(|| ResolutionError::Empty { name: name.to_owned() })
    }
}
