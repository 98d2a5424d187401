use async_trait::async_trait;
use aws_sdk_bedrockagentruntime::{
    error::{DisplayErrorContext, SdkError},
    operation::retrieve_and_generate::{RetrieveAndGenerateError, RetrieveAndGenerateOutput},
    types::{
        self, KnowledgeBaseRetrieveAndGenerateConfiguration, RetrieveAndGenerateConfiguration,
        RetrieveAndGenerateInput, RetrieveAndGenerateType,
    },
    Client,
};
use kbbridge_core::{
    AnswerPayload, BackendError, Citation, GuardrailAction, KnowledgeClient, RetrievedReference,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum KnowledgeClientError {
    #[error("invalid knowledge base configuration: {0}")]
    Configuration(String),
}

/// Bedrock Agent Runtime `RetrieveAndGenerate` against one knowledge base and model.
#[derive(Clone, Debug)]
pub struct BedrockKnowledgeClient {
    client: Client,
    configuration: RetrieveAndGenerateConfiguration,
}

impl BedrockKnowledgeClient {
    pub fn new(
        client: Client,
        knowledge_base_id: &str,
        model_arn: &str,
    ) -> Result<Self, KnowledgeClientError> {
        let knowledge_base = KnowledgeBaseRetrieveAndGenerateConfiguration::builder()
            .knowledge_base_id(knowledge_base_id)
            .model_arn(model_arn)
            .build()
            .map_err(|error| KnowledgeClientError::Configuration(error.to_string()))?;
        let configuration = RetrieveAndGenerateConfiguration::builder()
            .r#type(RetrieveAndGenerateType::KnowledgeBase)
            .knowledge_base_configuration(knowledge_base)
            .build()
            .map_err(|error| KnowledgeClientError::Configuration(error.to_string()))?;

        Ok(Self { client, configuration })
    }
}

#[async_trait]
impl KnowledgeClient for BedrockKnowledgeClient {
    async fn query(&self, text: &str) -> Result<AnswerPayload, BackendError> {
        let input = RetrieveAndGenerateInput::builder()
            .text(text)
            .build()
            .map_err(|error| BackendError::service(error.to_string()))?;

        debug!(event_name = "aws.bedrock.retrieve_and_generate", "sending knowledge base query");
        let output = self
            .client
            .retrieve_and_generate()
            .input(input)
            .retrieve_and_generate_configuration(self.configuration.clone())
            .send()
            .await
            .map_err(classify_sdk_error)?;

        answer_from_output(&output)
    }
}

fn classify_sdk_error(error: SdkError<RetrieveAndGenerateError>) -> BackendError {
    let description = match &error {
        SdkError::ServiceError(service) => DisplayErrorContext(service.err()).to_string(),
        _ => DisplayErrorContext(&error).to_string(),
    };

    match error {
        SdkError::TimeoutError(_) => BackendError::timeout(description),
        SdkError::ServiceError(_) => BackendError::service(description),
        SdkError::ResponseError(_) => BackendError::malformed(description),
        _ => BackendError::transport(description),
    }
}

fn answer_from_output(output: &RetrieveAndGenerateOutput) -> Result<AnswerPayload, BackendError> {
    let text = output
        .output()
        .map(|generated| generated.text().to_owned())
        .ok_or_else(|| BackendError::malformed("knowledge base response has no output"))?;

    let citations = output.citations().iter().map(citation_from).collect();
    let guardrail_action = match output.guardrail_action() {
        Some(types::GuadrailAction::Intervened) => GuardrailAction::Intervened,
        _ => GuardrailAction::None,
    };

    Ok(AnswerPayload { text, citations, guardrail_action })
}

fn citation_from(citation: &types::Citation) -> Citation {
    let generated_text = citation
        .generated_response_part()
        .and_then(|part| part.text_response_part())
        .and_then(|part| part.text())
        .map(str::to_owned);
    let references = citation
        .retrieved_references()
        .iter()
        .map(|reference| RetrievedReference {
            content: reference.content().map(|content| content.text()).map(str::to_owned),
            location: reference.location().and_then(location_uri),
        })
        .collect();

    Citation { generated_text, references }
}

fn location_uri(location: &types::RetrievalResultLocation) -> Option<String> {
    location
        .s3_location()
        .and_then(|s3| s3.uri())
        .or_else(|| location.web_location().and_then(|web| web.url()))
        .map(str::to_owned)
}
