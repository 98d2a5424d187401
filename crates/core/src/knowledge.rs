use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailAction {
    #[default]
    None,
    Intervened,
}

impl GuardrailAction {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Intervened => "INTERVENED",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedReference {
    pub content: Option<String>,
    pub location: Option<String>,
}

/// A span of the generated answer together with the documents it was grounded on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub generated_text: Option<String>,
    pub references: Vec<RetrievedReference>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub text: String,
    pub citations: Vec<Citation>,
    pub guardrail_action: GuardrailAction,
}

impl AnswerPayload {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Self::default() }
    }

    pub fn reference_count(&self) -> usize {
        self.citations.iter().map(|citation| citation.references.len()).sum()
    }
}

/// Retrieval-augmented answering backend.
#[async_trait]
pub trait KnowledgeClient: Send + Sync {
    async fn query(&self, text: &str) -> Result<AnswerPayload, BackendError>;
}

#[async_trait]
impl<T> KnowledgeClient for Arc<T>
where
    T: KnowledgeClient + ?Sized,
{
    async fn query(&self, text: &str) -> Result<AnswerPayload, BackendError> {
        (**self).query(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::{AnswerPayload, Citation, GuardrailAction, RetrievedReference};

    #[test]
    fn reference_count_sums_across_citations() {
        let payload = AnswerPayload {
            text: "answer".to_owned(),
            citations: vec![
                Citation {
                    generated_text: Some("first".to_owned()),
                    references: vec![RetrievedReference::default(), RetrievedReference::default()],
                },
                Citation { generated_text: None, references: vec![RetrievedReference::default()] },
            ],
            guardrail_action: GuardrailAction::None,
        };

        assert_eq!(payload.reference_count(), 3);
    }

    #[test]
    fn guardrail_action_uses_service_spelling() {
        let encoded = serde_json::to_string(&GuardrailAction::Intervened).expect("serialize");
        assert_eq!(encoded, "\"INTERVENED\"");
        assert_eq!(GuardrailAction::default().as_key(), "NONE");
        assert_eq!(AnswerPayload::text_only("x").citations.len(), 0);
    }
}
