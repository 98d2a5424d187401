use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::{blocks::MessageTemplate, commands::CommandInvocation};

/// Where the terminal reply for an invocation goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseTarget {
    pub response_url: Option<String>,
    pub conversation_id: String,
}

impl From<&CommandInvocation> for ResponseTarget {
    fn from(invocation: &CommandInvocation) -> Self {
        Self {
            response_url: invocation.response_url.clone(),
            conversation_id: invocation.conversation_id.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandReply {
    Answer(MessageTemplate),
    Error(String),
}

impl CommandReply {
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Answer(_) => "answer",
            Self::Error(_) => "error",
        }
    }

    /// JSON body shared by `response_url` posts and `chat.postMessage`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Answer(message) => json!({ "text": message.fallback_text, "blocks": message.blocks }),
            Self::Error(text) => json!({ "text": text }),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("reply transport failed: {0}")]
    Transport(String),
    #[error("reply endpoint answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("slack api rejected reply: {0}")]
    Api(String),
    #[error("invocation has neither a response url nor a conversation")]
    NoTarget,
}

/// Delivers the single terminal reply of an invocation.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, target: &ResponseTarget, reply: CommandReply)
        -> Result<(), DeliveryError>;
}

#[async_trait]
impl<T> Responder for Arc<T>
where
    T: Responder + ?Sized,
{
    async fn respond(
        &self,
        target: &ResponseTarget,
        reply: CommandReply,
    ) -> Result<(), DeliveryError> {
        (**self).respond(target, reply).await
    }
}

#[derive(Debug, Deserialize)]
struct ChatPostMessageResponse {
    ok: bool,
    error: Option<String>,
}

/// Posts replies to the invocation's `response_url`, or through `chat.postMessage` with the
/// bot token when Slack did not provide one.
pub struct SlackResponder {
    http: reqwest::Client,
    api_base: String,
    bot_token: SecretString,
}

impl SlackResponder {
    pub fn new(
        api_base: &str,
        bot_token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kbbridge/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        Ok(Self { http, api_base: api_base.trim_end_matches('/').to_owned(), bot_token })
    }

    async fn post_response_url(&self, url: &str, body: &Value) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status { status: status.as_u16(), body })
    }

    async fn post_message(&self, channel: &str, mut body: Value) -> Result<(), DeliveryError> {
        body["channel"] = Value::String(channel.to_owned());

        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status { status: status.as_u16(), body });
        }

        let parsed = response
            .json::<ChatPostMessageResponse>()
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;
        if parsed.ok {
            Ok(())
        } else {
            Err(DeliveryError::Api(parsed.error.unwrap_or_else(|| "unknown error".to_owned())))
        }
    }
}

#[async_trait]
impl Responder for SlackResponder {
    async fn respond(
        &self,
        target: &ResponseTarget,
        reply: CommandReply,
    ) -> Result<(), DeliveryError> {
        let body = reply.to_json();
        match target.response_url.as_deref() {
            Some(url) => self.post_response_url(url, &body).await,
            None if !target.conversation_id.trim().is_empty() => {
                self.post_message(&target.conversation_id, body).await
            }
            None => Err(DeliveryError::NoTarget),
        }
    }
}
