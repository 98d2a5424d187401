use serde::Deserialize;
use thiserror::Error;

/// Form fields Slack posts for a slash command. Only the fields the bridge reads are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SlashCommandPayload {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub response_url: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub trigger_id: Option<String>,
    #[serde(default)]
    pub ssl_check: Option<String>,
}

impl SlashCommandPayload {
    pub fn from_form(body: &[u8]) -> Result<Self, CommandParseError> {
        serde_urlencoded::from_bytes(body)
            .map_err(|error| CommandParseError::MalformedForm(error.to_string()))
    }

    /// Slack periodically probes the endpoint's certificate with `ssl_check=1`.
    pub fn is_ssl_check(&self) -> bool {
        self.ssl_check.as_deref().map(str::trim) == Some("1")
    }
}

/// A verified, parsed slash command. Lives for exactly one ack/reply cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command_name: String,
    pub query_text: Option<String>,
    pub requester_id: String,
    pub conversation_id: String,
    pub response_url: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("malformed slash command form body: {0}")]
    MalformedForm(String),
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

pub fn normalize_command(
    payload: SlashCommandPayload,
    expected_command: &str,
    correlation_id: impl Into<String>,
) -> Result<CommandInvocation, CommandParseError> {
    let command = payload.command.trim();
    if !command.eq_ignore_ascii_case(expected_command.trim()) {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let query_text = Some(payload.text.trim()).filter(|text| !text.is_empty()).map(str::to_owned);
    let response_url = payload
        .response_url
        .map(|url| url.trim().to_owned())
        .filter(|url| !url.is_empty());

    Ok(CommandInvocation {
        command_name: command.to_owned(),
        query_text,
        requester_id: payload.user_id,
        conversation_id: payload.channel_id,
        response_url,
        correlation_id: correlation_id.into(),
    })
}
