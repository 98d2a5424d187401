use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub knowledge_base: KnowledgeBaseConfig,
    pub messages: MessagesConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub command: String,
    pub bot_token_parameter: String,
    pub signing_secret_parameter: String,
    pub request_tolerance_secs: u64,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct KnowledgeBaseConfig {
    pub knowledge_base_id: String,
    pub model_arn: String,
    pub region: String,
}

/// Tera templates for the user-visible wording.
#[derive(Clone, Debug)]
pub struct MessagesConfig {
    pub usage: String,
    pub accepted: String,
    pub failure: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub command: Option<String>,
    pub bot_token_parameter: Option<String>,
    pub signing_secret_parameter: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub model_arn: Option<String>,
    pub region: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_USAGE_TEMPLATE: &str = ":x: Usage: {{ command }} <your question here>";
pub const DEFAULT_ACCEPTED_TEMPLATE: &str =
    "Accepted Task. Generating response... :hourglass_flowing_sand:";
pub const DEFAULT_FAILURE_TEMPLATE: &str =
    "{{ command }} - Sorry an error occurred. Please try again later. Error: {{ error }}";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                command: "/ask".to_string(),
                bot_token_parameter: String::new(),
                signing_secret_parameter: String::new(),
                request_tolerance_secs: 300,
                api_base_url: "https://slack.com/api".to_string(),
            },
            knowledge_base: KnowledgeBaseConfig {
                knowledge_base_id: String::new(),
                model_arn: String::new(),
                region: String::new(),
            },
            messages: MessagesConfig {
                usage: DEFAULT_USAGE_TEMPLATE.to_string(),
                accepted: DEFAULT_ACCEPTED_TEMPLATE.to_string(),
                failure: DEFAULT_FAILURE_TEMPLATE.to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("kbbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(command) = slack.command {
                self.slack.command = command;
            }
            if let Some(bot_token_parameter) = slack.bot_token_parameter {
                self.slack.bot_token_parameter = bot_token_parameter;
            }
            if let Some(signing_secret_parameter) = slack.signing_secret_parameter {
                self.slack.signing_secret_parameter = signing_secret_parameter;
            }
            if let Some(request_tolerance_secs) = slack.request_tolerance_secs {
                self.slack.request_tolerance_secs = request_tolerance_secs;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(knowledge_base) = patch.knowledge_base {
            if let Some(knowledge_base_id) = knowledge_base.knowledge_base_id {
                self.knowledge_base.knowledge_base_id = knowledge_base_id;
            }
            if let Some(model_arn) = knowledge_base.model_arn {
                self.knowledge_base.model_arn = model_arn;
            }
            if let Some(region) = knowledge_base.region {
                self.knowledge_base.region = region;
            }
        }

        if let Some(messages) = patch.messages {
            if let Some(usage) = messages.usage {
                self.messages.usage = usage;
            }
            if let Some(accepted) = messages.accepted {
                self.messages.accepted = accepted;
            }
            if let Some(failure) = messages.failure {
                self.messages.failure = failure;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // The un-prefixed aliases are the variable names existing deployments already set.
        if let Some(value) = read_env("KBBRIDGE_SLACK_COMMAND").or_else(|| read_env("SLACK_SLASH_COMMAND"))
        {
            self.slack.command = value;
        }
        if let Some(value) = read_env("KBBRIDGE_SLACK_BOT_TOKEN_PARAMETER")
            .or_else(|| read_env("SLACK_BOT_TOKEN_PARAMETER"))
        {
            self.slack.bot_token_parameter = value;
        }
        if let Some(value) = read_env("KBBRIDGE_SLACK_SIGNING_SECRET_PARAMETER")
            .or_else(|| read_env("SLACK_SIGNING_SECRET_PARAMETER"))
        {
            self.slack.signing_secret_parameter = value;
        }
        if let Some(value) = read_env("KBBRIDGE_SLACK_REQUEST_TOLERANCE_SECS") {
            self.slack.request_tolerance_secs =
                parse_u64("KBBRIDGE_SLACK_REQUEST_TOLERANCE_SECS", &value)?;
        }
        if let Some(value) = read_env("KBBRIDGE_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) =
            read_env("KBBRIDGE_KNOWLEDGE_BASE_ID").or_else(|| read_env("KNOWLEDGEBASE_ID"))
        {
            self.knowledge_base.knowledge_base_id = value;
        }
        if let Some(value) =
            read_env("KBBRIDGE_KNOWLEDGE_BASE_MODEL_ARN").or_else(|| read_env("INFERENCE_PROFILE_ID"))
        {
            self.knowledge_base.model_arn = value;
        }
        if let Some(value) =
            read_env("KBBRIDGE_KNOWLEDGE_BASE_REGION").or_else(|| read_env("AWS_REGION"))
        {
            self.knowledge_base.region = value;
        }

        if let Some(value) = read_env("KBBRIDGE_MESSAGES_USAGE") {
            self.messages.usage = value;
        }
        if let Some(value) = read_env("KBBRIDGE_MESSAGES_ACCEPTED") {
            self.messages.accepted = value;
        }
        if let Some(value) = read_env("KBBRIDGE_MESSAGES_FAILURE") {
            self.messages.failure = value;
        }

        if let Some(value) = read_env("KBBRIDGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("KBBRIDGE_SERVER_PORT") {
            self.server.port = parse_u16("KBBRIDGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("KBBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("KBBRIDGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("KBBRIDGE_LOGGING_LEVEL").or_else(|| read_env("KBBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("KBBRIDGE_LOGGING_FORMAT").or_else(|| read_env("KBBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(command) = overrides.command {
            self.slack.command = command;
        }
        if let Some(bot_token_parameter) = overrides.bot_token_parameter {
            self.slack.bot_token_parameter = bot_token_parameter;
        }
        if let Some(signing_secret_parameter) = overrides.signing_secret_parameter {
            self.slack.signing_secret_parameter = signing_secret_parameter;
        }
        if let Some(knowledge_base_id) = overrides.knowledge_base_id {
            self.knowledge_base.knowledge_base_id = knowledge_base_id;
        }
        if let Some(model_arn) = overrides.model_arn {
            self.knowledge_base.model_arn = model_arn;
        }
        if let Some(region) = overrides.region {
            self.knowledge_base.region = region;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_knowledge_base(&self.knowledge_base)?;
        validate_messages(&self.messages)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("kbbridge.toml"), PathBuf::from("config/kbbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Expands `${VAR}` from the environment. Tera's `{{ }}` syntax is left alone.
fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let command = slack.command.trim();
    if !command.starts_with('/') || command.len() < 2 || command.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(format!(
            "slack.command must look like `/name` without whitespace (got `{command}`)"
        )));
    }

    if slack.bot_token_parameter.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token_parameter is required (set SLACK_BOT_TOKEN_PARAMETER to the parameter store name holding the xoxb- token)".to_string(),
        ));
    }
    if slack.signing_secret_parameter.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret_parameter is required (set SLACK_SIGNING_SECRET_PARAMETER to the parameter store name holding the signing secret)".to_string(),
        ));
    }

    if slack.request_tolerance_secs == 0 || slack.request_tolerance_secs > 3_600 {
        return Err(ConfigError::Validation(
            "slack.request_tolerance_secs must be in range 1..=3600".to_string(),
        ));
    }

    if !slack.api_base_url.starts_with("http://") && !slack.api_base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_knowledge_base(knowledge_base: &KnowledgeBaseConfig) -> Result<(), ConfigError> {
    if knowledge_base.knowledge_base_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "knowledge_base.knowledge_base_id is required (KNOWLEDGEBASE_ID)".to_string(),
        ));
    }
    if knowledge_base.model_arn.trim().is_empty() {
        return Err(ConfigError::Validation(
            "knowledge_base.model_arn is required (INFERENCE_PROFILE_ID)".to_string(),
        ));
    }
    if knowledge_base.region.trim().is_empty() {
        return Err(ConfigError::Validation(
            "knowledge_base.region is required (AWS_REGION)".to_string(),
        ));
    }

    Ok(())
}

fn validate_messages(messages: &MessagesConfig) -> Result<(), ConfigError> {
    for (key, template) in [
        ("messages.usage", &messages.usage),
        ("messages.accepted", &messages.accepted),
        ("messages.failure", &messages.failure),
    ] {
        if template.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{key} must not be empty")));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    knowledge_base: Option<KnowledgeBasePatch>,
    messages: Option<MessagesPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    command: Option<String>,
    bot_token_parameter: Option<String>,
    signing_secret_parameter: Option<String>,
    request_tolerance_secs: Option<u64>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeBasePatch {
    knowledge_base_id: Option<String>,
    model_arn: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagesPatch {
    usage: Option<String>,
    accepted: Option<String>,
    failure: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "KBBRIDGE_SLACK_COMMAND",
        "SLACK_SLASH_COMMAND",
        "KBBRIDGE_SLACK_BOT_TOKEN_PARAMETER",
        "SLACK_BOT_TOKEN_PARAMETER",
        "KBBRIDGE_SLACK_SIGNING_SECRET_PARAMETER",
        "SLACK_SIGNING_SECRET_PARAMETER",
        "KBBRIDGE_SLACK_REQUEST_TOLERANCE_SECS",
        "KBBRIDGE_KNOWLEDGE_BASE_ID",
        "KNOWLEDGEBASE_ID",
        "KBBRIDGE_KNOWLEDGE_BASE_MODEL_ARN",
        "INFERENCE_PROFILE_ID",
        "KBBRIDGE_KNOWLEDGE_BASE_REGION",
        "AWS_REGION",
        "KBBRIDGE_SERVER_PORT",
        "KBBRIDGE_LOG_LEVEL",
        "KBBRIDGE_LOG_FORMAT",
        "TEST_KB_ID",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars() {
        for var in MANAGED_VARS {
            env::remove_var(var);
        }
    }

    fn set_required_aliases() {
        env::set_var("SLACK_BOT_TOKEN_PARAMETER", "/test/slack/bot-token");
        env::set_var("SLACK_SIGNING_SECRET_PARAMETER", "/test/slack/signing-secret");
        env::set_var("KNOWLEDGEBASE_ID", "test-kb-123");
        env::set_var("INFERENCE_PROFILE_ID", "test-model-arn");
        env::set_var("AWS_REGION", "us-east-1");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn deployment_aliases_populate_required_fields() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        set_required_aliases();
        env::set_var("SLACK_SLASH_COMMAND", "/test-llm");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.slack.command == "/test-llm", "command should come from alias")?;
            ensure(
                config.slack.bot_token_parameter == "/test/slack/bot-token",
                "bot token parameter should come from alias",
            )?;
            ensure(
                config.knowledge_base.knowledge_base_id == "test-kb-123",
                "knowledge base id should come from alias",
            )?;
            ensure(config.knowledge_base.model_arn == "test-model-arn", "model arn from alias")?;
            ensure(config.knowledge_base.region == "us-east-1", "region from alias")?;
            ensure(config.slack.request_tolerance_secs == 300, "default tolerance")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn prefixed_variables_win_over_aliases() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        set_required_aliases();
        env::set_var("KNOWLEDGEBASE_ID", "from-alias");
        env::set_var("KBBRIDGE_KNOWLEDGE_BASE_ID", "from-prefixed");
        env::set_var("KBBRIDGE_LOG_LEVEL", "warn");
        env::set_var("KBBRIDGE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.knowledge_base.knowledge_base_id == "from-prefixed",
                "prefixed variable should win",
            )?;
            ensure(config.logging.level == "warn", "log level alias should apply")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "json format from env")?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        set_required_aliases();
        env::set_var("TEST_KB_ID", "kb-from-interpolation");
        env::set_var("KBBRIDGE_SERVER_PORT", "4000");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kbbridge.toml");
            fs::write(
                &path,
                r#"
[slack]
command = "/from-file"

[knowledge_base]
knowledge_base_id = "${TEST_KB_ID}"

[messages]
accepted = "Working on {{ query }}"

[server]
port = 5000

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    command: Some("/from-override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.slack.command == "/from-override", "override command should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 4000, "env port should win over file")?;
            ensure(
                config.knowledge_base.knowledge_base_id == "test-kb-123",
                "env alias should win over file value",
            )?;
            ensure(
                config.messages.accepted == "Working on {{ query }}",
                "template braces should survive interpolation",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn file_interpolation_reports_missing_variables() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("kbbridge.toml");
            fs::write(&path, "[knowledge_base]\nknowledge_base_id = \"${TEST_KB_ID}\"\n")
                .map_err(|err| err.to_string())?;

            let error =
                match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                {
                    Ok(_) => return Err("expected interpolation failure".to_string()),
                    Err(error) => error,
                };
            ensure(
                matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "TEST_KB_ID"),
                "missing variable should be named",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        set_required_aliases();
        env::remove_var("KNOWLEDGEBASE_ID");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("knowledge_base_id")
            );
            ensure(has_message, "validation failure should mention knowledge_base_id")
        })();

        clear_vars();
        result
    }

    #[test]
    fn rejects_malformed_command_and_numeric_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();
        set_required_aliases();

        let result = (|| -> Result<(), String> {
            env::set_var("SLACK_SLASH_COMMAND", "ask me");
            let command_error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected command validation failure".to_string())?;
            ensure(
                matches!(command_error, ConfigError::Validation(ref message) if message.contains("slack.command")),
                "command validation should mention slack.command",
            )?;

            env::set_var("SLACK_SLASH_COMMAND", "/ask");
            env::set_var("KBBRIDGE_SLACK_REQUEST_TOLERANCE_SECS", "five");
            let numeric_error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected numeric override failure".to_string())?;
            ensure(
                matches!(numeric_error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "KBBRIDGE_SLACK_REQUEST_TOLERANCE_SECS"),
                "numeric failure should name the variable",
            )
        })();

        clear_vars();
        result
    }

    #[test]
    fn missing_required_file_is_reported() {
        let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let error = AppConfig::load(LoadOptions {
            config_path: Some("does-not-exist/kbbridge.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("missing file should fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
