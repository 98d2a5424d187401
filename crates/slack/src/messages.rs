use kbbridge_core::config::{
    MessagesConfig, DEFAULT_ACCEPTED_TEMPLATE, DEFAULT_FAILURE_TEMPLATE, DEFAULT_USAGE_TEMPLATE,
};
use tera::{Context, Tera};
use thiserror::Error;
use tracing::warn;

const USAGE: &str = "usage";
const ACCEPTED: &str = "accepted";
const FAILURE: &str = "failure";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("message template `{name}` does not compile: {source}")]
    Compile { name: &'static str, source: tera::Error },
    #[error("message template `{name}` does not render: {source}")]
    Render { name: &'static str, source: tera::Error },
}

/// User-visible wording for acknowledgments and failure replies.
pub struct MessageTemplates {
    tera: Tera,
}

impl MessageTemplates {
    /// Compiles the configured templates and renders each once against sample values, so a
    /// broken template fails at startup instead of inside a request.
    pub fn new(config: &MessagesConfig) -> Result<Self, TemplateError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        for (name, source) in
            [(USAGE, &config.usage), (ACCEPTED, &config.accepted), (FAILURE, &config.failure)]
        {
            tera.add_raw_template(name, source)
                .map_err(|source| TemplateError::Compile { name, source })?;
        }

        let templates = Self { tera };
        for name in [USAGE, ACCEPTED, FAILURE] {
            templates
                .render(name, &sample_context())
                .map_err(|source| TemplateError::Render { name, source })?;
        }

        Ok(templates)
    }

    pub fn usage(&self, command: &str) -> String {
        let mut context = Context::new();
        context.insert("command", command);
        self.render_or_default(USAGE, &context, || {
            DEFAULT_USAGE_TEMPLATE.replace("{{ command }}", command)
        })
    }

    pub fn accepted(&self, command: &str, query: &str) -> String {
        let mut context = Context::new();
        context.insert("command", command);
        context.insert("query", query);
        self.render_or_default(ACCEPTED, &context, || DEFAULT_ACCEPTED_TEMPLATE.to_owned())
    }

    pub fn failure(&self, command: &str, error: &str) -> String {
        let mut context = Context::new();
        context.insert("command", command);
        context.insert("error", error);
        self.render_or_default(FAILURE, &context, || {
            DEFAULT_FAILURE_TEMPLATE.replace("{{ command }}", command).replace("{{ error }}", error)
        })
    }

    fn render(&self, name: &str, context: &Context) -> Result<String, tera::Error> {
        self.tera.render(name, context)
    }

    fn render_or_default(
        &self,
        name: &'static str,
        context: &Context,
        fallback: impl FnOnce() -> String,
    ) -> String {
        match self.render(name, context) {
            Ok(text) => text,
            Err(error) => {
                warn!(
                    event_name = "messages.render_failed",
                    template = name,
                    error = %error,
                    "message template failed to render, using default wording"
                );
                fallback()
            }
        }
    }
}

impl Default for MessageTemplates {
    fn default() -> Self {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        for (name, source) in [
            (USAGE, DEFAULT_USAGE_TEMPLATE),
            (ACCEPTED, DEFAULT_ACCEPTED_TEMPLATE),
            (FAILURE, DEFAULT_FAILURE_TEMPLATE),
        ] {
            if let Err(error) = tera.add_raw_template(name, source) {
                warn!(event_name = "messages.default_invalid", template = name, error = %error);
            }
        }
        Self { tera }
    }
}

fn sample_context() -> Context {
    let mut context = Context::new();
    context.insert("command", "/ask");
    context.insert("query", "what is X");
    context.insert("error", "timeout");
    context
}

#[cfg(test)]
mod tests {
    use kbbridge_core::config::AppConfig;

    use super::{MessageTemplates, TemplateError};

    #[test]
    fn default_wording_matches_deployed_bot() {
        let templates = MessageTemplates::default();

        assert_eq!(templates.usage("/ask"), ":x: Usage: /ask <your question here>");
        assert_eq!(
            templates.accepted("/ask", "what is X"),
            "Accepted Task. Generating response... :hourglass_flowing_sand:"
        );
        assert_eq!(
            templates.failure("/ask", "timeout"),
            "/ask - Sorry an error occurred. Please try again later. Error: timeout"
        );
    }

    #[test]
    fn configured_defaults_compile() {
        let config = AppConfig::default();
        let templates = MessageTemplates::new(&config.messages).expect("default templates");
        assert!(templates.usage("/kb").contains("Usage:"));
    }

    #[test]
    fn custom_templates_see_query_and_do_not_escape() {
        let mut config = AppConfig::default().messages;
        config.accepted = "Looking up \"{{ query }}\" for {{ command }} <now>".to_owned();

        let templates = MessageTemplates::new(&config).expect("custom templates");
        assert_eq!(templates.accepted("/ask", "a & b"), "Looking up \"a & b\" for /ask <now>");
    }

    #[test]
    fn broken_templates_fail_at_construction() {
        let mut config = AppConfig::default().messages;
        config.failure = "{{ error ".to_owned();
        assert!(matches!(
            MessageTemplates::new(&config),
            Err(TemplateError::Compile { name: "failure", .. })
        ));

        let mut config = AppConfig::default().messages;
        config.usage = "{{ missing_variable }}".to_owned();
        assert!(matches!(
            MessageTemplates::new(&config),
            Err(TemplateError::Render { name: "usage", .. })
        ));
    }
}
