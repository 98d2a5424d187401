use serde::Serialize;

/// Slack rejects section text longer than this many characters.
pub const SECTION_TEXT_LIMIT: usize = 3_000;

const TRUNCATION_MARKER: char = '…';
const FENCE: &str = "```";
const FENCE_CLOSE: &str = "\n```";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Self::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Mrkdwn { text } => text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(rename = "text")]
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    pub fn section_texts(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|block| match block {
            Block::Section { text, .. } => text.text(),
        })
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(clamp_section_text(text.into())));
        self
    }

    pub fn mrkdwn(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::mrkdwn(clamp_mrkdwn_text(text.into())));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

/// The reply for a fulfilled invocation: one section carrying the command name and the
/// already-translated answer.
pub fn answer_message(command: &str, translated: &str) -> MessageTemplate {
    MessageBuilder::new(format!("{command} - Response"))
        .section("kb.answer.v1", |section| {
            section.mrkdwn(format!("*{command}* - Response:\n\n{translated}"));
        })
        .build()
}

fn clamp_section_text(text: String) -> String {
    if text.chars().count() <= SECTION_TEXT_LIMIT {
        return text;
    }

    let mut clamped = take_chars(&text, SECTION_TEXT_LIMIT - 1);
    clamped.push(TRUNCATION_MARKER);
    clamped
}

/// Like [`clamp_section_text`], but the cut never leaves a code block open or a `<...>`
/// link, mention or date half written.
fn clamp_mrkdwn_text(text: String) -> String {
    if text.chars().count() <= SECTION_TEXT_LIMIT {
        return text;
    }

    let mut clamped = take_chars(&text, SECTION_TEXT_LIMIT - 1);
    if has_open_fence(&clamped) {
        clamped = take_chars(&text, SECTION_TEXT_LIMIT - 1 - FENCE_CLOSE.len());
    }
    if let Some(open) = clamped.rfind('<') {
        let tail = &clamped[open..];
        if !tail.contains(['>', '\n']) {
            clamped.truncate(open);
        }
    }

    clamped.push(TRUNCATION_MARKER);
    if has_open_fence(&clamped) {
        clamped.push_str(FENCE_CLOSE);
    }
    clamped
}

fn take_chars(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}

fn has_open_fence(text: &str) -> bool {
    text.matches(FENCE).count() % 2 == 1
}
