//! Markdown to Slack `mrkdwn` translation.
//!
//! A single left-to-right scan over the source. Fenced blocks and inline code spans are
//! recognised before any other rule and copied through untouched; everything else is
//! rewritten token by token:
//!
//! | Markdown              | mrkdwn          |
//! |-----------------------|-----------------|
//! | `**bold**`, `__bold__` | `*bold*`        |
//! | `*italic*`, `_italic_` | `_italic_`      |
//! | `***both***`          | `*_both_*`      |
//! | `~~strike~~`          | `~strike~`      |
//! | `[text](url)`         | `<url\|text>`   |
//! | `- item`, `* item`    | `• item`        |
//! | `# Heading`           | `*Heading*`     |
//!
//! Fences open and close only at the start of a line; a stray ```` ``` ```` inside prose is
//! an inline code span or literal text. A backslash-escaped marker is left as written.
//! Input that matches no rule is copied verbatim, so the translation never fails.

const FENCE: &str = "```";
const BULLET: &str = "• ";

pub fn convert(source: &str) -> String {
    Translation::new(source, true).run()
}

struct Translation<'a> {
    source: &'a str,
    cursor: usize,
    in_fence: bool,
    line_start: bool,
    block_rules: bool,
    // mrkdwn bold does not nest, so bold spans inside bold render as plain text.
    inside_bold: bool,
    out: String,
}

impl<'a> Translation<'a> {
    fn new(source: &'a str, block_rules: bool) -> Self {
        Self {
            source,
            cursor: 0,
            in_fence: false,
            line_start: true,
            block_rules,
            inside_bold: false,
            out: String::with_capacity(source.len()),
        }
    }

    fn nested(source: &str, inside_bold: bool) -> String {
        let mut nested = Translation::new(source, false);
        nested.inside_bold = inside_bold;
        nested.run()
    }

    fn run(mut self) -> String {
        while self.cursor < self.source.len() {
            if self.in_fence {
                self.copy_fenced();
                continue;
            }
            if self.line_start && self.block_rules && (self.fence_line() || self.line_rule()) {
                continue;
            }
            if self.inline_rule() {
                continue;
            }
            self.copy_char();
        }
        self.out
    }

    fn rest(&self) -> &'a str {
        &self.source[self.cursor..]
    }

    fn current_line(&self) -> &'a str {
        let rest = self.rest();
        let line = rest.find('\n').map_or(rest, |end| &rest[..end]);
        line.strip_suffix('\r').unwrap_or(line)
    }

    fn previous_char(&self) -> Option<char> {
        self.source[..self.cursor].chars().next_back()
    }

    fn emit(&mut self, text: &str, consumed: usize) {
        self.out.push_str(text);
        self.cursor += consumed;
        self.line_start = false;
    }

    fn copy_char(&mut self) {
        if let Some(ch) = self.rest().chars().next() {
            self.out.push(ch);
            self.cursor += ch.len_utf8();
            self.line_start = ch == '\n';
        }
    }

    /// A fence opens only at the start of a line, indented by at most three spaces. A line
    /// that also closes the run (```` ```x``` ````) is an inline code span instead.
    fn fence_line(&mut self) -> bool {
        let line = self.current_line();
        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent > 3
            || !line[indent..].starts_with(FENCE)
            || line[indent + FENCE.len()..].contains(FENCE)
        {
            return false;
        }

        self.out.push_str(&line[..indent]);
        self.cursor += indent;
        self.open_fence();
        true
    }

    fn open_fence(&mut self) {
        self.emit(FENCE, FENCE.len());
        self.in_fence = true;

        // mrkdwn has no language tags; a tag would render as the first code line.
        let info = self.current_line().trim_end();
        let tag_only = self.rest().contains('\n')
            && !info.is_empty()
            && info.chars().all(|ch| ch.is_ascii_alphanumeric() || "+-_.#".contains(ch));
        if tag_only {
            self.cursor += info.len();
        }
    }

    /// Copies up to and including the closing fence, which must start its own line.
    fn copy_fenced(&mut self) {
        let rest = self.rest();
        let mut offset = 0usize;
        // The first segment is the tail of the opening line.
        for (index, segment) in rest.split_inclusive('\n').enumerate() {
            let indent = segment.len() - segment.trim_start_matches(' ').len();
            if index > 0 && indent <= 3 && segment[indent..].starts_with(FENCE) {
                let end = offset + indent + FENCE.len();
                self.emit(&rest[..end], end);
                self.in_fence = false;
                return;
            }
            offset += segment.len();
        }
        self.emit(rest, rest.len());
    }

    fn line_rule(&mut self) -> bool {
        let line = self.current_line();
        let indent = line.len() - line.trim_start_matches([' ', '\t']).len();
        let body = &line[indent..];

        if indent <= 3 && self.heading(line, body) {
            return true;
        }
        if is_thematic_break(body) {
            self.emit(line, line.len());
            return true;
        }

        let is_bullet = ["- ", "* ", "+ ", "-\t", "*\t", "+\t"]
            .iter()
            .any(|marker| body.starts_with(marker) && body.len() > marker.len());
        if is_bullet {
            self.out.push_str(&line[..indent]);
            self.emit(BULLET, indent + 2);
            return true;
        }

        false
    }

    fn heading(&mut self, line: &str, body: &str) -> bool {
        let level = body.len() - body.trim_start_matches('#').len();
        if !(1..=6).contains(&level) {
            return false;
        }
        let after = &body[level..];
        if !after.starts_with([' ', '\t']) {
            return false;
        }

        let mut title = after.trim();
        let without_closing = title.trim_end_matches('#');
        if without_closing.is_empty() || without_closing.ends_with([' ', '\t']) {
            title = without_closing.trim_end();
        }
        if title.is_empty() {
            return false;
        }

        let inner = Self::nested(title, true);
        self.emit(&format!("*{inner}*"), line.len());
        true
    }

    fn inline_rule(&mut self) -> bool {
        match self.rest().as_bytes().first().copied() {
            Some(b'`') => {
                self.code_span();
                true
            }
            Some(marker @ (b'*' | b'_')) => {
                self.emphasis(marker);
                true
            }
            Some(b'~') => self.strikethrough(),
            Some(b'\\') => self.escape(),
            Some(b'[') => self.link(0),
            Some(b'!') if self.rest()[1..].starts_with('[') => self.link(1),
            _ => false,
        }
    }

    fn code_span(&mut self) {
        let line = self.current_line();
        let ticks = line.len() - line.trim_start_matches('`').len();
        let delimiter = &line[..ticks];
        match line[ticks..].find(delimiter) {
            Some(offset) => {
                let end = ticks + offset + ticks;
                self.emit(&line[..end], end);
            }
            None => self.emit(delimiter, ticks),
        }
    }

    fn emphasis(&mut self, marker: u8) {
        let line = self.current_line();
        let run = line.len() - line.trim_start_matches(marker as char).len();
        let delimiter = &line[..run];

        let opens = run <= 3
            && !self.previous_char().is_some_and(char::is_alphanumeric)
            && line[run..].chars().next().is_some_and(|ch| !ch.is_whitespace());
        let closing = if opens { find_closer(&line[run..], delimiter, marker) } else { None };

        let Some(offset) = closing else {
            self.emit(delimiter, run);
            return;
        };

        let inside_bold = self.inside_bold || run > 1;
        let inner = Self::nested(&line[run..run + offset], inside_bold);
        let rendered = match (run, self.inside_bold) {
            (1, _) => format!("_{inner}_"),
            (2, true) => inner,
            (2, false) => format!("*{inner}*"),
            (_, true) => format!("_{inner}_"),
            (_, false) => format!("*_{inner}_*"),
        };
        self.emit(&rendered, run + offset + run);
    }

    fn strikethrough(&mut self) -> bool {
        let line = self.current_line();
        if !line.starts_with("~~") || line[2..].starts_with(['~', ' ', '\t']) {
            return false;
        }
        let Some(offset) = find_closer(&line[2..], "~~", b'~') else {
            return false;
        };

        let inner = Self::nested(&line[2..2 + offset], self.inside_bold);
        self.emit(&format!("~{inner}~"), 2 + offset + 2);
        true
    }

    /// A backslash-escaped punctuation character is copied through with its backslash and
    /// never starts a rule.
    fn escape(&mut self) -> bool {
        match self.rest().as_bytes().get(1) {
            Some(next) if next.is_ascii_punctuation() => {
                let escaped = &self.rest()[..2];
                self.emit(escaped, 2);
                true
            }
            _ => false,
        }
    }

    /// `[text](url)`, optionally preceded by `prefix` bytes (the `!` of an image).
    fn link(&mut self, prefix: usize) -> bool {
        let line = &self.current_line()[prefix..];
        let Some((text, url, consumed)) = parse_link(line) else {
            return false;
        };

        let rendered = format!("<{}|{}>", escape_link_url(url), escape_link_text(text));
        self.emit(&rendered, prefix + consumed);
        true
    }
}

/// Offset of the closing `delimiter` in `text`, skipping inline code spans. The closer
/// must hug the content and not be part of a longer marker run.
fn find_closer(text: &str, delimiter: &str, marker: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let width = delimiter.len();
    let mut index = 0usize;

    while index < bytes.len() {
        if bytes[index] == b'\\' && bytes.get(index + 1).is_some_and(u8::is_ascii_punctuation) {
            index += 2;
            continue;
        }
        if bytes[index] == b'`' {
            if let Some(offset) = text[index + 1..].find('`') {
                index += offset + 2;
                continue;
            }
        }

        if index > 0 && bytes[index..].starts_with(delimiter.as_bytes()) {
            let before = bytes[index - 1];
            let after = bytes.get(index + width).copied();
            let hugs = !before.is_ascii_whitespace() && before != marker;
            let ends_run = after.is_none_or(|next| next != marker && !next.is_ascii_alphanumeric());
            if hugs && ends_run {
                return Some(index);
            }
        }
        index += 1;
    }

    None
}

fn parse_link(line: &str) -> Option<(&str, &str, usize)> {
    let bytes = line.as_bytes();
    let mut depth = 0usize;
    let mut text_end = None;
    for (index, &byte) in bytes.iter().enumerate() {
        match byte {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    text_end = Some(index);
                    break;
                }
            }
            _ => {}
        }
    }
    let text_end = text_end?;
    if bytes.get(text_end + 1) != Some(&b'(') {
        return None;
    }

    let url_start = text_end + 2;
    let mut depth = 1usize;
    let mut url_end = None;
    for (index, &byte) in bytes.iter().enumerate().skip(url_start) {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    url_end = Some(index);
                    break;
                }
            }
            _ => {}
        }
    }
    let url_end = url_end?;

    let text = line[1..text_end].trim();
    // A title (`[a](url "title")`) follows the destination after whitespace.
    let url = line[url_start..url_end].split_whitespace().next().unwrap_or_default();
    if text.is_empty() || url.is_empty() {
        return None;
    }

    Some((text, url, url_end + 1))
}

fn escape_link_url(url: &str) -> String {
    url.replace('|', "%7C").replace('<', "%3C").replace('>', "%3E")
}

fn escape_link_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn is_thematic_break(body: &str) -> bool {
    let compact: Vec<char> = body.chars().filter(|ch| !ch.is_whitespace()).collect();
    compact.len() >= 3
        && matches!(compact[0], '-' | '*' | '_')
        && compact.iter().all(|ch| *ch == compact[0])
}
