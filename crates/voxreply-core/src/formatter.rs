//! **ResponseFormatter**: turns loosely-structured generated text into block markup.
//!
//! Two passes:
//! 1. `emphasize` rewrites every `**…**` pair on a line into a bold span (`<b>…</b>`).
//! 2. Lines are classified in order by a finite-state machine (`step` / `finish`) that
//!    groups consecutive numbered or bulleted lines into lists and everything else
//!    into paragraphs.
//!
//! The output is a flat `Document` of tokens; list nesting is implied by the
//! open/close markers around contiguous runs of items.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Text used when the generation service returns nothing usable.
pub const NO_RESPONSE: &str = "No response.";

static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("emphasis pattern"));
static ORDERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\*?\*?(\d+)\.\*?\*?\s*(.*)").expect("ordered pattern"));
static UNORDERED_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*]\s*(.*)").expect("unordered pattern"));
static BOLD_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<b>(.*?)</b>").expect("bold pattern"));

/// Inline run of text inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Span {
    Text(String),
    Bold(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Ordered,
    Unordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Ordered => "ol",
            ListKind::Unordered => "ul",
        }
    }
}

/// One block-level markup token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "spans", rename_all = "snake_case")]
pub enum Token {
    Open(ListKind),
    Close(ListKind),
    Item(Vec<Span>),
    Paragraph(Vec<Span>),
}

/// Carry-over state between lines. Being in both lists at once is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListState {
    #[default]
    None,
    Ordered,
    Unordered,
}

/// How a single (already emphasized) line is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass<'a> {
    Ordered(&'a str),
    Unordered(&'a str),
    Plain(&'a str),
}

/// Rewrite `**text**` pairs as bold spans. Pairs never cross a newline.
pub fn emphasize(text: &str) -> String {
    EMPHASIS.replace_all(text, "<b>$1</b>").into_owned()
}

/// Classify one line. The ordered pattern is tested first, so a line matching
/// both patterns is a numbered item.
pub fn classify(line: &str) -> LineClass<'_> {
    if let Some(caps) = ORDERED_LINE.captures(line) {
        let item = caps.get(2).map_or("", |m| m.as_str());
        return LineClass::Ordered(item.trim());
    }
    if let Some(caps) = UNORDERED_LINE.captures(line) {
        let item = caps.get(1).map_or("", |m| m.as_str());
        return LineClass::Unordered(item.trim());
    }
    LineClass::Plain(line.trim())
}

/// Transition function: consume one line from `state`, returning the next state and
/// the tokens emitted for it.
pub fn step(state: ListState, line: &str) -> (ListState, Vec<Token>) {
    let mut out = Vec::new();
    let next = match classify(line) {
        LineClass::Ordered(item) => {
            if state == ListState::Unordered {
                out.push(Token::Close(ListKind::Unordered));
            }
            if state != ListState::Ordered {
                out.push(Token::Open(ListKind::Ordered));
            }
            out.push(Token::Item(parse_spans(item)));
            ListState::Ordered
        }
        LineClass::Unordered(item) => {
            if state == ListState::Ordered {
                out.push(Token::Close(ListKind::Ordered));
            }
            if state != ListState::Unordered {
                out.push(Token::Open(ListKind::Unordered));
            }
            out.push(Token::Item(parse_spans(item)));
            ListState::Unordered
        }
        LineClass::Plain(text) => {
            out.extend(finish(state));
            if !text.is_empty() {
                out.push(Token::Paragraph(parse_spans(text)));
            }
            ListState::None
        }
    };
    (next, out)
}

/// Close whatever list is still open.
pub fn finish(state: ListState) -> Vec<Token> {
    match state {
        ListState::Ordered => vec![Token::Close(ListKind::Ordered)],
        ListState::Unordered => vec![Token::Close(ListKind::Unordered)],
        ListState::None => Vec::new(),
    }
}

/// Split emphasized text into plain and bold spans.
fn parse_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut last = 0;
    for caps in BOLD_SPAN.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > last {
            spans.push(Span::Text(text[last..whole.start()].to_string()));
        }
        spans.push(Span::Bold(inner.as_str().to_string()));
        last = whole.end();
    }
    if last < text.len() {
        spans.push(Span::Text(text[last..].to_string()));
    }
    spans
}

/// Structured markup produced from one generated response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Document {
    tokens: Vec<Token>,
}

impl Document {
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn paragraph_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t, Token::Paragraph(_)))
            .count()
    }

    pub fn open_count(&self, kind: ListKind) -> usize {
        self.tokens.iter().filter(|t| **t == Token::Open(kind)).count()
    }

    pub fn close_count(&self, kind: ListKind) -> usize {
        self.tokens.iter().filter(|t| **t == Token::Close(kind)).count()
    }

    /// Serialize as block HTML, one token per line.
    pub fn to_html(&self) -> String {
        self.tokens
            .iter()
            .map(render_token)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render_token(token: &Token) -> String {
    match token {
        Token::Open(kind) => format!("<{}>", kind.tag()),
        Token::Close(kind) => format!("</{}>", kind.tag()),
        Token::Item(spans) => format!("<li>{}</li>", render_spans(spans)),
        Token::Paragraph(spans) => format!("<p>{}</p>", render_spans(spans)),
    }
}

fn render_spans(spans: &[Span]) -> String {
    spans
        .iter()
        .map(|span| match span {
            Span::Text(t) => html_escape(t),
            Span::Bold(t) => format!("<b>{}</b>", html_escape(t)),
        })
        .collect()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Run both passes over `text` as-is.
pub fn format_text(text: &str) -> Document {
    let emphasized = emphasize(text);
    let mut state = ListState::None;
    let mut tokens = Vec::new();
    for line in emphasized.split('\n') {
        let (next, emitted) = step(state, line);
        state = next;
        tokens.extend(emitted);
    }
    tokens.extend(finish(state));
    Document { tokens }
}

/// Format a generated response; empty or whitespace-only content becomes `No response.`.
pub fn format_response(raw: &str) -> Document {
    if raw.trim().is_empty() {
        format_text(NO_RESPONSE)
    } else {
        format_text(raw)
    }
}

/// Wrap rendered markup in a fixed-height container that scrolls to its end after load.
pub fn wrap_scrollable(html: &str) -> String {
    format!(
        r#"
<div id="scrollable-response" style="
  height: 500px;
  overflow-y: auto;
  padding: 20px;
  box-sizing: border-box;
  border: 1px solid #ccc;
  background-color: #fff;
  scroll-behavior: smooth;
">
{html}
</div>

<script>
  window.onload = function() {{
      setTimeout(function() {{
          var el = document.getElementById('scrollable-response');
          if (el) {{
              el.scrollTop = el.scrollHeight;
          }}
      }}, 300);
  }};
</script>
"#
    )
}
