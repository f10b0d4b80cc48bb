//! Tool-call extraction from model text, and rendering of tool outcomes.
//!
//! The model calls tools by writing XML-like blocks into its reply:
//!
//! ```text
//! <read_note>
//! <path>daily/2024-01-15.md</path>
//! </read_note>
//! ```
//!
//! Only tag names that belong to a registered tool are considered. Narration
//! and edit-marker tags are reserved and never become calls, even if a tool
//! with that name is registered. The parser never fails: anything it cannot
//! make sense of is left as plain text.
//!
//! Outcomes go back to the model wrapped in `<tool_result>` or `<tool_error>`.
//! Those regions (and `<thinking>` regions) are skipped when parsing, so a
//! rendered outcome never reads as a new call.

use lumina_config::ParserConfig;
use lumina_core::tool::{ToolCall, ToolRegistry, ToolResult};
use lumina_core::value::{ParamValue, Params};
use lumina_tools::COMPLETION_TOOL;
use std::borrow::Cow;
use std::collections::HashSet;
use uuid::Uuid;

/// Tags that are never tool calls.
const RESERVED_TAGS: &[&str] = &[
    "thinking",
    "description",
    "original",
    "modified",
    "tool_result",
    "tool_error",
    "a",
    "b",
    "i",
    "p",
    "em",
    "strong",
    "code",
    "pre",
    "div",
    "span",
    "br",
    "ul",
    "ol",
    "li",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "table",
    "tr",
    "td",
    "th",
    "blockquote",
];

/// Regions whose content is never scanned for calls.
const SKIPPED_REGIONS: &[&str] = &["thinking", "tool_result", "tool_error"];

/// The result of parsing one model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// The reply exactly as received
    pub text: String,

    /// Calls in document order
    pub tool_calls: Vec<ToolCall>,

    /// Whether the reply calls the completion tool
    pub is_completion: bool,
}

/// Extracts tool calls for a fixed set of tool names.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    tools: HashSet<String>,
}

impl ResponseParser {
    pub fn new<I, S>(tool_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tools = tool_names
            .into_iter()
            .map(Into::into)
            .filter(|name| !RESERVED_TAGS.contains(&name.as_str()))
            .collect();
        Self { tools }
    }

    /// Allow exactly the tools registered in `registry`.
    pub fn from_registry(registry: &ToolRegistry) -> Self {
        Self::new(registry.names())
    }

    pub fn is_tool(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    /// Split a reply into its text and tool calls.
    pub fn parse(&self, text: &str) -> ParsedResponse {
        let mut tool_calls = Vec::new();
        let mut pos = 0;

        while let Some(tag) = next_open_tag(text, pos) {
            if SKIPPED_REGIONS.contains(&tag.name) {
                match find_close(text, tag.end, tag.name) {
                    Some((_, end)) => {
                        pos = end;
                        continue;
                    }
                    // Everything after an unclosed region belongs to it
                    None => break,
                }
            }

            if tag.has_attributes || !self.is_tool(tag.name) {
                pos = tag.end;
                continue;
            }

            let Some((close_start, close_end)) = find_close(text, tag.end, tag.name) else {
                tracing::debug!(tag = tag.name, "unterminated tool tag");
                pos = tag.end;
                continue;
            };

            tool_calls.push(ToolCall {
                id: format!("call_{}", Uuid::new_v4().simple()),
                name: tag.name.to_string(),
                params: parse_params(&text[tag.end..close_start]),
                raw: text[tag.start..close_end].to_string(),
            });
            pos = close_end;
        }

        let is_completion = tool_calls.iter().any(|c| c.name == COMPLETION_TOOL);
        ParsedResponse {
            text: text.to_string(),
            tool_calls,
            is_completion,
        }
    }
}

/// Parse `<name>value</name>` pairs. Later duplicates win.
fn parse_params(body: &str) -> Params {
    let mut params = Params::new();
    let mut pos = 0;

    while let Some(tag) = next_open_tag(body, pos) {
        if tag.has_attributes {
            pos = tag.end;
            continue;
        }
        let Some((close_start, close_end)) = find_close(body, tag.end, tag.name) else {
            pos = tag.end;
            continue;
        };
        params.insert(
            tag.name.to_string(),
            ParamValue::classify(&body[tag.end..close_start]),
        );
        pos = close_end;
    }

    params
}

#[derive(Debug)]
struct OpenTag<'a> {
    start: usize,
    end: usize,
    name: &'a str,
    has_attributes: bool,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Find the next `<name>` or `<name attr...>` at or after `from`.
fn next_open_tag(text: &str, from: usize) -> Option<OpenTag<'_>> {
    let mut search = from;
    while let Some(offset) = text.get(search..)?.find('<') {
        let start = search + offset;
        let rest = &text[start + 1..];
        let name_len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        let name = &rest[..name_len];
        let after = &rest[name_len..];

        if !name.is_empty() && !name.starts_with(|c: char| c.is_ascii_digit()) {
            if after.starts_with('>') {
                return Some(OpenTag {
                    start,
                    end: start + 1 + name_len + 1,
                    name,
                    has_attributes: false,
                });
            }
            if after.starts_with(char::is_whitespace)
                && let Some(close) = after.find('>')
                && !after[..close].contains('<')
            {
                return Some(OpenTag {
                    start,
                    end: start + 1 + name_len + close + 1,
                    name,
                    has_attributes: true,
                });
            }
        }
        search = start + 1;
    }
    None
}

/// Byte range of the first `</name>` at or after `from`.
fn find_close(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let close = format!("</{name}>");
    let start = from + text.get(from..)?.find(&close)?;
    Some((start, start + close.len()))
}

/// Renders tool outcomes back into text for the model.
#[derive(Debug, Clone)]
pub struct OutcomeFormatter {
    max_chars: usize,
    truncation_marker: String,
}

impl OutcomeFormatter {
    pub fn new(max_chars: usize, truncation_marker: impl Into<String>) -> Self {
        Self {
            max_chars: max_chars.max(1),
            truncation_marker: truncation_marker.into(),
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(config.max_result_chars, config.truncation_marker.clone())
    }

    /// Wrap `result` in a `<tool_result>` or `<tool_error>` block.
    pub fn format(&self, call: &ToolCall, result: &ToolResult) -> String {
        let tag = if result.is_success() {
            "tool_result"
        } else {
            "tool_error"
        };
        let params = serde_json::to_string(&call.params).unwrap_or_default();
        format!(
            "<{tag} name=\"{}\" params=\"{}\">\n{}\n</{tag}>",
            escape_attribute(&call.name),
            escape_attribute(&params),
            self.truncate(result.text())
        )
    }

    /// Cut `content` to the configured number of characters and append the marker.
    pub fn truncate<'a>(&self, content: &'a str) -> Cow<'a, str> {
        let Some((cut, _)) = content.char_indices().nth(self.max_chars) else {
            return Cow::Borrowed(content);
        };
        let length = content.chars().count();
        let marker = self.truncation_marker.replace("{length}", &length.to_string());
        Cow::Owned(format!("{}\n{marker}", &content[..cut]))
    }
}

impl Default for OutcomeFormatter {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
