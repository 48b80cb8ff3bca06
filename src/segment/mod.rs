//! Segmentation of assembled message text.
//!
//! [`parse_segments`] splits one message into plain text, reasoning blocks and
//! grouped tool invocations. It is a pure function of the text and the
//! streaming flag, cheap enough to re-run on every render.

mod grouper;
pub mod params;
pub mod reasoning;
mod scanner;

use std::ops::Range;
use std::sync::{LazyLock, OnceLock};

use memchr::{memchr, memmem};
use regex_lite::Regex;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use grouper::ToolCallGrouper;
pub use params::{parse_invocation_params, InvocationParam, MarkupParseError};
pub use reasoning::{extract_steps, ReasoningStep, StepMarker};
use scanner::Token;

/// Byte range of a segment in the assembled text, delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for SourceSpan {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolKind {
    Skill,
    ExternalTool,
    Builtin,
}

impl ToolKind {
    /// Map a `type` attribute to a kind. Absent or unknown values are
    /// external tools.
    #[must_use]
    pub fn from_attr(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::ExternalTool;
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "skill" | "skills" => Self::Skill,
            "builtin" | "built_in" | "built-in" | "internal" => Self::Builtin,
            _ => Self::ExternalTool,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skill => "skill",
            Self::ExternalTool => "externalTool",
            Self::Builtin => "builtin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupState {
    Running,
    Completed,
    Failed,
}

// Substring match: `is_error`, `TypeError` and `<error_message>` all count.
static FAILURE_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)error|fail").ok());

const UNKNOWN_TOOL_NAME: &str = "unknown";

/// One tool invocation, kept as its source text.
///
/// Parameters are parsed on first access and cached.
#[derive(Debug, Clone)]
pub struct RawInvocation {
    raw: String,
    span: SourceSpan,
    name: String,
    kind: ToolKind,
    body: Range<usize>,
    terminated: bool,
    params: OnceLock<Result<Vec<InvocationParam>, MarkupParseError>>,
}

impl RawInvocation {
    /// `body` is relative to `raw`; everything before it is the opening tag.
    pub(crate) fn new(raw: &str, span: SourceSpan, body: Range<usize>, terminated: bool) -> Self {
        let open_tag = &raw[..body.start];
        let name = extract_attr_ascii(open_tag, b"name")
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_TOOL_NAME)
            .to_string();
        let kind = ToolKind::from_attr(extract_attr_ascii(open_tag, b"type"));
        Self {
            raw: raw.to_string(),
            span,
            name,
            kind,
            body,
            terminated,
            params: OnceLock::new(),
        }
    }

    /// Full source, opening and closing tags included.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn span(&self) -> SourceSpan {
        self.span
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// False while the closing tag has not arrived.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    #[must_use]
    pub fn open_tag(&self) -> &str {
        &self.raw[..self.body.start]
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.raw[self.body.clone()]
    }

    /// Value of an opening-tag attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        extract_attr_ascii(self.open_tag(), key.as_bytes())
    }

    /// Parameters parsed from the body.
    ///
    /// # Errors
    ///
    /// Returns the [`MarkupParseError`] recorded for a body that is not
    /// readable markup.
    pub fn params(&self) -> Result<&[InvocationParam], &MarkupParseError> {
        self.params
            .get_or_init(|| parse_invocation_params(self.body()))
            .as_deref()
    }

    #[must_use]
    pub fn has_failure_marker(&self) -> bool {
        FAILURE_MARKER
            .as_ref()
            .is_some_and(|re| re.is_match(&self.raw))
    }
}

impl PartialEq for RawInvocation {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
            && self.span == other.span
            && self.name == other.name
            && self.kind == other.kind
            && self.body == other.body
            && self.terminated == other.terminated
    }
}

impl Eq for RawInvocation {}

impl Serialize for RawInvocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RawInvocation", 7)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("raw", &self.raw)?;
        state.serialize_field("span", &self.span)?;
        state.serialize_field("terminated", &self.terminated)?;
        match self.params() {
            Ok(params) => {
                state.serialize_field("params", params)?;
                state.serialize_field("paramsError", &Option::<&MarkupParseError>::None)?;
            }
            Err(err) => {
                state.serialize_field("params", &[] as &[InvocationParam])?;
                state.serialize_field("paramsError", &Some(err))?;
            }
        }
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    pub text: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasoningSegment {
    /// Inner text, without the enclosing tags.
    pub text: String,
    pub span: SourceSpan,
    pub terminated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCallGroup {
    pub name: String,
    pub kind: ToolKind,
    pub invocations: Vec<RawInvocation>,
    pub state: GroupState,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Segment {
    PlainText(TextSegment),
    Reasoning(ReasoningSegment),
    ToolCallGroup(ToolCallGroup),
}

impl ReasoningSegment {
    /// Steps read from the reasoning text, `Step N:` lines included.
    #[must_use]
    pub fn steps(&self) -> Vec<ReasoningStep> {
        extract_steps(&self.text, true)
    }
}

impl ToolCallGroup {
    /// Number of invocations merged into this group.
    #[must_use]
    pub fn count(&self) -> usize {
        self.invocations.len()
    }
}

impl Segment {
    #[must_use]
    pub fn span(&self) -> SourceSpan {
        match self {
            Self::PlainText(text) => text.span,
            Self::Reasoning(reasoning) => reasoning.span,
            Self::ToolCallGroup(group) => group.span,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::ToolCallGroup(group) if group.state == GroupState::Running)
    }
}

/// Split assembled message text into ordered segments.
///
/// While `is_actively_streaming`, a trailing tool call group is Running.
/// Otherwise groups are Completed, or Failed when one of their invocations
/// contains an `error` or `fail` marker, case-insensitively.
#[must_use]
pub fn parse_segments(text: &str, is_actively_streaming: bool) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut grouper = ToolCallGrouper::new();

    for token in scanner::scan(text) {
        match token {
            Token::Text(range) => {
                let slice = &text[range.clone()];
                if slice.trim().is_empty() {
                    continue;
                }
                grouper.flush(&mut segments);
                segments.push(Segment::PlainText(TextSegment {
                    text: slice.to_string(),
                    span: range.into(),
                }));
            }
            Token::Reasoning {
                span,
                inner,
                terminated,
            } => {
                grouper.flush(&mut segments);
                segments.push(Segment::Reasoning(ReasoningSegment {
                    text: text[inner].to_string(),
                    span: span.into(),
                    terminated,
                }));
            }
            Token::Invocation {
                span,
                body,
                terminated,
                ..
            } => {
                let relative_body = body.start - span.start..body.end - span.start;
                grouper.push(
                    RawInvocation::new(&text[span.clone()], span.into(), relative_body, terminated),
                    &mut segments,
                );
            }
        }
    }
    grouper.flush(&mut segments);

    assign_group_states(&mut segments, is_actively_streaming);
    segments
}

fn assign_group_states(segments: &mut [Segment], is_actively_streaming: bool) {
    let last = segments.len().saturating_sub(1);
    for (idx, segment) in segments.iter_mut().enumerate() {
        let Segment::ToolCallGroup(group) = segment else {
            continue;
        };
        group.state = if is_actively_streaming && idx == last {
            GroupState::Running
        } else if group.invocations.iter().any(RawInvocation::has_failure_marker) {
            GroupState::Failed
        } else {
            GroupState::Completed
        };
    }
}

#[inline]
fn extract_attr_ascii<'a>(tag: &'a str, attr: &[u8]) -> Option<&'a str> {
    let bytes = tag.as_bytes();
    let mut search_from = 0usize;
    while let Some(rel_name) = memmem::find(&bytes[search_from..], attr) {
        let name_start = search_from + rel_name;
        let name_end = name_start + attr.len();
        search_from = name_start + 1;
        if name_start > 0 && is_ascii_attr_char(bytes[name_start - 1]) {
            continue;
        }
        if bytes.get(name_end).copied().is_some_and(is_ascii_attr_char) {
            continue;
        }
        let mut idx = name_end;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        if bytes.get(idx) != Some(&b'=') {
            continue;
        }
        idx += 1;
        while bytes.get(idx).is_some_and(u8::is_ascii_whitespace) {
            idx += 1;
        }
        let quote = *bytes.get(idx)?;
        if quote != b'"' && quote != b'\'' {
            continue;
        }
        let value_start = idx + 1;
        let value_end = value_start + memchr(quote, &bytes[value_start..])?;
        return tag.get(value_start..value_end).map(str::trim);
    }
    None
}

#[inline]
const fn is_ascii_attr_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b':')
}

#[cfg(test)]
#[path = "segment_tests.rs"]
mod tests;
