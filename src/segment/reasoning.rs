//! Step extraction from reasoning text.
//!
//! Explicit markers are read in a fixed order: `<reasoning>` blocks, then
//! `[Reasoning]:` and `[Thinking]:` lines, then `Step N:` lines. Only when none
//! of those match are numbered list items taken as steps.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;

static TAG_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?is)<reasoning>(.*?)</reasoning>").ok());

static REASONING_BRACKET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\[Reasoning\]:?[ \t]*([^\[\n]*)").ok());

static THINKING_BRACKET: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\[Thinking\]:?[ \t]*([^\[\n]*)").ok());

static STEP_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:Step|步骤|阶段)[ \t]*\d+[:：]?[ \t]*(.*)$").ok()
});

static LIST_ITEM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:\d+[.)]|[①-⑳])").ok());

/// Which marker a step was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepMarker {
    Tag,
    ReasoningBracket,
    ThinkingBracket,
    StepLine,
    ListItem,
}

impl StepMarker {
    /// How strongly the marker signals an intended reasoning step.
    #[must_use]
    pub const fn confidence(self) -> f32 {
        match self {
            Self::Tag => 0.95,
            Self::ReasoningBracket => 0.90,
            Self::ThinkingBracket => 0.85,
            Self::StepLine => 0.80,
            Self::ListItem => 0.60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReasoningStep {
    /// 1-based position among the extracted steps.
    pub step: usize,
    pub content: String,
    pub marker: StepMarker,
}

/// Split reasoning text into numbered steps.
///
/// `Step N:` lines are only read when `numbered_steps` is set. Empty
/// and duplicate contents are dropped; the first occurrence keeps its place.
#[must_use]
pub fn extract_steps(text: &str, numbered_steps: bool) -> Vec<ReasoningStep> {
    let mut steps = Vec::new();
    collect(&mut steps, &TAG_BLOCK, text, StepMarker::Tag);
    collect(&mut steps, &REASONING_BRACKET, text, StepMarker::ReasoningBracket);
    collect(&mut steps, &THINKING_BRACKET, text, StepMarker::ThinkingBracket);
    if numbered_steps {
        collect(&mut steps, &STEP_LINE, text, StepMarker::StepLine);
    }

    if steps.is_empty() {
        if let Some(list_item) = LIST_ITEM.as_ref() {
            for line in text.lines().map(str::trim) {
                if list_item.is_match(line) {
                    push_step(&mut steps, line, StepMarker::ListItem);
                }
            }
        }
    }
    steps
}

fn collect(
    steps: &mut Vec<ReasoningStep>,
    pattern: &LazyLock<Option<Regex>>,
    text: &str,
    marker: StepMarker,
) {
    let Some(re) = pattern.as_ref() else {
        return;
    };
    for caps in re.captures_iter(text) {
        if let Some(content) = caps.get(1) {
            push_step(steps, content.as_str(), marker);
        }
    }
}

fn push_step(steps: &mut Vec<ReasoningStep>, content: &str, marker: StepMarker) {
    let content = content.trim();
    if content.is_empty() || steps.iter().any(|step| step.content == content) {
        return;
    }
    steps.push(ReasoningStep {
        step: steps.len() + 1,
        content: content.to_string(),
        marker,
    });
}
