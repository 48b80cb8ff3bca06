//! Assembled text of one in-flight response.
//!
//! Folds [`Delta`]s into a single annotated string. Reasoning fragments are
//! bracketed with synthetic `<thinking>`/`</thinking>` markers so the segment
//! parser sees one linear document. The message freezes on stream end,
//! in-band error, transport failure or cancellation; a frozen message never
//! holds an open reasoning region and ignores every later delta.

use serde::Serialize;

use super::Delta;
use crate::segment::{parse_segments, Segment};

pub const REASONING_OPEN: &str = "<thinking>";
pub const REASONING_CLOSE: &str = "</thinking>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePhase {
    Empty,
    Growing,
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FreezeReason {
    /// `[DONE]` or a clean end of the transport stream.
    Completed,
    Cancelled,
    /// In-band error event or transport failure.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    text: String,
    inside_reasoning: bool,
    phase: MessagePhase,
    freeze_reason: Option<FreezeReason>,
    request_id: Option<String>,
    error: Option<String>,
    reasoning_bytes: usize,
    content_bytes: usize,
}

impl AssembledMessage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            text: String::new(),
            inside_reasoning: false,
            phase: MessagePhase::Empty,
            freeze_reason: None,
            request_id: None,
            error: None,
            reasoning_bytes: 0,
            content_bytes: 0,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn phase(&self) -> MessagePhase {
        self.phase
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.phase == MessagePhase::Frozen
    }

    /// True while the message may still grow.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        !self.is_frozen()
    }

    #[must_use]
    pub fn inside_reasoning(&self) -> bool {
        self.inside_reasoning
    }

    #[must_use]
    pub fn freeze_reason(&self) -> Option<FreezeReason> {
        self.freeze_reason
    }

    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn reasoning_bytes(&self) -> usize {
        self.reasoning_bytes
    }

    #[must_use]
    pub fn content_bytes(&self) -> usize {
        self.content_bytes
    }

    /// Fold one delta into the message.
    ///
    /// Returns `false` when the delta was ignored because the message is
    /// already frozen.
    pub fn apply(&mut self, delta: Delta) -> bool {
        if self.is_frozen() {
            return false;
        }
        if self.phase == MessagePhase::Empty {
            self.phase = MessagePhase::Growing;
        }

        match delta {
            Delta::ReasoningFragment(fragment) => {
                if fragment.is_empty() {
                    return true;
                }
                if !self.inside_reasoning {
                    self.text.push_str(REASONING_OPEN);
                    self.inside_reasoning = true;
                }
                self.reasoning_bytes += fragment.len();
                self.text.push_str(&fragment);
            }
            Delta::ContentFragment(fragment) => {
                if fragment.is_empty() {
                    return true;
                }
                self.close_reasoning();
                self.content_bytes += fragment.len();
                self.text.push_str(&fragment);
            }
            Delta::RequestIdAnnounced(id) => {
                if self.request_id.is_none() {
                    self.request_id = Some(id);
                }
            }
            Delta::StreamEnd => self.freeze(FreezeReason::Completed),
            Delta::StreamError(message) => self.fail(message),
        }
        true
    }

    /// Freeze the message, auto-closing an open reasoning region.
    ///
    /// Freezing an already frozen message keeps the first reason.
    pub fn freeze(&mut self, reason: FreezeReason) {
        if self.is_frozen() {
            return;
        }
        self.close_reasoning();
        self.phase = MessagePhase::Frozen;
        self.freeze_reason = Some(reason);
    }

    /// Freeze as failed and record the error message.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.is_frozen() {
            return;
        }
        self.error = Some(message.into());
        self.freeze(FreezeReason::Failed);
    }

    /// Segment the current text, streaming while not frozen.
    #[must_use]
    pub fn segments(&self) -> Vec<Segment> {
        parse_segments(&self.text, self.is_streaming())
    }

    fn close_reasoning(&mut self) {
        if self.inside_reasoning {
            self.text.push_str(REASONING_CLOSE);
            self.inside_reasoning = false;
        }
    }
}

impl Default for AssembledMessage {
    fn default() -> Self {
        Self::new()
    }
}
