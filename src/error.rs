/// Error type shared by the decode pipeline.
///
/// None of these ever cross the renderer boundary: the pipeline logs them and
/// degrades to "omit this fragment" or "freeze this message".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Nested payload ambiguity: {0}")]
    NestedPayload(String),
    #[error("Markup parse error: {0}")]
    MarkupParse(#[from] crate::segment::MarkupParseError),
}

/// Broad error category, used as a structured logging field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    TransportError,
    DecodeError,
    NestedPayloadAmbiguity,
    MarkupParseError,
}

impl ErrorCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::TransportError => "transport",
            ErrorCategory::DecodeError => "decode",
            ErrorCategory::NestedPayloadAmbiguity => "nested_payload",
            ErrorCategory::MarkupParseError => "markup_parse",
        }
    }
}

impl EngineError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::Transport(_) => ErrorCategory::TransportError,
            EngineError::Decode(_) => ErrorCategory::DecodeError,
            EngineError::NestedPayload(_) => ErrorCategory::NestedPayloadAmbiguity,
            EngineError::MarkupParse(_) => ErrorCategory::MarkupParseError,
        }
    }

    /// Whether the error ends the affected message.
    ///
    /// Only transport failures are fatal; everything else drops a single line
    /// or a single invocation's parameter view.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Transport(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
