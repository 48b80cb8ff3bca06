//! SSE data-line decoder.
//!
//! Turns one line from [`super::ChunkBuffer`] into zero or more [`Delta`]s.
//! Anything that is not a decodable `data:` line is dropped: partial JSON at
//! chunk boundaries is expected, not an error.
//!
//! Key invariants:
//! - `[DONE]` yields exactly one `StreamEnd`.
//! - The request id is announced at most once per decoder.
//! - Reasoning is emitted before content when one envelope carries both.
//! - Double-encoded deltas (`content` holding a JSON object with its own
//!   `reasoning_content`/`content`) are unwrapped; an unparseable one that
//!   mentions a reasoning field is suppressed instead of shown.

use serde_json::{Map, Value};
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::Delta;
use crate::error::EngineError;

/// Deltas produced by a single line.
pub type DeltaBatch = SmallVec<[Delta; 3]>;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";
const REASONING_KEYS: [&str; 2] = ["reasoning_content", "reasoning"];
const CONTENT_KEY: &str = "content";
const REQUEST_ID_KEYS: [&str; 3] = ["id", "message_id", "request_id"];
/// Literal marker of a reasoning field inside a raw JSON string.
const LEAKED_REASONING_MARKER: &str = "\"reasoning";

/// Fields pulled out of one envelope.
#[derive(Debug, Default, PartialEq, Eq)]
struct Envelope {
    request_id: Option<String>,
    reasoning: Option<String>,
    content: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    pub data_lines: u64,
    pub dropped_lines: u64,
    pub unwrapped_payloads: u64,
    pub suppressed_payloads: u64,
}

pub struct EventDecoder {
    announced: bool,
    suppress_leaked_json: bool,
    stats: DecoderStats,
}

impl EventDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_suppression(true)
    }

    /// Decoder with the leaked-JSON suppression heuristic switched on or off.
    #[must_use]
    pub fn with_suppression(suppress_leaked_json: bool) -> Self {
        Self {
            announced: false,
            suppress_leaked_json,
            stats: DecoderStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Decode one line.
    pub fn decode_line(&mut self, line: &str) -> DeltaBatch {
        let mut out = DeltaBatch::new();
        self.decode_line_into(line, &mut out);
        out
    }

    /// Decode one line, appending to a caller-provided batch.
    pub fn decode_line_into(&mut self, line: &str, out: &mut DeltaBatch) {
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        self.stats.data_lines += 1;

        if payload.trim() == DONE_SENTINEL {
            out.push(Delta::StreamEnd);
            return;
        }

        let envelope = match parse_envelope(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.stats.dropped_lines += 1;
                trace!(
                    category = err.category().as_str(),
                    error = %err,
                    "dropping undecodable data line"
                );
                return;
            }
        };
        let Envelope {
            request_id,
            reasoning,
            content,
            error,
        } = envelope;

        let (reasoning, content) = match repair_nested_payload(content.as_deref()) {
            NestedPayload::Absent => (reasoning, content),
            NestedPayload::Unwrapped { reasoning, content } => {
                self.stats.unwrapped_payloads += 1;
                (reasoning, content)
            }
            NestedPayload::Ambiguous(err) if self.suppress_leaked_json => {
                self.stats.suppressed_payloads += 1;
                debug!(
                    category = err.category().as_str(),
                    error = %err,
                    "suppressing content that looks like a leaked nested payload"
                );
                (reasoning, None)
            }
            NestedPayload::Ambiguous(_) => (reasoning, content),
        };

        if let Some(id) = request_id {
            if !self.announced {
                self.announced = true;
                out.push(Delta::RequestIdAnnounced(id));
            }
        }
        if let Some(text) = reasoning.filter(|text| !text.is_empty()) {
            out.push(Delta::ReasoningFragment(text));
        }
        if let Some(text) = content.filter(|text| !text.is_empty()) {
            out.push(Delta::ContentFragment(text));
        }
        if let Some(message) = error {
            out.push(Delta::StreamError(message));
        }
    }
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Envelope extraction
// ---------------------------------------------------------------------------

fn parse_envelope(payload: &str) -> Result<Envelope, EngineError> {
    let value: Value = serde_json::from_str(payload)?;
    let Value::Object(root) = value else {
        return Err(EngineError::Decode("envelope is not a JSON object".into()));
    };

    let request_id = REQUEST_ID_KEYS
        .iter()
        .find_map(|key| root.get(*key).and_then(scalar_to_string));
    let error = root.get("error").and_then(error_message);
    let delta = delta_object(&root);

    Ok(Envelope {
        request_id,
        reasoning: reasoning_field(delta),
        content: text_field(delta, CONTENT_KEY),
        error,
    })
}

/// Locate the object carrying the delta fields.
///
/// `choices[0].delta`, then `choices[0].message`, then a top-level `delta`,
/// then the envelope itself (flattened shape).
fn delta_object(root: &Map<String, Value>) -> &Map<String, Value> {
    let from_choice = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("delta").or_else(|| choice.get("message")))
        .and_then(Value::as_object);
    from_choice
        .or_else(|| root.get("delta").and_then(Value::as_object))
        .unwrap_or(root)
}

fn reasoning_field(object: &Map<String, Value>) -> Option<String> {
    REASONING_KEYS
        .iter()
        .find_map(|key| text_field(object, key))
}

fn has_payload_keys(object: &Map<String, Value>) -> bool {
    object.contains_key(CONTENT_KEY) || REASONING_KEYS.iter().any(|key| object.contains_key(*key))
}

/// Read a text field. Strings pass through; arrays of text parts are joined.
fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let mut joined = String::new();
            for part in parts {
                match part {
                    Value::String(text) => joined.push_str(text),
                    Value::Object(obj) => {
                        if let Some(text) = obj.get("text").and_then(Value::as_str) {
                            joined.push_str(text);
                        }
                    }
                    _ => {}
                }
            }
            Some(joined)
        }
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(obj) => Some(
            obj.get("message")
                .and_then(Value::as_str)
                .map_or_else(|| value.to_string(), ToOwned::to_owned),
        ),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Nested payload repair
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum NestedPayload {
    /// `content` is not a nested payload; use the outer values.
    Absent,
    /// `content` was a JSON object with its own payload keys.
    Unwrapped {
        reasoning: Option<String>,
        content: Option<String>,
    },
    /// `content` looks like a broken nested payload.
    Ambiguous(EngineError),
}

fn repair_nested_payload(content: Option<&str>) -> NestedPayload {
    let Some(raw) = content else {
        return NestedPayload::Absent;
    };
    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return NestedPayload::Absent;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(nested)) if has_payload_keys(&nested) => NestedPayload::Unwrapped {
            reasoning: reasoning_field(&nested),
            content: text_field(&nested, CONTENT_KEY),
        },
        Ok(_) => NestedPayload::Absent,
        Err(err) if raw.contains(LEAKED_REASONING_MARKER) => {
            NestedPayload::Ambiguous(EngineError::NestedPayload(err.to_string()))
        }
        Err(_) => NestedPayload::Absent,
    }
}
