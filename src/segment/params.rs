//! Parameter extraction from a tool invocation body.
//!
//! The body is read as permissive markup: every immediate child element is
//! one parameter. Bodies are often cut off mid-stream, so a failed parse gets
//! one retry with closing tags synthesized for whatever was still open.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One parameter of an invocation: `<name attr="v">value</name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationParam {
    pub name: String,
    /// Attributes in source order.
    #[serde(serialize_with = "serialize_attributes")]
    pub attributes: Vec<(String, String)>,
    pub value: String,
}

impl InvocationParam {
    /// Value of the first attribute named `key`.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

fn serialize_attributes<S: Serializer>(
    attributes: &[(String, String)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(attributes.len()))?;
    for (key, value) in attributes {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// The invocation body could not be read as markup, even after repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message} (at byte {position})")]
pub struct MarkupParseError {
    pub message: String,
    pub position: usize,
}

struct ParseFailure {
    error: MarkupParseError,
    open_elements: Vec<String>,
}

/// Parse the immediate child elements of `body`.
///
/// # Errors
///
/// Returns [`MarkupParseError`] when the body is not well-formed and the
/// single repair attempt does not fix it.
pub fn parse_invocation_params(body: &str) -> Result<Vec<InvocationParam>, MarkupParseError> {
    let failure = match parse_children(body) {
        Ok(params) => return Ok(params),
        Err(failure) => failure,
    };

    let repaired = synthesize_closing(body, &failure.open_elements);
    if repaired == body {
        return Err(failure.error);
    }
    parse_children(&repaired).map_err(|retry| retry.error)
}

fn parse_children(body: &str) -> Result<Vec<InvocationParam>, ParseFailure> {
    let mut reader = Reader::from_str(body);
    let mut params = Vec::with_capacity(2);
    let mut open_elements: Vec<String> = Vec::new();
    let mut current: Option<InvocationParam> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e);
                if open_elements.is_empty() {
                    current = Some(InvocationParam {
                        name: name.clone(),
                        attributes: collect_attributes(e),
                        value: String::new(),
                    });
                }
                open_elements.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                if open_elements.is_empty() {
                    params.push(InvocationParam {
                        name: element_name(e),
                        attributes: collect_attributes(e),
                        value: String::new(),
                    });
                }
            }
            Ok(Event::End(_)) => {
                open_elements.pop();
                if open_elements.is_empty() {
                    if let Some(mut param) = current.take() {
                        param.value = param.value.trim().to_string();
                        params.push(param);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(param) = current.as_mut() {
                    match e.unescape() {
                        Ok(cow) => param.value.push_str(&cow),
                        Err(_) => param.value.push_str(&String::from_utf8_lossy(e.as_ref())),
                    }
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(param) = current.as_mut() {
                    param.value.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::Eof) => {
                if open_elements.is_empty() {
                    break;
                }
                let message = format!(
                    "unexpected end of input inside <{}>",
                    open_elements.last().map_or("", String::as_str)
                );
                return Err(ParseFailure {
                    error: MarkupParseError {
                        message,
                        position: position_of(&reader),
                    },
                    open_elements,
                });
            }
            Err(err) => {
                return Err(ParseFailure {
                    error: MarkupParseError {
                        message: err.to_string(),
                        position: position_of(&reader),
                    },
                    open_elements,
                });
            }
            _ => {}
        }
    }

    Ok(params)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn collect_attributes(e: &BytesStart<'_>) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    for attr in e.attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }
    attributes
}

fn position_of(reader: &Reader<&[u8]>) -> usize {
    usize::try_from(reader.buffer_position()).unwrap_or(usize::MAX)
}

/// Drop a trailing half-written tag and close every element still open.
fn synthesize_closing(body: &str, open_elements: &[String]) -> String {
    let cut = match (body.rfind('<'), body.rfind('>')) {
        (Some(lt), Some(gt)) if lt > gt => lt,
        (Some(lt), None) => lt,
        _ => body.len(),
    };
    let mut repaired = String::with_capacity(cut + open_elements.len() * 16);
    repaired.push_str(&body[..cut]);
    for name in open_elements.iter().rev() {
        repaired.push_str("</");
        repaired.push_str(name);
        repaired.push('>');
    }
    repaired
}
