//! # Payload Normalization
//!
//! Bitrix24 delivers webhooks in several shapes depending on how the sender
//! was configured: a JSON body from automation rules, a form-encoded body from
//! outbound event webhooks, or bare query parameters from business-process
//! "webhook" actions. [`normalize`] accepts any of them and produces a tagged
//! [`InboundPayload`] before any field is accessed.
//!
//! Parsers are tried in a fixed order and the first one that produces a
//! mapping wins. A parser that does not match never fails the request; the
//! miss is logged and the next parser runs.

use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use tracing::{debug, warn};

/// Key-value mapping produced by one parser.
///
/// JSON bodies keep their nested structure; form and query payloads are flat
/// string mappings.
pub type PayloadFields = Map<String, Value>;

/// The parts of an HTTP request the normalizer looks at.
#[derive(Debug, Clone, Copy)]
pub struct RawRequest<'a> {
    /// Raw request body
    pub body: &'a [u8],

    /// URI query string without the leading `?`
    pub query: Option<&'a str>,
}

impl<'a> RawRequest<'a> {
    /// Create a raw request view
    pub fn new(body: &'a [u8], query: Option<&'a str>) -> Self {
        Self { body, query }
    }
}

/// Encoding a payload was successfully decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadEncoding {
    Json,
    Form,
    Query,
}

impl PayloadEncoding {
    /// Get string representation for logs and responses
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Form => "form",
            Self::Query => "query",
        }
    }
}

impl fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized webhook payload, tagged by the encoding that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    Json(PayloadFields),
    Form(PayloadFields),
    Query(PayloadFields),
    /// No supported encoding matched. Callers treat this as a soft failure.
    Unparseable,
}

impl InboundPayload {
    /// Build a payload from an encoding tag and its fields
    pub fn from_parts(encoding: PayloadEncoding, fields: PayloadFields) -> Self {
        match encoding {
            PayloadEncoding::Json => Self::Json(fields),
            PayloadEncoding::Form => Self::Form(fields),
            PayloadEncoding::Query => Self::Query(fields),
        }
    }

    /// Encoding of the payload, `None` when nothing could be parsed
    pub fn encoding(&self) -> Option<PayloadEncoding> {
        match self {
            Self::Json(_) => Some(PayloadEncoding::Json),
            Self::Form(_) => Some(PayloadEncoding::Form),
            Self::Query(_) => Some(PayloadEncoding::Query),
            Self::Unparseable => None,
        }
    }

    /// Decoded fields, `None` when nothing could be parsed
    pub fn fields(&self) -> Option<&PayloadFields> {
        match self {
            Self::Json(fields) | Self::Form(fields) | Self::Query(fields) => Some(fields),
            Self::Unparseable => None,
        }
    }

    /// Top-level keys, without their values.
    ///
    /// Safe to log where values are not: event webhooks carry `auth[...]`
    /// tokens among their fields.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields()
            .map(|fields| fields.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check whether any parser matched
    pub fn is_parsed(&self) -> bool {
        !matches!(self, Self::Unparseable)
    }

    /// Look up a top-level key exactly as it was received.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields()?.get(key)
    }

    /// Traverse a dot-separated path through nested objects and arrays.
    ///
    /// Numeric segments index into arrays, so `document_id.2` resolves the
    /// third element of a `document_id` array.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = self.fields()?.get(segments.next()?)?;
        segments.try_fold(first, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Look up a top-level key and render it as a non-empty string.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_to_string)
    }
}

/// Render a string or integer JSON value as a trimmed, non-empty string.
///
/// Objects, arrays, booleans, and null yield `None`.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    let rendered = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

// ============================================================================
// Parsers
// ============================================================================

type PayloadParser = fn(&RawRequest<'_>) -> Option<PayloadFields>;

/// Parser attempts in priority order.
const PARSERS: [(PayloadEncoding, PayloadParser); 3] = [
    (PayloadEncoding::Json, parse_json_body),
    (PayloadEncoding::Form, parse_form_body),
    (PayloadEncoding::Query, parse_query_string),
];

/// Normalize a request of unknown encoding.
///
/// Never fails: when no parser matches the result is
/// [`InboundPayload::Unparseable`].
pub fn normalize(request: &RawRequest<'_>) -> InboundPayload {
    for (encoding, parser) in PARSERS {
        if let Some(fields) = parser(request) {
            debug!(
                encoding = %encoding,
                field_count = fields.len(),
                "Normalized webhook payload"
            );
            return InboundPayload::from_parts(encoding, fields);
        }
    }

    warn!(
        body_len = request.body.len(),
        has_query = request.query.is_some_and(|q| !q.is_empty()),
        "Webhook payload did not match any supported encoding"
    );
    InboundPayload::Unparseable
}

fn parse_json_body(request: &RawRequest<'_>) -> Option<PayloadFields> {
    if request.body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    match serde_json::from_slice::<Value>(request.body) {
        Ok(Value::Object(fields)) => Some(fields),
        Ok(other) => {
            debug!(
                json_type = json_type_name(&other),
                "JSON body is not an object; trying next parser"
            );
            None
        }
        Err(e) => {
            debug!(error = %e, "Body is not valid JSON; trying next parser");
            None
        }
    }
}

fn parse_form_body(request: &RawRequest<'_>) -> Option<PayloadFields> {
    let body = match std::str::from_utf8(request.body) {
        Ok(body) => body.trim(),
        Err(e) => {
            debug!(error = %e, "Body is not valid UTF-8; skipping form parser");
            return None;
        }
    };

    if !body.contains('=') {
        debug!("Body has no key=value pairs; trying next parser");
        return None;
    }

    collect_first_values(url::form_urlencoded::parse(body.as_bytes()))
}

fn parse_query_string(request: &RawRequest<'_>) -> Option<PayloadFields> {
    let query = request.query?.trim_start_matches('?');
    if query.is_empty() {
        return None;
    }

    collect_first_values(url::form_urlencoded::parse(query.as_bytes()))
}

/// Collect decoded pairs, keeping the first value seen for each key.
fn collect_first_values<'a>(
    pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
) -> Option<PayloadFields> {
    let mut fields = PayloadFields::new();
    for (key, value) in pairs {
        if key.is_empty() {
            continue;
        }
        fields
            .entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }

    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
