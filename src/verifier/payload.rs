/// Scanned payload decoding and pre-flight validation
use crate::error::{VerifyLogError, VerifyLogResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::{json, Value};

/// Decoded form of scanned or uploaded text
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    Json(Value),
    /// Text that could not be decoded into JSON
    Raw(String),
}

impl ParsedPayload {
    /// JSON form; raw text becomes `{"raw": text}`
    pub fn into_value(self) -> Value {
        match self {
            ParsedPayload::Json(value) => value,
            ParsedPayload::Raw(text) => json!({ "raw": text }),
        }
    }
}

/// Decode scanned text
///
/// Tried in order: JSON text, compact JWT (payload segment), bare base64url.
/// Anything else is kept as raw text.
pub fn parse_scan_payload(input: &str) -> ParsedPayload {
    let s = input.trim();

    if s.starts_with('{') || s.starts_with('[') {
        return serde_json::from_str(s)
            .map(ParsedPayload::Json)
            .unwrap_or_else(|_| ParsedPayload::Raw(s.to_string()));
    }

    let segments: Vec<&str> = s.split('.').collect();
    if segments.len() == 3 && segments.iter().all(|seg| is_base64url(seg)) {
        return decode_base64url(segments[1])
            .and_then(|decoded| serde_json::from_str(&decoded).ok())
            .map(ParsedPayload::Json)
            .unwrap_or_else(|| ParsedPayload::Raw(s.to_string()));
    }

    if is_base64url(s) {
        return match decode_base64url(s) {
            Some(decoded) if decoded.starts_with('{') || decoded.starts_with('[') => {
                serde_json::from_str(&decoded)
                    .map(ParsedPayload::Json)
                    .unwrap_or_else(|_| ParsedPayload::Raw(s.to_string()))
            }
            Some(decoded) => ParsedPayload::Raw(decoded),
            None => ParsedPayload::Raw(s.to_string()),
        };
    }

    ParsedPayload::Raw(s.to_string())
}

fn is_base64url(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn decode_base64url(s: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(s.trim_end_matches('=')).ok()?;
    String::from_utf8(bytes).ok()
}

/// Reject payloads that carry nothing worth sending to the verifier
///
/// Accepts full credentials, verifier-shaped results (`verified`, `issuer`,
/// `raw`) and JWT claim sets (`sub`, `iss`, `credentialSubject`).
pub fn validate_payload(payload: &Value) -> VerifyLogResult<()> {
    if payload.is_null() {
        return Err(VerifyLogError::InvalidPayload("No data found".to_string()));
    }

    if payload.pointer("/credential/credentialSubject").is_some_and(truthy) {
        return Ok(());
    }

    if payload.get("verified") == Some(&Value::Bool(true)) {
        return Ok(());
    }

    let accepted = ["issuer", "raw", "sub", "iss", "credentialSubject"]
        .iter()
        .any(|key| payload.get(*key).is_some_and(truthy));

    if accepted {
        Ok(())
    } else {
        Err(VerifyLogError::InvalidPayload(
            "Missing credential field".to_string(),
        ))
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
