//! Decoding of browser performance log records.
//!
//! Chrome's performance log wraps every DevTools event in a JSON-encoded
//! envelope: `{"message": {"method": "...", "params": {...}}, "webview": "..."}`.
//! A record that does not follow this shape means the browser's logging
//! contract changed, so decoding errors abort evaluation of the page load.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::types::{NetworkEvent, RawLogEntry};

/// Errors raised while decoding performance log records
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed log entry: {0}")]
    MalformedLogEntry(#[from] serde_json::Error),

    #[error("malformed log entry: missing `{0}` field")]
    MissingField(&'static str),
}

/// Decode one raw record into its network event
pub fn decode_log_entry(entry: &RawLogEntry) -> Result<NetworkEvent, DecodeError> {
    decode_message(&entry.message)
}

/// Decode the JSON-encoded envelope string of a record
pub fn decode_message(raw: &str) -> Result<NetworkEvent, DecodeError> {
    let mut envelope: Value = serde_json::from_str(raw)?;

    let mut inner = match envelope.get_mut("message").map(Value::take) {
        Some(Value::Object(inner)) => inner,
        _ => return Err(DecodeError::MissingField("message")),
    };

    let method = inner
        .get("method")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingField("method"))?
        .to_string();

    let params = match inner.remove("params") {
        Some(Value::Object(params)) => params,
        _ => Map::new(),
    };

    Ok(NetworkEvent { method, params })
}

/// Decode a whole page load, stopping at the first malformed record
pub fn decode_all(entries: &[RawLogEntry]) -> Result<Vec<NetworkEvent>, DecodeError> {
    entries.iter().map(decode_log_entry).collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogFile {
    Entries(Vec<RawLogEntry>),
    /// Raw WebDriver response body: `{"value": [...]}`
    Wrapped { value: Vec<RawLogEntry> },
}

/// Parse a captured performance log.
///
/// Accepts the plain array written by `--dump-logs` as well as the body of a
/// WebDriver log response.
pub fn parse_performance_log(text: &str) -> Result<Vec<RawLogEntry>, serde_json::Error> {
    let entries = match serde_json::from_str(text)? {
        LogFile::Entries(entries) => entries,
        LogFile::Wrapped { value } => value,
    };
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(inner: Value) -> String {
        json!({ "message": inner, "webview": "ABCDEF" }).to_string()
    }

    #[test]
    fn test_decode_response_received() {
        let raw = envelope(json!({
            "method": "Network.responseReceived",
            "params": {
                "requestId": "1000.2",
                "response": { "url": "http://localhost:8888/a.png", "statusText": "OK" }
            }
        }));

        let event = decode_message(&raw).unwrap();
        assert_eq!(event.method, "Network.responseReceived");
        assert_eq!(event.str_param("requestId"), Some("1000.2"));
        assert!(event.params.contains_key("response"));
    }

    #[test]
    fn test_decode_missing_params_is_empty() {
        let raw = envelope(json!({ "method": "Page.loadEventFired" }));
        let event = decode_message(&raw).unwrap();
        assert_eq!(event.method, "Page.loadEventFired");
        assert!(event.params.is_empty());
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = decode_message("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::MalformedLogEntry(_)));
        assert!(err.to_string().starts_with("malformed log entry"));
    }

    #[test]
    fn test_decode_rejects_missing_inner_message() {
        let err = decode_message(r#"{"webview": "x"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("message")));

        let err = decode_message(r#"{"message": "not an object"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("message")));
    }

    #[test]
    fn test_decode_rejects_missing_method() {
        let raw = envelope(json!({ "params": {} }));
        let err = decode_message(&raw).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("method")));
    }

    #[test]
    fn test_decode_all_stops_on_first_error() {
        let good = RawLogEntry::new(envelope(json!({ "method": "Network.dataReceived" })));
        let bad = RawLogEntry::new("garbage");
        assert_eq!(decode_all(&[good.clone(), good.clone()]).unwrap().len(), 2);
        assert!(decode_all(&[good, bad]).is_err());
    }

    #[test]
    fn test_parse_performance_log_formats() {
        let plain = r#"[{"level": "INFO", "message": "{}", "timestamp": 1.0}]"#;
        let entries = parse_performance_log(plain).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level.as_deref(), Some("INFO"));

        let wrapped = r#"{"value": [{"message": "{}"}, {"message": "{}"}]}"#;
        assert_eq!(parse_performance_log(wrapped).unwrap().len(), 2);

        assert!(parse_performance_log(r#"{"entries": []}"#).is_err());
    }
}
