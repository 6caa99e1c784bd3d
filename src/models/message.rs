use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterMessage {
    pub event_type: String,
    pub payload: JsonValue,
    pub failure_reason: String,
    pub attempts: u32,
    pub failed_at: String,
}

impl DeadLetterMessage {
    pub fn new(event_type: &str, body: &[u8], failure_reason: String, attempts: u32) -> Self {
        // Bodies that are not JSON are kept as lossy text so nothing is dropped.
        let payload = serde_json::from_slice(body)
            .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(body).into_owned()));

        Self {
            event_type: event_type.to_string(),
            payload,
            failure_reason,
            attempts,
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
