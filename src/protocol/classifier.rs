//! Maps server responses to typed events.
//!
//! Which result counts as final is inferred from observed server
//! behaviour and is kept here so the streaming core never depends on it.

use super::messages::AsrResponse;
use prost::Message;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Everything the server can tell a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEvent {
    TaskStarted,
    SessionStarted,
    SessionFinished,
    VadStart,
    InterimResult { text: String },
    FinalResult { text: String, vad_finished: bool },
    Heartbeat { sequence: i64 },
    Error { message: String },
    Unknown,
}

impl ResponseEvent {
    /// Nothing follows a terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResponseEvent::SessionFinished | ResponseEvent::Error { .. }
        )
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, ResponseEvent::Heartbeat { .. })
    }

    /// Recognised text carried by a result event.
    pub fn text(&self) -> Option<&str> {
        match self {
            ResponseEvent::InterimResult { text } | ResponseEvent::FinalResult { text, .. } => {
                Some(text)
            }
            _ => None,
        }
    }

    /// Short name used in logs and lifecycle errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseEvent::TaskStarted => "TaskStarted",
            ResponseEvent::SessionStarted => "SessionStarted",
            ResponseEvent::SessionFinished => "SessionFinished",
            ResponseEvent::VadStart => "VadStart",
            ResponseEvent::InterimResult { .. } => "InterimResult",
            ResponseEvent::FinalResult { .. } => "FinalResult",
            ResponseEvent::Heartbeat { .. } => "Heartbeat",
            ResponseEvent::Error { .. } => "Error",
            ResponseEvent::Unknown => "Unknown",
        }
    }
}

/// Decode one wire message and classify it. Undecodable input is `Unknown`.
pub fn classify_bytes(data: &[u8]) -> ResponseEvent {
    match AsrResponse::decode(data) {
        Ok(response) => classify(&response),
        Err(e) => {
            warn!("Undecodable server message ({} bytes): {}", data.len(), e);
            ResponseEvent::Unknown
        }
    }
}

pub fn classify(response: &AsrResponse) -> ResponseEvent {
    match response.message_type.as_str() {
        "TaskStarted" => return ResponseEvent::TaskStarted,
        "SessionStarted" => return ResponseEvent::SessionStarted,
        "SessionFinished" => return ResponseEvent::SessionFinished,
        "TaskFailed" | "SessionFailed" => {
            return ResponseEvent::Error {
                message: response.status_message.clone(),
            }
        }
        _ => {}
    }

    if response.result_json.is_empty() {
        return ResponseEvent::Unknown;
    }
    let json: Value = match serde_json::from_str(&response.result_json) {
        Ok(json) => json,
        Err(_) => return ResponseEvent::Unknown,
    };

    let extra = json.get("extra");
    let results = match json.get("results") {
        None | Some(Value::Null) => {
            let sequence = extra
                .and_then(|e| e.get("packet_number"))
                .and_then(Value::as_i64)
                .unwrap_or(-1);
            return ResponseEvent::Heartbeat { sequence };
        }
        Some(results) => results,
    };

    if truthy(extra.and_then(|e| e.get("vad_start"))) {
        return ResponseEvent::VadStart;
    }

    let mut text = String::new();
    let mut interim = true;
    let mut vad_finished = false;
    let mut nonstream = false;

    for result in results.as_array().map(Vec::as_slice).unwrap_or_default() {
        if let Some(t) = result.get("text").and_then(Value::as_str) {
            if !t.is_empty() {
                text = t.to_string();
            }
        }
        if result.get("is_interim") == Some(&Value::Bool(false)) {
            interim = false;
        }
        if truthy(result.get("is_vad_finished")) {
            vad_finished = true;
        }
        if truthy(result.get("extra").and_then(|e| e.get("nonstream_result"))) {
            nonstream = true;
        }
    }

    if nonstream || (!interim && vad_finished) {
        ResponseEvent::FinalResult { text, vad_finished }
    } else {
        ResponseEvent::InterimResult { text }
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
