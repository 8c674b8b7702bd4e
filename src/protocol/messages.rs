//! Protobuf envelope shared by every message on the streaming socket.
//!
//! Requests and responses are defined by hand with prost derives; the
//! service publishes no schema.

use crate::constants::SERVICE_NAME;
use prost::Message;
use serde::Serialize;

/// Client → server envelope
#[derive(Clone, PartialEq, Message)]
pub struct AsrRequest {
    #[prost(string, tag = "2")]
    pub token: String,

    #[prost(string, tag = "3")]
    pub service_name: String,

    #[prost(string, tag = "5")]
    pub method_name: String,

    /// Opaque payload, JSON for StartSession and TaskRequest
    #[prost(string, tag = "6")]
    pub payload: String,

    /// One compressed audio frame (TaskRequest only)
    #[prost(bytes = "vec", tag = "7")]
    pub audio_data: Vec<u8>,

    #[prost(string, tag = "8")]
    pub request_id: String,

    #[prost(enumeration = "FrameState", tag = "9")]
    pub frame_state: i32,
}

/// Server → client envelope
#[derive(Clone, PartialEq, Message)]
pub struct AsrResponse {
    #[prost(string, tag = "1")]
    pub request_id: String,

    #[prost(string, tag = "2")]
    pub task_id: String,

    #[prost(string, tag = "3")]
    pub service_name: String,

    /// Lifecycle marker such as "TaskStarted" or "SessionFailed"
    #[prost(string, tag = "4")]
    pub message_type: String,

    #[prost(int32, tag = "5")]
    pub status_code: i32,

    #[prost(string, tag = "6")]
    pub status_message: String,

    /// Recognition result JSON
    #[prost(string, tag = "7")]
    pub result_json: String,
}

/// Position of an audio frame within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FrameState {
    Unspecified = 0,
    First = 1,
    Middle = 2,
    Last = 3,
}

/// Request kinds understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    StartTask,
    StartSession,
    TaskRequest,
    FinishSession,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::StartTask => "StartTask",
            Method::StartSession => "StartSession",
            Method::TaskRequest => "TaskRequest",
            Method::FinishSession => "FinishSession",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "StartTask" => Some(Method::StartTask),
            "StartSession" => Some(Method::StartSession),
            "TaskRequest" => Some(Method::TaskRequest),
            "FinishSession" => Some(Method::FinishSession),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct FrameMetadata {
    extra: serde_json::Map<String, serde_json::Value>,
    timestamp_ms: i64,
}

impl AsrRequest {
    fn control(method: Method, request_id: &str, token: &str) -> Self {
        Self {
            token: token.to_string(),
            service_name: SERVICE_NAME.to_string(),
            method_name: method.as_str().to_string(),
            request_id: request_id.to_string(),
            ..Default::default()
        }
    }

    pub fn start_task(request_id: &str, token: &str) -> Self {
        Self::control(Method::StartTask, request_id, token)
    }

    pub fn start_session(request_id: &str, token: &str, session_config_json: String) -> Self {
        Self {
            payload: session_config_json,
            ..Self::control(Method::StartSession, request_id, token)
        }
    }

    pub fn finish_session(request_id: &str, token: &str) -> Self {
        Self::control(Method::FinishSession, request_id, token)
    }

    /// One audio frame. Audio requests carry no token.
    pub fn task_request(
        audio_data: Vec<u8>,
        request_id: &str,
        frame_state: FrameState,
        timestamp_ms: i64,
    ) -> Self {
        let metadata = FrameMetadata {
            extra: serde_json::Map::new(),
            timestamp_ms,
        };
        Self {
            service_name: SERVICE_NAME.to_string(),
            method_name: Method::TaskRequest.as_str().to_string(),
            // Serializing a map and an integer cannot fail.
            payload: serde_json::to_string(&metadata).unwrap_or_default(),
            audio_data,
            request_id: request_id.to_string(),
            frame_state: frame_state as i32,
            ..Default::default()
        }
    }

    pub fn method(&self) -> Option<Method> {
        Method::parse(&self.method_name)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}

impl AsrResponse {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}
