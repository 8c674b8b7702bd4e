//! Error types for doubao-asr.

use crate::protocol::{ResponseEvent, SessionPhase};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsrError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    Config { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Credential error: {message}")]
    Credentials { message: String },

    // Streaming transport errors
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // Session lifecycle errors
    #[error("{message}")]
    Lifecycle {
        message: String,
        event: Option<ResponseEvent>,
    },

    #[error("Invalid session transition from {from:?} on {input}")]
    InvalidTransition { from: SessionPhase, input: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Recognition failed: {message}")]
    Server { message: String },

    // Audio errors
    #[error("Frame encoding failed: {message}")]
    Encode { message: String },

    #[error("Audio decoding failed: {message}")]
    Audio { message: String },

    // Secure channel errors
    #[error("Handshake failed: {message}")]
    Handshake { message: String },

    #[error("Crypto error: {message}")]
    Crypto { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AsrError {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        AsrError::Transport {
            message: message.into(),
        }
    }

    pub(crate) fn handshake(message: impl Into<String>) -> Self {
        AsrError::Handshake {
            message: message.into(),
        }
    }

    pub(crate) fn crypto(message: impl Into<String>) -> Self {
        AsrError::Crypto {
            message: message.into(),
        }
    }

    pub(crate) fn encode(message: impl Into<String>) -> Self {
        AsrError::Encode {
            message: message.into(),
        }
    }

    pub(crate) fn credentials(message: impl Into<String>) -> Self {
        AsrError::Credentials {
            message: message.into(),
        }
    }

    pub(crate) fn audio(message: impl Into<String>) -> Self {
        AsrError::Audio {
            message: message.into(),
        }
    }

    /// The server event that caused a lifecycle failure, if any.
    pub fn event(&self) -> Option<&ResponseEvent> {
        match self {
            AsrError::Lifecycle { event, .. } => event.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AsrError>;
