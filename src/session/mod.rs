//! Streaming recognition sessions
//!
//! This module coordinates one recognition session over a duplex transport:
//! - Lifecycle setup (StartTask, StartSession)
//! - A sender task writing tagged audio frames
//! - A receiver task classifying server messages onto an ordered queue
//! - The consumer-facing event stream with timeouts and shutdown

mod client;
mod receiver;
mod sender;
mod state;
mod stream;

pub use client::AsrClient;
pub use state::SessionState;
pub use stream::{DeliveryMode, TranscriptionStream};
