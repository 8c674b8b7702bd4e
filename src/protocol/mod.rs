pub mod classifier;
pub mod lifecycle;
pub mod messages;
pub mod sequencer;
pub mod session_config;

pub use classifier::{classify, classify_bytes, ResponseEvent};
pub use lifecycle::{SessionPhase, Transition};
pub use messages::{AsrRequest, AsrResponse, FrameState, Method};
pub use sequencer::{FrameSequencer, TaggedFrame};
pub use session_config::SessionConfig;
