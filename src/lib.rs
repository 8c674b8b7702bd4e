pub mod audio;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod device;
pub mod error;
pub mod protocol;
pub mod secure;
pub mod session;
pub mod transport;

pub use audio::{AudioFile, AudioFormat, AudioFramer, CodecFactory, FrameCodec, PcmCodec};
pub use config::{AsrConfig, SecureChannelConfig};
pub use credentials::{CredentialIssuer, CredentialStore, Credentials};
pub use device::{DeviceProfile, HttpCredentialIssuer};
pub use error::{AsrError, Result};
pub use protocol::{classify, classify_bytes, FrameState, ResponseEvent, SessionPhase};
pub use secure::{SecureChannel, SecureSession};
pub use session::{AsrClient, DeliveryMode, TranscriptionStream};
pub use transport::{Connector, TransportSink, TransportStream, WebSocketConnector};
