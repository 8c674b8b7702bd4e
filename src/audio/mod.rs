pub mod codec;
pub mod file;
pub mod framer;
pub mod live;

pub use codec::{default_codec_factory, CodecFactory, FrameCodec, PcmCodec};
#[cfg(feature = "opus")]
pub use codec::OpusCodec;
pub use file::AudioFile;
pub use framer::{silent_frame, AudioFormat, AudioFramer, Frames};
pub use live::{LiveFrameBuffer, PcmByteDecoder};
