//! Frame compression.
//!
//! The framer owns segmentation and padding; turning one frame of PCM into
//! bytes is delegated to a [`FrameCodec`]. Codecs keep state between frames
//! (Opus does), so every session gets its own instance from a
//! [`CodecFactory`].

use crate::error::{AsrError, Result};
use std::sync::Arc;

use super::framer::AudioFormat;

pub trait FrameCodec: Send {
    /// Format name announced in the session config (`audio_info.format`).
    fn format(&self) -> &'static str;

    /// Encode exactly one frame of interleaved samples.
    ///
    /// `samples_per_frame` is per channel; implementations reject frames of
    /// any other length.
    fn encode(&mut self, pcm: &[i16], samples_per_frame: usize) -> Result<Vec<u8>>;
}

/// Creates a codec for a new session.
pub type CodecFactory = Arc<dyn Fn(&AudioFormat) -> Result<Box<dyn FrameCodec>> + Send + Sync>;

/// Codec used when the caller does not choose one: Opus, as the service
/// expects. Builds with the default `opus` feature disabled fall back to
/// raw PCM.
pub fn default_codec_factory() -> CodecFactory {
    #[cfg(feature = "opus")]
    {
        Arc::new(|format: &AudioFormat| {
            Ok::<_, AsrError>(Box::new(OpusCodec::new(format)?) as Box<dyn FrameCodec>)
        })
    }

    #[cfg(not(feature = "opus"))]
    {
        Arc::new(|format: &AudioFormat| {
            Ok::<_, AsrError>(Box::new(PcmCodec::new(format.channels)) as Box<dyn FrameCodec>)
        })
    }
}

/// Little-endian 16-bit PCM passthrough.
#[derive(Debug, Clone)]
pub struct PcmCodec {
    channels: u16,
}

impl PcmCodec {
    pub fn new(channels: u16) -> Self {
        Self { channels }
    }
}

impl FrameCodec for PcmCodec {
    fn format(&self) -> &'static str {
        "pcm"
    }

    fn encode(&mut self, pcm: &[i16], samples_per_frame: usize) -> Result<Vec<u8>> {
        check_frame_len(pcm, samples_per_frame, self.channels)?;
        Ok(pcm.iter().flat_map(|s| s.to_le_bytes()).collect())
    }
}

fn check_frame_len(pcm: &[i16], samples_per_frame: usize, channels: u16) -> Result<()> {
    let expected = samples_per_frame * channels as usize;
    if pcm.len() != expected {
        return Err(AsrError::encode(format!(
            "expected {} samples per frame, got {}",
            expected,
            pcm.len()
        )));
    }
    Ok(())
}

#[cfg(feature = "opus")]
pub use self::opus_codec::OpusCodec;

#[cfg(feature = "opus")]
mod opus_codec {
    use super::*;

    /// Largest packet libopus will produce for one frame.
    const MAX_PACKET: usize = 4000;

    pub struct OpusCodec {
        encoder: opus::Encoder,
        channels: u16,
    }

    impl OpusCodec {
        pub fn new(format: &AudioFormat) -> Result<Self> {
            let channels = match format.channels {
                1 => opus::Channels::Mono,
                2 => opus::Channels::Stereo,
                n => {
                    return Err(AsrError::encode(format!(
                        "opus supports 1 or 2 channels, got {}",
                        n
                    )))
                }
            };
            let encoder = opus::Encoder::new(format.sample_rate, channels, opus::Application::Audio)
                .map_err(|e| AsrError::encode(format!("failed to create opus encoder: {}", e)))?;
            Ok(Self {
                encoder,
                channels: format.channels,
            })
        }
    }

    impl FrameCodec for OpusCodec {
        fn format(&self) -> &'static str {
            "speech_opus"
        }

        fn encode(&mut self, pcm: &[i16], samples_per_frame: usize) -> Result<Vec<u8>> {
            check_frame_len(pcm, samples_per_frame, self.channels)?;
            self.encoder
                .encode_vec(pcm, MAX_PACKET)
                .map_err(|e| AsrError::encode(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_codec_little_endian() {
        let mut codec = PcmCodec::new(1);
        let bytes = codec.encode(&[1, -2], 2).unwrap();
        assert_eq!(bytes, vec![1, 0, 0xFE, 0xFF]);
        assert_eq!(codec.format(), "pcm");
    }

    #[test]
    fn test_pcm_codec_rejects_wrong_length() {
        let mut codec = PcmCodec::new(2);
        let result = codec.encode(&[0; 3], 2);
        assert!(matches!(result, Err(AsrError::Encode { .. })));
    }

    #[cfg(feature = "opus")]
    #[test]
    fn test_default_codec_is_opus() {
        let format = AudioFormat::default();
        let mut codec = default_codec_factory()(&format).unwrap();
        assert_eq!(codec.format(), "speech_opus");

        let packet = codec
            .encode(&vec![0i16; format.frame_len()], format.samples_per_frame())
            .unwrap();
        assert!(!packet.is_empty());
    }

    #[cfg(feature = "opus")]
    #[test]
    fn test_opus_rejects_surround() {
        let format = AudioFormat {
            channels: 6,
            ..AudioFormat::default()
        };
        assert!(matches!(
            OpusCodec::new(&format),
            Err(AsrError::Encode { .. })
        ));
    }
}
