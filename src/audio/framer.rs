use crate::error::Result;
use serde::{Deserialize, Serialize};

use super::codec::FrameCodec;

/// Shape of the PCM stream sent to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Duration of one frame in milliseconds
    pub frame_duration_ms: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 20,
        }
    }
}

impl AudioFormat {
    /// Samples per channel in one frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    /// Interleaved samples in one frame (all channels).
    pub fn frame_len(&self) -> usize {
        self.samples_per_frame() * self.channels as usize
    }
}

/// Splits a complete PCM buffer into fixed-size compressed frames.
///
/// The last partial chunk is zero-padded to a full frame. Frames are
/// encoded lazily as the iterator is driven; calling [`frames`] again
/// starts over from the first frame.
///
/// [`frames`]: AudioFramer::frames
#[derive(Debug, Clone)]
pub struct AudioFramer {
    samples: Vec<i16>,
    format: AudioFormat,
}

impl AudioFramer {
    pub fn new(samples: Vec<i16>, format: AudioFormat) -> Self {
        Self { samples, format }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn frame_count(&self) -> usize {
        let frame_len = self.format.frame_len();
        if frame_len == 0 {
            return 0;
        }
        self.samples.len().div_ceil(frame_len)
    }

    pub fn frames<'a, C: FrameCodec + ?Sized>(&'a self, codec: &'a mut C) -> Frames<'a, C> {
        Frames {
            chunks: self.samples.chunks(self.format.frame_len().max(1)),
            codec,
            samples_per_frame: self.format.samples_per_frame(),
            frame_len: self.format.frame_len(),
        }
    }
}

/// Iterator returned by [`AudioFramer::frames`].
pub struct Frames<'a, C: FrameCodec + ?Sized> {
    chunks: std::slice::Chunks<'a, i16>,
    codec: &'a mut C,
    samples_per_frame: usize,
    frame_len: usize,
}

impl<C: FrameCodec + ?Sized> Iterator for Frames<'_, C> {
    /// One compressed frame, in send order.
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;

        let encoded = if chunk.len() < self.frame_len {
            let mut padded = chunk.to_vec();
            padded.resize(self.frame_len, 0);
            self.codec.encode(&padded, self.samples_per_frame)
        } else {
            self.codec.encode(chunk, self.samples_per_frame)
        };

        Some(encoded)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

/// Encodes a frame of digital silence.
pub fn silent_frame<C: FrameCodec + ?Sized>(codec: &mut C, format: &AudioFormat) -> Result<Vec<u8>> {
    let silence = vec![0i16; format.frame_len()];
    codec.encode(&silence, format.samples_per_frame())
}
