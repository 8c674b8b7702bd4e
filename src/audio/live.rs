use super::framer::AudioFormat;

/// Re-chunks a live PCM source into exact frame-sized pieces.
///
/// Microphones and other live sources deliver buffers of whatever size the
/// driver chose; the service wants fixed-duration frames.
#[derive(Debug)]
pub struct LiveFrameBuffer {
    pending: Vec<i16>,
    frame_len: usize,
}

impl LiveFrameBuffer {
    pub fn new(format: &AudioFormat) -> Self {
        let frame_len = format.frame_len().max(1);
        Self {
            pending: Vec::with_capacity(frame_len * 2),
            frame_len,
        }
    }

    /// Append a chunk and return every complete frame now available.
    pub fn push(&mut self, chunk: &[i16]) -> Vec<Vec<i16>> {
        self.pending.extend_from_slice(chunk);

        let complete = self.pending.len() / self.frame_len;
        if complete == 0 {
            return Vec::new();
        }

        let rest = self.pending.split_off(complete * self.frame_len);
        let full = std::mem::replace(&mut self.pending, rest);
        full.chunks_exact(self.frame_len).map(<[i16]>::to_vec).collect()
    }

    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Drain what is left, zero-padded to a full frame.
    pub fn finish(&mut self) -> Option<Vec<i16>> {
        if self.pending.is_empty() {
            return None;
        }
        let mut last = std::mem::take(&mut self.pending);
        last.resize(self.frame_len, 0);
        Some(last)
    }
}

/// Turns a little-endian 16-bit PCM byte stream into samples.
///
/// Reads may end mid-sample; an odd trailing byte is carried over and
/// completed by the next push.
#[derive(Debug, Default)]
pub struct PcmByteDecoder {
    carry: Option<u8>,
}

impl PcmByteDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut bytes: &[u8]) -> Vec<i16> {
        let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);

        if let Some(low) = self.carry.take() {
            match bytes.split_first() {
                Some((&high, rest)) => {
                    samples.push(i16::from_le_bytes([low, high]));
                    bytes = rest;
                }
                None => {
                    self.carry = Some(low);
                    return samples;
                }
            }
        }

        let mut pairs = bytes.chunks_exact(2);
        samples.extend(pairs.by_ref().map(|b| i16::from_le_bytes([b[0], b[1]])));
        self.carry = pairs.remainder().first().copied();
        samples
    }

    /// A half sample is waiting for its second byte.
    pub fn has_partial(&self) -> bool {
        self.carry.is_some()
    }
}
