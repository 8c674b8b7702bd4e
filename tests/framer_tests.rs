// Integration tests for audio framing
//
// These tests verify frame segmentation, padding and codec error handling.

use anyhow::Result;
use doubao_asr::audio::{
    silent_frame, AudioFormat, AudioFramer, FrameCodec, LiveFrameBuffer, PcmCodec,
};
use doubao_asr::AsrError;

fn mono_16k() -> AudioFormat {
    AudioFormat {
        sample_rate: 16000,
        channels: 1,
        frame_duration_ms: 20,
    }
}

/// Codec that records what it was asked to encode.
struct RecordingCodec {
    frames: Vec<Vec<i16>>,
    fail_at: Option<usize>,
}

impl FrameCodec for RecordingCodec {
    fn format(&self) -> &'static str {
        "test"
    }

    fn encode(&mut self, pcm: &[i16], _samples_per_frame: usize) -> doubao_asr::Result<Vec<u8>> {
        if self.fail_at == Some(self.frames.len()) {
            return Err(AsrError::Encode {
                message: "rejected".to_string(),
            });
        }
        self.frames.push(pcm.to_vec());
        Ok(vec![self.frames.len() as u8])
    }
}

#[test]
fn test_one_and_a_half_seconds_is_75_frames() -> Result<()> {
    // 1.5s at 16kHz = 24000 samples, 320 per frame = 75 frames exactly
    let samples = vec![1i16; 24000];
    let framer = AudioFramer::new(samples, mono_16k());
    assert_eq!(framer.frame_count(), 75);

    let mut codec = PcmCodec::new(1);
    let frames = framer.frames(&mut codec).collect::<doubao_asr::Result<Vec<_>>>()?;

    assert_eq!(frames.len(), 75);
    assert!(frames.iter().all(|f| f.len() == 640));

    Ok(())
}

#[test]
fn test_last_frame_is_zero_padded() -> Result<()> {
    // 1.5s minus 100 samples: the final frame holds 220 real samples
    let samples = vec![7i16; 24000 - 100];
    let framer = AudioFramer::new(samples, mono_16k());
    assert_eq!(framer.frame_count(), 75);

    let mut codec = RecordingCodec {
        frames: Vec::new(),
        fail_at: None,
    };
    let count = framer.frames(&mut codec).count();
    assert_eq!(count, 75);

    let last = codec.frames.last().unwrap();
    assert_eq!(last.len(), 320);
    assert!(last[..220].iter().all(|&s| s == 7));
    assert!(last[220..].iter().all(|&s| s == 0));

    Ok(())
}

#[test]
fn test_frames_restart_from_beginning() -> Result<()> {
    let framer = AudioFramer::new((0..1000).collect(), mono_16k());
    let mut codec = PcmCodec::new(1);

    let first: Vec<_> = framer.frames(&mut codec).collect::<doubao_asr::Result<_>>()?;
    let second: Vec<_> = framer.frames(&mut codec).collect::<doubao_asr::Result<_>>()?;

    assert_eq!(first, second);
    assert_eq!(first.len(), 4);

    Ok(())
}

#[test]
fn test_stereo_frames_hold_both_channels() {
    let format = AudioFormat {
        sample_rate: 16000,
        channels: 2,
        frame_duration_ms: 20,
    };
    let framer = AudioFramer::new(vec![0; 640 * 3], format);
    assert_eq!(framer.frame_count(), 3);
    assert_eq!(format.frame_len(), 640);
}

#[test]
fn test_empty_input_has_no_frames() {
    let framer = AudioFramer::new(Vec::new(), mono_16k());
    let mut codec = PcmCodec::new(1);
    assert_eq!(framer.frame_count(), 0);
    assert_eq!(framer.frames(&mut codec).count(), 0);
}

#[test]
fn test_codec_rejection_surfaces_as_encode_error() {
    let framer = AudioFramer::new(vec![0; 3200], mono_16k());
    let mut codec = RecordingCodec {
        frames: Vec::new(),
        fail_at: Some(2),
    };

    let results: Vec<_> = framer.frames(&mut codec).collect();
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(matches!(results[2], Err(AsrError::Encode { .. })));
}

#[test]
fn test_pcm_codec_rejects_wrong_length() {
    let mut codec = PcmCodec::new(1);
    assert!(codec.encode(&[0; 100], 320).is_err());
    assert_eq!(codec.encode(&[0; 320], 320).unwrap().len(), 640);
}

#[test]
fn test_silent_frame_is_full_length() -> Result<()> {
    let mut codec = PcmCodec::new(1);
    let frame = silent_frame(&mut codec, &mono_16k())?;
    assert_eq!(frame.len(), 640);
    assert!(frame.iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn test_live_buffer_matches_framer() -> Result<()> {
    let samples: Vec<i16> = (0..1000).map(|i| i as i16).collect();
    let format = mono_16k();

    let mut buffer = LiveFrameBuffer::new(&format);
    let mut live = Vec::new();
    for chunk in samples.chunks(77) {
        live.extend(buffer.push(chunk));
    }
    live.extend(buffer.finish());

    let framer = AudioFramer::new(samples, format);
    let mut codec = RecordingCodec {
        frames: Vec::new(),
        fail_at: None,
    };
    framer.frames(&mut codec).collect::<doubao_asr::Result<Vec<_>>>()?;

    assert_eq!(live, codec.frames);
    Ok(())
}
