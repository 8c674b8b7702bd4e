use crate::error::{AsrError, Result};
use hound::WavReader;
use rubato::{FftFixedIn, Resampler};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{info, warn};

/// Decoded audio file (16-bit PCM, interleaved).
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    /// Decode a file. WAV goes through hound; everything else (M4A, MP3,
    /// FLAC, OGG) through symphonia.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

        let (sample_rate, channels, samples) = if is_wav {
            decode_wav(path)?
        } else {
            decode_with_symphonia(path)?
        };

        if sample_rate == 0 || channels == 0 {
            return Err(AsrError::audio(format!(
                "{}: missing sample rate or channel count",
                path.display()
            )));
        }

        let duration_seconds = samples.len() as f64 / (sample_rate as f64 * channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        })
    }

    /// Convert to the given rate and channel count.
    pub fn to_format(&self, sample_rate: u32, channels: u16) -> Result<Vec<i16>> {
        let remixed = remix_channels(&self.samples, self.channels, channels);
        resample(&remixed, channels, self.sample_rate, sample_rate)
    }
}

fn decode_wav(path: &Path) -> Result<(u32, u16, Vec<i16>)> {
    let reader = WavReader::open(path)
        .map_err(|e| AsrError::audio(format!("failed to open WAV file: {}", e)))?;

    let spec = reader.spec();
    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>(),
        (hound::SampleFormat::Int, bits) => {
            let shift = bits as i32 - 16;
            reader
                .into_samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        if shift >= 0 {
                            (v >> shift) as i16
                        } else {
                            (v << -shift) as i16
                        }
                    })
                })
                .collect()
        }
        (hound::SampleFormat::Float, _) => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect(),
    }
    .map_err(|e| AsrError::audio(format!("failed to read audio samples: {}", e)))?;

    Ok((spec.sample_rate, spec.channels, samples))
}

fn decode_with_symphonia(path: &Path) -> Result<(u32, u16, Vec<i16>)> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AsrError::audio(format!("unsupported audio format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AsrError::audio("no audio track found"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AsrError::audio(format!("no decoder for track: {}", e)))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AsrError::audio(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                warn!("Skipping undecodable packet: {}", msg);
                continue;
            }
            Err(e) => return Err(AsrError::audio(e.to_string())),
        };

        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }

        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    Ok((sample_rate, channels, samples))
}

/// Mix interleaved audio down (average) or up (duplicate) to `target` channels.
pub fn remix_channels(samples: &[i16], channels: u16, target: u16) -> Vec<i16> {
    if channels == target || channels == 0 || target == 0 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    let target = target as usize;
    let mut out = Vec::with_capacity(samples.len() / channels * target);

    for frame in samples.chunks_exact(channels) {
        if target == 1 {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            out.push((sum / channels as i32) as i16);
        } else {
            for c in 0..target {
                out.push(frame[c.min(channels - 1)]);
            }
        }
    }

    out
}

/// Input frames handed to the resampler per call.
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Band-limited resampling of interleaved audio.
///
/// The tail is zero-padded to a whole chunk and the resampler's delay is
/// trimmed, so the output is exactly `in_frames * to / from` frames long.
pub fn resample(samples: &[i16], channels: u16, from_rate: u32, to_rate: u32) -> Result<Vec<i16>> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || channels == 0 {
        return Ok(samples.to_vec());
    }

    let channels = channels as usize;
    let in_frames = samples.len() / channels;
    if in_frames == 0 {
        return Ok(Vec::new());
    }
    let out_frames = (in_frames as u64 * to_rate as u64 / from_rate as u64) as usize;

    let mut planar = vec![Vec::with_capacity(in_frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample as f32 / 32768.0);
        }
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        RESAMPLER_CHUNK_SIZE,
        1,
        channels,
    )
    .map_err(|e| AsrError::audio(format!("failed to create resampler: {}", e)))?;
    let delay = resampler.output_delay();
    let wanted = delay + out_frames;

    let mut resampled = vec![Vec::with_capacity(wanted); channels];
    let mut chunk = vec![vec![0.0f32; RESAMPLER_CHUNK_SIZE]; channels];
    let mut pos = 0;
    while resampled[0].len() < wanted {
        let end = (pos + RESAMPLER_CHUNK_SIZE).min(in_frames);
        for (buf, input) in chunk.iter_mut().zip(&planar) {
            buf.fill(0.0);
            if pos < end {
                buf[..end - pos].copy_from_slice(&input[pos..end]);
            }
        }
        pos += RESAMPLER_CHUNK_SIZE;

        let out = resampler
            .process(&chunk, None)
            .map_err(|e| AsrError::audio(format!("resampling failed: {}", e)))?;
        for (channel, data) in resampled.iter_mut().zip(out) {
            channel.extend_from_slice(&data);
        }
    }

    let mut out = Vec::with_capacity(out_frames * channels);
    for i in delay..wanted {
        for channel in &resampled {
            out.push((channel[i] * 32768.0).round().clamp(-32768.0, 32767.0) as i16);
        }
    }
    Ok(out)
}
