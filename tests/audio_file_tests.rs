// Integration tests for audio file processing
//
// WAV fixtures are generated with hound into a temporary directory.

use anyhow::Result;
use doubao_asr::{AsrClient, AsrConfig, AudioFile, Credentials};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_wav(dir: &Path, name: &str, sample_rate: u32, channels: u16, frames: usize) -> Result<PathBuf> {
    let path = dir.join(name);
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec)?;
    for i in 0..frames {
        for c in 0..channels {
            writer.write_sample(((i % 200) as i16 - 100) * (c as i16 + 1))?;
        }
    }
    writer.finalize()?;
    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "tone.wav", 16000, 1, 16000)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert!(audio.path.contains("tone.wav"));

    Ok(())
}

#[test]
fn test_audio_file_stereo_duration() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "stereo.WAV", 8000, 2, 4000)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 8000);
    assert!((audio.duration_seconds - 0.5).abs() < 1e-9);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_audio_file_rejects_garbage() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("noise.mp3");
    std::fs::write(&path, b"definitely not audio")?;

    assert!(AudioFile::open(&path).is_err());
    Ok(())
}

#[test]
fn test_to_format_converts_rate_and_channels() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "cd.wav", 32000, 2, 32000)?;

    let audio = AudioFile::open(&path)?;
    let converted = audio.to_format(16000, 1)?;

    // One second of 16 kHz mono
    assert_eq!(converted.len(), 16000);

    Ok(())
}

#[tokio::test]
async fn test_client_loads_file_in_configured_format() -> Result<()> {
    let dir = TempDir::new()?;
    let path = write_wav(dir.path(), "input.wav", 48000, 2, 24000)?;

    let client = AsrClient::new(AsrConfig::default(), Credentials::new("dev", "tok"))?;
    let samples = client.load_file(&path).await?;

    // Half a second at the default 16 kHz mono
    assert_eq!(samples.len(), 8000);

    Ok(())
}
