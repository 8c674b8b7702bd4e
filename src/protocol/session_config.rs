use crate::config::AsrConfig;
use serde::{Deserialize, Serialize};

/// StartSession payload: audio format and recognition options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub audio_info: AudioInfo,
    pub enable_punctuation: bool,
    pub enable_speech_rejection: bool,
    pub extra: SessionExtra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub channel: u16,
    pub format: String,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExtra {
    pub app_name: String,
    pub cell_compress_rate: u32,
    pub did: String,
    pub enable_asr_threepass: bool,
    pub enable_asr_twopass: bool,
    pub input_mode: String,
}

impl SessionConfig {
    /// Build the session options for `device_id`, announcing frames in
    /// `codec_format`.
    pub fn new(config: &AsrConfig, device_id: &str, codec_format: &str) -> Self {
        Self {
            audio_info: AudioInfo {
                channel: config.channels,
                format: codec_format.to_string(),
                sample_rate: config.sample_rate,
            },
            enable_punctuation: config.enable_punctuation,
            enable_speech_rejection: config.enable_speech_rejection,
            extra: SessionExtra {
                app_name: config.app_name.clone(),
                cell_compress_rate: 8,
                did: device_id.to_string(),
                enable_asr_threepass: config.enable_asr_threepass,
                enable_asr_twopass: config.enable_asr_twopass,
                input_mode: "tool".to_string(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
