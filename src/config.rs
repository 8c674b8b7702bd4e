use crate::audio::AudioFormat;
use crate::constants::{AID, USER_AGENT, WEBSOCKET_URL};
use crate::error::{AsrError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration.
///
/// Every field has a default, so a config file only needs the values it
/// overrides. Environment variables prefixed with `DOUBAO_ASR_` take
/// precedence over the file (nested keys use `__`, e.g.
/// `DOUBAO_ASR_SECURE__HANDSHAKE_URL`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub url: String,
    pub aid: u32,
    pub user_agent: String,

    /// Explicit credentials, highest precedence.
    pub device_id: Option<String>,
    pub token: Option<String>,
    /// Credential cache file; `~` is expanded.
    pub credential_path: Option<String>,

    // Audio
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u32,

    // Session options
    pub enable_punctuation: bool,
    pub enable_speech_rejection: bool,
    pub enable_asr_twopass: bool,
    pub enable_asr_threepass: bool,
    /// Application the input method is acting on; the server may tune
    /// recognition to it.
    pub app_name: String,

    // Connection
    pub connect_timeout_secs: f64,
    pub recv_timeout_secs: f64,
    /// Pace pushed audio at real-time speed.
    pub realtime: bool,

    pub secure: SecureChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureChannelConfig {
    pub handshake_url: Option<String>,
    /// HKDF info string agreed with the service.
    pub hkdf_info: String,
    /// Sessions are renewed this many seconds before the ticket expires.
    pub renewal_margin_secs: i64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            url: WEBSOCKET_URL.to_string(),
            aid: AID,
            user_agent: USER_AGENT.to_string(),
            device_id: None,
            token: None,
            credential_path: None,
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 20,
            enable_punctuation: true,
            enable_speech_rejection: false,
            enable_asr_twopass: true,
            enable_asr_threepass: true,
            app_name: "com.android.chrome".to_string(),
            connect_timeout_secs: 10.0,
            recv_timeout_secs: 10.0,
            realtime: false,
            secure: SecureChannelConfig::default(),
        }
    }
}

impl Default for SecureChannelConfig {
    fn default() -> Self {
        Self {
            handshake_url: None,
            hkdf_info: String::new(),
            renewal_margin_secs: 60,
        }
    }
}

impl AsrConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("DOUBAO_ASR").separator("__"))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(invalid("sample_rate", "must be positive"));
        }
        if self.channels == 0 {
            return Err(invalid("channels", "must be positive"));
        }
        if self.frame_duration_ms == 0 {
            return Err(invalid("frame_duration_ms", "must be positive"));
        }
        if (self.sample_rate as u64 * self.frame_duration_ms as u64) % 1000 != 0 {
            return Err(invalid(
                "frame_duration_ms",
                "must cover a whole number of samples",
            ));
        }
        check_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        check_timeout("recv_timeout_secs", self.recv_timeout_secs)?;
        if self.secure.renewal_margin_secs < 0 {
            return Err(invalid("secure.renewal_margin_secs", "must not be negative"));
        }
        Ok(())
    }

    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frame_duration_ms: self.frame_duration_ms,
        }
    }

    /// Streaming endpoint for a registered device.
    pub fn ws_url(&self, device_id: &str) -> String {
        format!("{}?aid={}&device_id={}", self.url, self.aid, device_id)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.connect_timeout_secs)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.recv_timeout_secs)
    }

    pub fn credential_path(&self) -> Option<PathBuf> {
        self.credential_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

/// Timeouts are converted to `Duration` and must fit in one.
fn check_timeout(key: &str, secs: f64) -> Result<()> {
    if !secs.is_finite() || secs <= 0.0 || Duration::try_from_secs_f64(secs).is_err() {
        return Err(invalid(key, "must be a positive, finite number of seconds"));
    }
    Ok(())
}

fn invalid(key: &str, message: &str) -> AsrError {
    AsrError::Config {
        key: key.to_string(),
        message: message.to_string(),
    }
}
