//! Device registration and ASR token issuance.
//!
//! A new device is registered with the app-log service, which hands out a
//! numeric `device_id`. The ASR token is then read from the settings
//! service for that device.

use crate::config::AsrConfig;
use crate::constants::{
    APP_CHANNEL, APP_NAME, APP_PACKAGE, APP_VERSION_CODE, APP_VERSION_NAME, HEADER_STUB,
    REGISTER_URL, SETTINGS_URL,
};
use crate::credentials::{CredentialIssuer, Credentials};
use crate::error::{AsrError, Result};
use crate::secure::crypto::{random_bytes, stub_digest};
use crate::secure::{HttpExchange, HttpReply, HttpRequest, ReqwestExchange};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Body posted to the settings endpoint.
const SETTINGS_BODY: &[u8] = b"body=null";

/// Hardware and OS reported when registering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub device_platform: String,
    pub os: String,
    pub os_api: String,
    pub os_version: String,
    pub device_type: String,
    pub device_brand: String,
    pub device_model: String,
    pub resolution: String,
    pub dpi: String,
    pub language: String,
    pub timezone: i32,
    pub access: String,
    pub rom: String,
    pub rom_version: String,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            device_platform: "android".to_string(),
            os: "android".to_string(),
            os_api: "34".to_string(),
            os_version: "16".to_string(),
            device_type: "Pixel 7 Pro".to_string(),
            device_brand: "google".to_string(),
            device_model: "Pixel 7 Pro".to_string(),
            resolution: "1080*2400".to_string(),
            dpi: "420".to_string(),
            language: "zh".to_string(),
            timezone: 8,
            access: "wifi".to_string(),
            rom: "UP1A.231005.007".to_string(),
            rom_version: "UP1A.231005.007".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    magic_tag: &'static str,
    header: RegisterHeader<'a>,
    #[serde(rename = "_gen_time")]
    gen_time: i64,
}

#[derive(Debug, Serialize)]
struct RegisterHeader<'a> {
    device_id: u64,
    install_id: u64,

    aid: u32,
    app_name: &'static str,
    version_code: u32,
    version_name: &'static str,
    manifest_version_code: u32,
    update_version_code: u32,
    channel: &'static str,
    package: &'static str,

    #[serde(flatten)]
    profile: &'a DeviceProfile,

    openudid: String,
    clientudid: String,
    cdid: &'a str,

    region: &'static str,
    tz_name: &'static str,
    tz_offset: i32,
    sim_region: &'static str,
    carrier_region: &'static str,
    cpu_abi: &'static str,
    build_serial: &'static str,
    not_request_sender: u8,
    sig_hash: &'static str,
    google_aid: &'static str,
    mc: &'static str,
    serial_number: &'static str,
}

impl<'a> RegisterHeader<'a> {
    fn new(aid: u32, profile: &'a DeviceProfile, cdid: &'a str) -> Self {
        let openudid = random_bytes::<8>()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self {
            device_id: 0,
            install_id: 0,
            aid,
            app_name: APP_NAME,
            version_code: APP_VERSION_CODE,
            version_name: APP_VERSION_NAME,
            manifest_version_code: APP_VERSION_CODE,
            update_version_code: APP_VERSION_CODE,
            channel: APP_CHANNEL,
            package: APP_PACKAGE,
            profile,
            openudid,
            clientudid: Uuid::new_v4().to_string(),
            cdid,
            region: "CN",
            tz_name: "Asia/Shanghai",
            tz_offset: profile.timezone * 3600,
            sim_region: "cn",
            carrier_region: "cn",
            cpu_abi: "arm64-v8a",
            build_serial: "unknown",
            not_request_sender: 0,
            sig_hash: "",
            google_aid: "",
            mc: "",
            serial_number: "",
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    device_id: u64,
    #[serde(default)]
    install_id: u64,
}

#[derive(Debug, Deserialize)]
struct SettingsResponse {
    data: SettingsData,
}

#[derive(Debug, Deserialize)]
struct SettingsData {
    settings: Settings,
}

#[derive(Debug, Deserialize)]
struct Settings {
    asr_config: AsrSettings,
}

#[derive(Debug, Deserialize)]
struct AsrSettings {
    app_key: String,
}

/// [`CredentialIssuer`] backed by the registration and settings services.
pub struct HttpCredentialIssuer {
    exchange: Arc<dyn HttpExchange>,
    register_url: String,
    settings_url: String,
    aid: u32,
    user_agent: String,
    profile: DeviceProfile,
}

impl HttpCredentialIssuer {
    pub fn new(exchange: Arc<dyn HttpExchange>, aid: u32, user_agent: impl Into<String>) -> Self {
        Self {
            exchange,
            register_url: REGISTER_URL.to_string(),
            settings_url: SETTINGS_URL.to_string(),
            aid,
            user_agent: user_agent.into(),
            profile: DeviceProfile::default(),
        }
    }

    pub fn from_config(config: &AsrConfig) -> Result<Self> {
        let exchange = ReqwestExchange::new(config.connect_timeout())?;
        Ok(Self::new(Arc::new(exchange), config.aid, config.user_agent.clone()))
    }

    pub fn with_urls(mut self, register_url: impl Into<String>, settings_url: impl Into<String>) -> Self {
        self.register_url = register_url.into();
        self.settings_url = settings_url.into();
        self
    }

    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.profile = profile;
        self
    }

    fn register_request(&self, cdid: &str) -> Result<HttpRequest> {
        let p = &self.profile;
        let aid = self.aid.to_string();
        let version_code = APP_VERSION_CODE.to_string();
        let rticket = Utc::now().timestamp_millis().to_string();
        let url = with_query(
            &self.register_url,
            &[
                ("device_platform", p.device_platform.as_str()),
                ("os", p.os.as_str()),
                ("ssmix", "a"),
                ("_rticket", rticket.as_str()),
                ("cdid", cdid),
                ("channel", APP_CHANNEL),
                ("aid", aid.as_str()),
                ("app_name", APP_NAME),
                ("version_code", version_code.as_str()),
                ("version_name", APP_VERSION_NAME),
                ("manifest_version_code", version_code.as_str()),
                ("update_version_code", version_code.as_str()),
                ("resolution", p.resolution.as_str()),
                ("dpi", p.dpi.as_str()),
                ("device_type", p.device_type.as_str()),
                ("device_brand", p.device_brand.as_str()),
                ("language", p.language.as_str()),
                ("os_api", p.os_api.as_str()),
                ("os_version", p.os_version.as_str()),
                ("ac", "wifi"),
            ],
        )?;

        let body = RegisterBody {
            magic_tag: "ss_app_log",
            header: RegisterHeader::new(self.aid, p, cdid),
            gen_time: Utc::now().timestamp_millis(),
        };

        Ok(HttpRequest {
            url,
            headers: vec![
                ("User-Agent".to_string(), self.user_agent.clone()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: serde_json::to_vec(&body)?,
        })
    }

    fn settings_request(&self, device_id: &str, cdid: &str) -> Result<HttpRequest> {
        let p = &self.profile;
        let aid = self.aid.to_string();
        let version_code = APP_VERSION_CODE.to_string();
        let rticket = Utc::now().timestamp_millis().to_string();
        let url = with_query(
            &self.settings_url,
            &[
                ("device_platform", p.device_platform.as_str()),
                ("os", p.os.as_str()),
                ("ssmix", "a"),
                ("_rticket", rticket.as_str()),
                ("cdid", cdid),
                ("channel", APP_CHANNEL),
                ("aid", aid.as_str()),
                ("app_name", APP_NAME),
                ("version_code", version_code.as_str()),
                ("version_name", APP_VERSION_NAME),
                ("device_id", device_id),
            ],
        )?;

        Ok(HttpRequest {
            url,
            headers: vec![
                ("User-Agent".to_string(), self.user_agent.clone()),
                (HEADER_STUB.to_string(), stub_digest(SETTINGS_BODY)),
            ],
            body: SETTINGS_BODY.to_vec(),
        })
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn register_device(&self) -> Result<Credentials> {
        let cdid = Uuid::new_v4().to_string();
        let request = self.register_request(&cdid)?;
        debug!("POST {}", request.url);

        let reply = self.exchange.post(request).await?;
        check_status(&reply, "device registration")?;
        let response: RegisterResponse = serde_json::from_slice(&reply.body).map_err(|e| {
            AsrError::credentials(format!("unexpected device registration reply: {}", e))
        })?;
        if response.device_id == 0 {
            return Err(AsrError::credentials(
                "device registration returned no device_id",
            ));
        }

        info!("Registered device {}", response.device_id);
        Ok(Credentials {
            device_id: response.device_id.to_string(),
            token: String::new(),
            cdid: Some(cdid),
            install_id: (response.install_id != 0).then(|| response.install_id.to_string()),
        })
    }

    async fn issue_token(&self, device_id: &str, cdid: Option<&str>) -> Result<String> {
        let cdid = cdid
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let request = self.settings_request(device_id, &cdid)?;
        debug!("POST {}", request.url);

        let reply = self.exchange.post(request).await?;
        check_status(&reply, "token request")?;
        let response: SettingsResponse = serde_json::from_slice(&reply.body)
            .map_err(|e| AsrError::credentials(format!("settings reply has no ASR token: {}", e)))?;

        let token = response.data.settings.asr_config.app_key;
        if token.is_empty() {
            return Err(AsrError::credentials("settings reply has an empty ASR token"));
        }
        Ok(token)
    }
}

fn with_query(base: &str, params: &[(&str, &str)]) -> Result<String> {
    Url::parse_with_params(base, params)
        .map(|url| url.to_string())
        .map_err(|e| AsrError::credentials(format!("invalid endpoint {}: {}", base, e)))
}

fn check_status(reply: &HttpReply, what: &str) -> Result<()> {
    if !(200..300).contains(&reply.status) {
        return Err(AsrError::credentials(format!(
            "{} answered {}",
            what, reply.status
        )));
    }
    Ok(())
}
