//! Device identity used to open sessions.
//!
//! Resolved once per client with precedence: explicit config values, then
//! the credential cache file, then a [`CredentialIssuer`]. Explicit values
//! always win, field by field.

use crate::config::AsrConfig;
use crate::error::{AsrError, Result};
use crate::secure::SecureSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub device_id: String,
    pub token: String,
    pub cdid: Option<String>,
    pub install_id: Option<String>,
}

impl Credentials {
    pub fn new(device_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            token: token.into(),
            cdid: None,
            install_id: None,
        }
    }

    pub async fn resolve(
        config: &AsrConfig,
        issuer: Option<&dyn CredentialIssuer>,
    ) -> Result<Self> {
        let store = config.credential_path().map(CredentialStore::new);
        let cached = match &store {
            Some(store) => store.load()?,
            None => None,
        };

        let mut device_id = config.device_id.clone();
        let mut token = config.token.clone();
        let mut cdid = None;
        let mut install_id = None;
        let mut secure_session = None;

        if let Some(file) = cached {
            debug!("Loaded cached credentials");
            device_id = device_id.or(file.device_id);
            token = token.or(file.token.filter(|t| !t.is_empty()));
            cdid = file.cdid;
            install_id = file.install_id;
            secure_session = file.secure_session;
        }

        let mut registered = false;
        let device_id = match device_id {
            Some(id) => id,
            None => {
                let issuer = issuer.ok_or_else(missing_credentials)?;
                info!("Registering a new device");
                let fresh = issuer.register_device().await?;
                cdid = fresh.cdid;
                install_id = fresh.install_id;
                registered = true;
                fresh.device_id
            }
        };

        let token = match token {
            Some(token) => token,
            None => {
                let issuer = issuer.ok_or_else(missing_credentials)?;
                info!("Requesting an ASR token");
                issuer.issue_token(&device_id, cdid.as_deref()).await?
            }
        };

        let credentials = Credentials {
            device_id,
            token,
            cdid,
            install_id,
        };

        if registered {
            if let Some(store) = &store {
                store.save(&StoredCredentials::from_parts(&credentials, secure_session))?;
            }
        }

        Ok(credentials)
    }
}

fn missing_credentials() -> AsrError {
    AsrError::Credentials {
        message: "no device_id/token configured, none cached, and no issuer available"
            .to_string(),
    }
}

/// Obtains credentials from the service when none are configured or cached.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn register_device(&self) -> Result<Credentials>;

    async fn issue_token(&self, device_id: &str, cdid: Option<&str>) -> Result<String>;
}

/// On-disk form of the credential cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredCredentials {
    pub device_id: Option<String>,
    pub install_id: Option<String>,
    pub cdid: Option<String>,
    pub token: Option<String>,
    pub secure_session: Option<SecureSession>,
}

impl StoredCredentials {
    fn from_parts(credentials: &Credentials, secure_session: Option<SecureSession>) -> Self {
        Self {
            device_id: Some(credentials.device_id.clone()),
            install_id: credentials.install_id.clone(),
            cdid: credentials.cdid.clone(),
            token: Some(credentials.token.clone()),
            secure_session,
        }
    }
}

/// JSON credential cache file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cache. A missing or unreadable file counts as empty.
    pub fn load(&self) -> Result<Option<StoredCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        match serde_json::from_str(&contents) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                warn!("Ignoring malformed credential file {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, stored: &StoredCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(stored)?)?;
        debug!("Saved credentials to {}", self.path.display());
        Ok(())
    }

    /// Store a renewed secure session alongside the cached credentials.
    pub fn save_secure_session(&self, session: &SecureSession) -> Result<()> {
        let mut stored = self.load()?.unwrap_or_default();
        stored.secure_session = Some(session.clone());
        self.save(&stored)
    }

    /// Cached secure session, if present and still valid.
    pub fn secure_session(&self) -> Result<Option<SecureSession>> {
        Ok(self
            .load()?
            .and_then(|stored| stored.secure_session)
            .filter(|session| !session.is_expired()))
    }
}
