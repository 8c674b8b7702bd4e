// Integration tests for credential resolution and the credential cache

use anyhow::Result;
use async_trait::async_trait;
use doubao_asr::credentials::StoredCredentials;
use doubao_asr::{AsrConfig, AsrError, CredentialIssuer, CredentialStore, Credentials};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Issuer that hands out fixed identities and counts calls.
#[derive(Default)]
struct CountingIssuer {
    registrations: AtomicUsize,
    tokens: AtomicUsize,
}

#[async_trait]
impl CredentialIssuer for CountingIssuer {
    async fn register_device(&self) -> doubao_asr::Result<Credentials> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(Credentials {
            device_id: "issued-device".to_string(),
            token: String::new(),
            cdid: Some("issued-cdid".to_string()),
            install_id: Some("issued-install".to_string()),
        })
    }

    async fn issue_token(&self, device_id: &str, cdid: Option<&str>) -> doubao_asr::Result<String> {
        self.tokens.fetch_add(1, Ordering::SeqCst);
        Ok(format!("token-for-{}-{}", device_id, cdid.unwrap_or("none")))
    }
}

fn config_with_cache(dir: &TempDir) -> AsrConfig {
    AsrConfig {
        credential_path: Some(
            dir.path()
                .join("nested")
                .join("credentials.json")
                .to_string_lossy()
                .into_owned(),
        ),
        ..AsrConfig::default()
    }
}

#[tokio::test]
async fn test_explicit_values_need_no_issuer() -> Result<()> {
    let config = AsrConfig {
        device_id: Some("explicit-device".to_string()),
        token: Some("explicit-token".to_string()),
        ..AsrConfig::default()
    };

    let credentials = Credentials::resolve(&config, None).await?;
    assert_eq!(credentials, Credentials::new("explicit-device", "explicit-token"));
    Ok(())
}

#[tokio::test]
async fn test_missing_credentials_without_issuer() -> Result<()> {
    let err = Credentials::resolve(&AsrConfig::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AsrError::Credentials { .. }));
    Ok(())
}

#[tokio::test]
async fn test_registers_and_caches_new_device() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_with_cache(&dir);
    let issuer = CountingIssuer::default();

    let credentials = Credentials::resolve(&config, Some(&issuer)).await?;
    assert_eq!(credentials.device_id, "issued-device");
    assert_eq!(credentials.token, "token-for-issued-device-issued-cdid");
    assert_eq!(credentials.install_id.as_deref(), Some("issued-install"));

    let stored = CredentialStore::new(config.credential_path().unwrap())
        .load()?
        .unwrap();
    assert_eq!(stored.device_id.as_deref(), Some("issued-device"));
    assert_eq!(stored.token.as_deref(), Some("token-for-issued-device-issued-cdid"));

    // Second resolution comes from the cache
    let again = Credentials::resolve(&config, Some(&issuer)).await?;
    assert_eq!(again, credentials);
    assert_eq!(issuer.registrations.load(Ordering::SeqCst), 1);
    assert_eq!(issuer.tokens.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_explicit_fields_override_cache() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config_with_cache(&dir);
    CredentialStore::new(config.credential_path().unwrap()).save(&StoredCredentials {
        device_id: Some("cached-device".to_string()),
        token: Some("cached-token".to_string()),
        cdid: Some("cached-cdid".to_string()),
        ..StoredCredentials::default()
    })?;

    config.token = Some("explicit-token".to_string());
    let credentials = Credentials::resolve(&config, None).await?;

    assert_eq!(credentials.device_id, "cached-device");
    assert_eq!(credentials.token, "explicit-token");
    assert_eq!(credentials.cdid.as_deref(), Some("cached-cdid"));
    Ok(())
}

#[tokio::test]
async fn test_empty_cached_token_is_reissued() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config_with_cache(&dir);
    CredentialStore::new(config.credential_path().unwrap()).save(&StoredCredentials {
        device_id: Some("cached-device".to_string()),
        token: Some(String::new()),
        ..StoredCredentials::default()
    })?;
    let issuer = CountingIssuer::default();

    let credentials = Credentials::resolve(&config, Some(&issuer)).await?;
    assert_eq!(credentials.token, "token-for-cached-device-none");
    assert_eq!(issuer.registrations.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_malformed_cache_is_ignored() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("credentials.json");
    std::fs::write(&path, "{ not json")?;

    let store = CredentialStore::new(&path);
    assert!(store.load()?.is_none());
    assert!(store.secure_session()?.is_none());
    Ok(())
}

#[test]
fn test_missing_cache_is_empty() -> Result<()> {
    let dir = TempDir::new()?;
    let store = CredentialStore::new(dir.path().join("absent.json"));
    assert!(store.load()?.is_none());
    assert_eq!(store.path(), dir.path().join("absent.json"));
    Ok(())
}

fn secure_session(valid_for_secs: i64) -> doubao_asr::SecureSession {
    doubao_asr::SecureSession {
        ticket: "ticket".to_string(),
        ticket_long: "ticket-long".to_string(),
        encryption_key: [7u8; 32],
        client_random: vec![1; 32],
        server_random: vec![2; 32],
        shared_secret: vec![3; 32],
        ticket_expiry: valid_for_secs,
        ticket_long_expiry: valid_for_secs * 10,
        absolute_expiry: chrono::Utc::now() + chrono::Duration::seconds(valid_for_secs),
    }
}

#[test]
fn test_secure_session_is_cached_beside_credentials() -> Result<()> {
    let dir = TempDir::new()?;
    let store = CredentialStore::new(dir.path().join("credentials.json"));
    store.save(&StoredCredentials {
        device_id: Some("dev".to_string()),
        token: Some("tok".to_string()),
        ..StoredCredentials::default()
    })?;

    let session = secure_session(3600);
    store.save_secure_session(&session)?;

    let stored = store.load()?.unwrap();
    assert_eq!(stored.device_id.as_deref(), Some("dev"));
    assert_eq!(stored.secure_session.as_ref(), Some(&session));
    assert_eq!(store.secure_session()?, Some(session));
    Ok(())
}

#[test]
fn test_expired_secure_session_is_not_returned() -> Result<()> {
    let dir = TempDir::new()?;
    let store = CredentialStore::new(dir.path().join("credentials.json"));

    store.save_secure_session(&secure_session(-5))?;

    assert!(store.load()?.unwrap().secure_session.is_some());
    assert!(store.secure_session()?.is_none());
    Ok(())
}
