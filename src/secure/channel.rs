use super::crypto::{chacha20_apply, random_bytes, stub_digest, NONCE_LEN};
use super::exchange::{HttpExchange, HttpReply, HttpRequest, ReqwestExchange};
use super::handshake::{self, AcceptAnyCertificate, CertificateVerifier, HandshakeParams};
use super::session::SecureSession;
use crate::config::AsrConfig;
use crate::constants::{HEADER_ENCRYPTED, HEADER_NONCE, HEADER_STUB, HEADER_TICKET};
use crate::error::{AsrError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Called with every session produced by a handshake, e.g. to persist it.
pub type RenewalCallback = Arc<dyn Fn(&SecureSession) + Send + Sync>;

/// Ciphertext plus the headers that must accompany it.
#[derive(Debug, Clone)]
pub struct ProtectedRequest {
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    /// Session the body was encrypted under; its reply must be decrypted
    /// with the same key even if the cache is renewed meanwhile.
    pub session: Arc<SecureSession>,
}

/// Encrypted request/response channel keyed by a cached [`SecureSession`].
///
/// The session is renewed lazily: any call that finds no session, or an
/// expired one, performs a handshake first. The cache lock is held for the
/// duration of the handshake, so concurrent callers wait for one renewal
/// instead of racing their own.
pub struct SecureChannel {
    params: HandshakeParams,
    exchange: Arc<dyn HttpExchange>,
    verifier: Arc<dyn CertificateVerifier>,
    on_renewal: Option<RenewalCallback>,
    session: Mutex<Option<Arc<SecureSession>>>,
}

impl SecureChannel {
    pub fn new(params: HandshakeParams, exchange: Arc<dyn HttpExchange>) -> Self {
        Self {
            params,
            exchange,
            verifier: Arc::new(AcceptAnyCertificate),
            on_renewal: None,
            session: Mutex::new(None),
        }
    }

    /// Channel for `device_id` using the handshake settings in `config`.
    pub fn from_config(config: &AsrConfig, device_id: &str) -> Result<Self> {
        let url = config
            .secure
            .handshake_url
            .clone()
            .ok_or_else(|| AsrError::Config {
                key: "secure.handshake_url".to_string(),
                message: "required for the secure channel".to_string(),
            })?;
        if config.secure.hkdf_info.is_empty() {
            return Err(AsrError::Config {
                key: "secure.hkdf_info".to_string(),
                message: "required for the secure channel".to_string(),
            });
        }

        let renewal_margin = chrono::Duration::try_seconds(config.secure.renewal_margin_secs)
            .ok_or_else(|| AsrError::Config {
                key: "secure.renewal_margin_secs".to_string(),
                message: "out of range".to_string(),
            })?;

        let params = HandshakeParams {
            url,
            app_id: config.aid.to_string(),
            device_id: device_id.to_string(),
            user_agent: config.user_agent.clone(),
            hkdf_info: config.secure.hkdf_info.as_bytes().to_vec(),
            renewal_margin,
        };
        let exchange = ReqwestExchange::new(config.connect_timeout())?;
        Ok(Self::new(params, Arc::new(exchange)))
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CertificateVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_renewal_callback(mut self, callback: RenewalCallback) -> Self {
        self.on_renewal = Some(callback);
        self
    }

    /// Seed the cache with a stored session. Expired sessions are ignored.
    pub fn with_session(self, session: SecureSession) -> Self {
        if session.is_expired() {
            debug!("Ignoring expired cached session");
            return self;
        }
        Self {
            session: Mutex::new(Some(Arc::new(session))),
            ..self
        }
    }

    /// The cached session, if any, without renewing it.
    pub async fn current_session(&self) -> Option<Arc<SecureSession>> {
        self.session.lock().await.clone()
    }

    /// A valid session, performing a handshake when none is cached or the
    /// cached one has expired.
    pub async fn ensure_session(&self) -> Result<Arc<SecureSession>> {
        let mut cached = self.session.lock().await;
        if let Some(session) = cached.as_ref() {
            if !session.is_expired() {
                return Ok(Arc::clone(session));
            }
            info!("Secure session expired, renewing");
        }

        let session = Arc::new(self.run_handshake().await?);
        *cached = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Force a new handshake and replace the cached session.
    pub async fn handshake(&self) -> Result<Arc<SecureSession>> {
        let mut cached = self.session.lock().await;
        let session = Arc::new(self.run_handshake().await?);
        *cached = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn run_handshake(&self) -> Result<SecureSession> {
        let session =
            handshake::perform(self.exchange.as_ref(), self.verifier.as_ref(), &self.params)
                .await?;
        if let Some(callback) = &self.on_renewal {
            callback(&session);
        }
        Ok(session)
    }

    /// Encrypt `plaintext` under a fresh nonce.
    pub async fn protect(
        &self,
        plaintext: &[u8],
        extra_headers: &[(String, String)],
    ) -> Result<ProtectedRequest> {
        let session = self.ensure_session().await?;
        let nonce = random_bytes::<NONCE_LEN>();
        let body = chacha20_apply(&session.encryption_key, &nonce, plaintext);

        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (HEADER_ENCRYPTED.to_string(), "1".to_string()),
            (HEADER_TICKET.to_string(), session.ticket.clone()),
            (HEADER_NONCE.to_string(), STANDARD.encode(nonce)),
            (HEADER_STUB.to_string(), stub_digest(&body)),
        ];
        for (name, value) in extra_headers {
            match headers
                .iter_mut()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
            {
                Some(existing) => existing.1 = value.clone(),
                None => headers.push((name.clone(), value.clone())),
            }
        }

        Ok(ProtectedRequest {
            body,
            headers,
            session,
        })
    }

    /// Decrypt with the current session key.
    pub async fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
        let session = self.established().await?;
        decrypt_with(&session, ciphertext, nonce)
    }

    /// Decrypt a reply with the current session key, taking the nonce from
    /// its header.
    pub async fn unprotect(&self, reply: &HttpReply) -> Result<Vec<u8>> {
        let session = self.established().await?;
        unprotect_with(&session, reply)
    }

    async fn established(&self) -> Result<Arc<SecureSession>> {
        self.current_session()
            .await
            .ok_or_else(|| AsrError::crypto("no secure session established"))
    }

    /// Encrypt, POST to `url`, and decrypt the reply.
    pub async fn call(
        &self,
        url: &str,
        plaintext: &[u8],
        extra_headers: &[(String, String)],
    ) -> Result<Vec<u8>> {
        let protected = self.protect(plaintext, extra_headers).await?;
        let reply = self
            .exchange
            .post(HttpRequest {
                url: url.to_string(),
                headers: protected.headers.clone(),
                body: protected.body.clone(),
            })
            .await?;

        if reply.status != 200 {
            return Err(AsrError::Server {
                message: format!("protected call to {} answered {}", url, reply.status),
            });
        }
        if reply.header(HEADER_NONCE).is_none() {
            return Err(AsrError::crypto(format!(
                "reply from {} is not encrypted",
                url
            )));
        }
        unprotect_with(&protected.session, &reply)
    }
}

/// Decrypt `ciphertext` with the key of `session`.
pub fn decrypt_with(session: &SecureSession, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>> {
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| AsrError::crypto(format!("nonce must be {} bytes", NONCE_LEN)))?;
    Ok(chacha20_apply(&session.encryption_key, &nonce, ciphertext))
}

/// Decrypt a reply with the key of `session`, taking the nonce from its
/// header.
pub fn unprotect_with(session: &SecureSession, reply: &HttpReply) -> Result<Vec<u8>> {
    let encoded = reply
        .header(HEADER_NONCE)
        .ok_or_else(|| AsrError::crypto(format!("reply has no {} header", HEADER_NONCE)))?;
    let nonce = STANDARD
        .decode(encoded)
        .map_err(|e| AsrError::crypto(format!("bad nonce header: {}", e)))?;
    decrypt_with(session, &reply.body, &nonce)
}
