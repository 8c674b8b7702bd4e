//! Ephemeral P-256 key agreement with the secure channel endpoint.
//!
//! The client sends a fresh public key and random value in a JSON body
//! signed with the same key. The server answers with its own key share and
//! the session tickets, and both sides derive the ChaCha20 key with
//! HKDF-SHA256 over the ECDH secret.

use super::crypto::{derive_key, random_bytes, RANDOM_LEN};
use super::exchange::{HttpExchange, HttpRequest};
use super::session::SecureSession;
use crate::constants::{CIPHER_SUITE_CHACHA20, HANDSHAKE_CURVE, HANDSHAKE_VERSION, HEADER_SIGNATURE};
use crate::error::{AsrError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Duration, Utc};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    pub curve: String,
    /// Base64 uncompressed SEC1 point
    pub pubkey: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub version: u32,
    pub random: String,
    pub app_id: String,
    pub did: String,
    pub key_shares: Vec<KeyShare>,
    pub cipher_suites: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub version: u32,
    pub random: String,
    pub key_share: KeyShare,
    pub cipher_suite: u32,
    pub cert: String,
    pub ticket: String,
    pub ticket_exp: i64,
    pub ticket_long: String,
    pub ticket_long_exp: i64,
}

/// Decides whether the server certificate from a handshake is trusted.
pub trait CertificateVerifier: Send + Sync {
    fn verify(&self, cert: &str) -> Result<()>;
}

/// Trusts every certificate. The service does not publish a trust root.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyCertificate;

impl CertificateVerifier for AcceptAnyCertificate {
    fn verify(&self, _cert: &str) -> Result<()> {
        Ok(())
    }
}

/// Inputs of one handshake.
#[derive(Debug, Clone)]
pub struct HandshakeParams {
    pub url: String,
    pub app_id: String,
    pub device_id: String,
    pub user_agent: String,
    pub hkdf_info: Vec<u8>,
    pub renewal_margin: Duration,
}

/// Client half of a handshake in flight.
pub struct ClientHello {
    secret: SecretKey,
    random: [u8; RANDOM_LEN],
    body: String,
    signature: String,
}

impl ClientHello {
    pub fn new(app_id: &str, device_id: &str) -> Result<Self> {
        let secret = SecretKey::random(&mut OsRng);
        let random = random_bytes::<RANDOM_LEN>();
        let point = secret.public_key().to_encoded_point(false);

        let request = HandshakeRequest {
            version: HANDSHAKE_VERSION,
            random: STANDARD.encode(random),
            app_id: app_id.to_string(),
            did: device_id.to_string(),
            key_shares: vec![KeyShare {
                curve: HANDSHAKE_CURVE.to_string(),
                pubkey: STANDARD.encode(point.as_bytes()),
            }],
            cipher_suites: vec![CIPHER_SUITE_CHACHA20],
        };
        let body = serde_json::to_string(&request)?;

        let signing_key = SigningKey::from(&secret);
        let signature: Signature = signing_key.sign(body.as_bytes());
        let signature = STANDARD.encode(signature.to_der().as_bytes());

        Ok(Self {
            secret,
            random,
            body,
            signature,
        })
    }

    /// Exact JSON body that was signed.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Base64 DER ECDSA-SHA256 signature of [`body`](Self::body).
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn client_random(&self) -> &[u8] {
        &self.random
    }

    /// Derive the session from the server's answer.
    pub fn complete(
        self,
        response: &HandshakeResponse,
        hkdf_info: &[u8],
        renewal_margin: Duration,
    ) -> Result<SecureSession> {
        if response.ticket_exp <= 0 {
            return Err(AsrError::handshake(format!(
                "ticket_exp must be positive, got {}",
                response.ticket_exp
            )));
        }
        if response.key_share.curve != HANDSHAKE_CURVE {
            return Err(AsrError::handshake(format!(
                "unsupported curve {}",
                response.key_share.curve
            )));
        }

        let server_point = decode_field("key_share.pubkey", &response.key_share.pubkey)?;
        let server_key = PublicKey::from_sec1_bytes(&server_point)
            .map_err(|e| AsrError::handshake(format!("invalid server key share: {}", e)))?;
        let server_random = decode_field("random", &response.random)?;

        let shared =
            p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), server_key.as_affine());
        let shared_secret = shared.raw_secret_bytes().to_vec();

        let mut salt = Vec::with_capacity(RANDOM_LEN + server_random.len());
        salt.extend_from_slice(&self.random);
        salt.extend_from_slice(&server_random);
        let encryption_key = derive_key(&shared_secret, &salt, hkdf_info)?;

        let absolute_expiry = Duration::try_seconds(response.ticket_exp)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .and_then(|expiry| expiry.checked_sub_signed(renewal_margin))
            .ok_or_else(|| {
                AsrError::handshake(format!("ticket_exp {} out of range", response.ticket_exp))
            })?;

        Ok(SecureSession {
            ticket: response.ticket.clone(),
            ticket_long: response.ticket_long.clone(),
            encryption_key,
            client_random: self.random.to_vec(),
            server_random,
            shared_secret,
            ticket_expiry: response.ticket_exp,
            ticket_long_expiry: response.ticket_long_exp,
            absolute_expiry,
        })
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| AsrError::handshake(format!("{} is not base64: {}", name, e)))
}

/// Run a complete handshake against `params.url`.
pub async fn perform(
    exchange: &dyn HttpExchange,
    verifier: &dyn CertificateVerifier,
    params: &HandshakeParams,
) -> Result<SecureSession> {
    info!("Starting secure channel handshake");
    let hello = ClientHello::new(&params.app_id, &params.device_id)?;

    let request = HttpRequest {
        url: params.url.clone(),
        headers: vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (HEADER_SIGNATURE.to_string(), hello.signature().to_string()),
            ("User-Agent".to_string(), params.user_agent.clone()),
        ],
        body: hello.body().as_bytes().to_vec(),
    };

    let reply = exchange.post(request).await?;
    if reply.status != 200 {
        return Err(AsrError::handshake(format!(
            "server answered {}: {}",
            reply.status,
            String::from_utf8_lossy(&reply.body)
        )));
    }

    let response: HandshakeResponse = serde_json::from_slice(&reply.body)
        .map_err(|e| AsrError::handshake(format!("malformed response: {}", e)))?;
    debug!(
        "Handshake answered: suite={} ticket_exp={}s",
        response.cipher_suite, response.ticket_exp
    );

    verifier.verify(&response.cert)?;

    let session = hello.complete(&response, &params.hkdf_info, params.renewal_margin)?;
    info!("Secure session established, renew at {}", session.absolute_expiry);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let hello = ClientHello::new("401734", "dev-1").unwrap();
        let value: serde_json::Value = serde_json::from_str(hello.body()).unwrap();

        assert_eq!(value["version"], 2);
        assert_eq!(value["app_id"], "401734");
        assert_eq!(value["did"], "dev-1");
        assert_eq!(value["cipher_suites"], serde_json::json!([4097]));
        assert_eq!(value["key_shares"][0]["curve"], "secp256r1");

        let point = STANDARD
            .decode(value["key_shares"][0]["pubkey"].as_str().unwrap())
            .unwrap();
        assert_eq!(point.len(), 65);
        assert_eq!(point[0], 0x04);
        assert_eq!(hello.client_random().len(), 32);
    }

    #[test]
    fn test_body_field_order() {
        let hello = ClientHello::new("1", "2").unwrap();
        assert!(hello.body().starts_with(r#"{"version":2,"random":""#));
    }
}
