//! Encrypted request/response channel.
//!
//! Used for protected HTTP calls outside the streaming session. Keys come
//! from an ephemeral ECDH handshake and are cached until the server's
//! ticket is about to expire.

pub mod channel;
pub mod crypto;
pub mod exchange;
pub mod handshake;
pub mod session;

pub use channel::{
    decrypt_with, unprotect_with, ProtectedRequest, RenewalCallback, SecureChannel,
};
pub use exchange::{HttpExchange, HttpReply, HttpRequest, ReqwestExchange};
pub use handshake::{
    AcceptAnyCertificate, CertificateVerifier, ClientHello, HandshakeParams, HandshakeRequest,
    HandshakeResponse, KeyShare,
};
pub use session::SecureSession;
