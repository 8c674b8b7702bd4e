//! Primitives used by the secure channel.

use crate::error::{AsrError, Result};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};
use hkdf::Hkdf;
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const RANDOM_LEN: usize = 32;

/// ChaCha20 (IETF, block counter 0). Encryption and decryption are the same
/// operation.
pub fn chacha20_apply(key: &[u8; KEY_LEN], nonce: &[u8; NONCE_LEN], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    let mut cipher = ChaCha20::new(Key::from_slice(key), Nonce::from_slice(nonce));
    cipher.apply_keystream(&mut buf);
    buf
}

/// HKDF-SHA256 expanding the ECDH secret into the session key.
pub fn derive_key(shared_secret: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| AsrError::crypto(format!("key derivation failed: {}", e)))?;
    Ok(okm)
}

/// Uppercase hex MD5, sent as the request stub header.
pub fn stub_digest(data: &[u8]) -> String {
    Md5::digest(data)
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect()
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chacha20_is_symmetric() {
        let key = [7u8; KEY_LEN];
        let nonce = [1u8; NONCE_LEN];
        let plaintext = b"{\"text\":\"hello\"}";

        let ciphertext = chacha20_apply(&key, &nonce, plaintext);
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());
        assert_eq!(chacha20_apply(&key, &nonce, &ciphertext), plaintext.to_vec());
    }

    #[test]
    fn test_chacha20_zero_key_keystream() {
        // RFC 8439 appendix A.1, test vector 1.
        let out = chacha20_apply(&[0u8; KEY_LEN], &[0u8; NONCE_LEN], &[0u8; 8]);
        assert_eq!(out, vec![0x76, 0xb8, 0xe0, 0xad, 0xa0, 0xf1, 0x3d, 0x90]);
    }

    #[test]
    fn test_stub_digest() {
        assert_eq!(stub_digest(b""), "D41D8CD98F00B204E9800998ECF8427E");
        assert_eq!(stub_digest(b"abc"), "900150983CD24FB0D6963F7D28E17F72");
    }

    #[test]
    fn test_derive_key_depends_on_salt() {
        let a = derive_key(b"secret", b"salt-a", b"info").unwrap();
        let b = derive_key(b"secret", b"salt-b", b"info").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, derive_key(b"secret", b"salt-a", b"info").unwrap());
    }

    #[test]
    fn test_random_bytes_differ() {
        assert_ne!(random_bytes::<32>(), random_bytes::<32>());
    }
}
