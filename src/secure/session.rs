use super::crypto::KEY_LEN;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keys and tickets negotiated by one handshake.
///
/// Replaced wholesale on renewal, never mutated. Byte fields serialize as
/// base64 so the session can be cached next to the device credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureSession {
    pub ticket: String,
    pub ticket_long: String,
    #[serde(with = "base64_bytes")]
    pub encryption_key: [u8; KEY_LEN],
    #[serde(with = "base64_bytes")]
    pub client_random: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub server_random: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub shared_secret: Vec<u8>,
    /// Lifetime of `ticket` in seconds, as declared by the server.
    pub ticket_expiry: i64,
    /// Lifetime of `ticket_long` in seconds.
    pub ticket_long_expiry: i64,
    /// When this session must be renewed (ticket expiry minus the renewal
    /// margin).
    pub absolute_expiry: DateTime<Utc>,
}

impl SecureSession {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.absolute_expiry
    }
}

impl fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSession")
            .field("ticket", &self.ticket)
            .field("ticket_long", &self.ticket_long)
            .field("encryption_key", &"<redacted>")
            .field("shared_secret", &"<redacted>")
            .field("ticket_expiry", &self.ticket_expiry)
            .field("ticket_long_expiry", &self.ticket_long_expiry)
            .field("absolute_expiry", &self.absolute_expiry)
            .finish_non_exhaustive()
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: TryFrom<Vec<u8>>,
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(encoded).map_err(de::Error::custom)?;
        let len = bytes.len();
        T::try_from(bytes).map_err(|_| de::Error::custom(format!("unexpected length {}", len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expiry: DateTime<Utc>) -> SecureSession {
        SecureSession {
            ticket: "t".to_string(),
            ticket_long: "tl".to_string(),
            encryption_key: [9u8; KEY_LEN],
            client_random: vec![1; 32],
            server_random: vec![2; 32],
            shared_secret: vec![3; 32],
            ticket_expiry: 3600,
            ticket_long_expiry: 86400,
            absolute_expiry: expiry,
        }
    }

    #[test]
    fn test_json_uses_base64() {
        let s = session(Utc::now());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["client_random"], "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=");

        let back: SecureSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_rejects_short_key() {
        let mut json = serde_json::to_value(session(Utc::now())).unwrap();
        json["encryption_key"] = serde_json::Value::String("AAAA".to_string());
        assert!(serde_json::from_value::<SecureSession>(json).is_err());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let s = session(now + Duration::seconds(10));
        assert!(!s.is_expired_at(now));
        assert!(s.is_expired_at(now + Duration::seconds(10)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", session(Utc::now()));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("[9, 9"));
    }
}
