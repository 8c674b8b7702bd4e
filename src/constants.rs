//! Service endpoints and the client identity presented to them.

/// ASR WebSocket endpoint.
pub const WEBSOCKET_URL: &str = "wss://frontier-audio-ime-ws.doubao.com/ocean/api/v1/ws";

/// Application id of the input-method client.
pub const AID: u32 = 401734;

pub const APP_NAME: &str = "oime";
pub const APP_VERSION_NAME: &str = "1.1.2";
pub const APP_VERSION_CODE: u32 = 100102018;
pub const APP_PACKAGE: &str = "com.bytedance.android.doubaoime";
pub const APP_CHANNEL: &str = "official";

pub const USER_AGENT: &str = "com.bytedance.android.doubaoime/100102018 (Linux; U; Android 16; en_US; Pixel 7 Pro; Build/BP2A.250605.031.A2; Cronet/TTNetVersion:94cf429a 2025-11-17 QuicVersion:1f89f732 2025-05-08)";

/// Device registration endpoint.
pub const REGISTER_URL: &str = "https://log.snssdk.com/service/2/device_register/";

/// Settings endpoint; its `asr_config.app_key` is the ASR token.
pub const SETTINGS_URL: &str = "https://is.snssdk.com/service/settings/v3/";

/// Service name carried by every ASR request.
pub const SERVICE_NAME: &str = "ASR";

/// Connection headers required when opening the streaming socket.
pub const PROTO_VERSION_HEADER: (&str, &str) = ("proto-version", "v2");
pub const KEEPALIVE_HEADER: (&str, &str) = ("x-custom-keepalive", "true");

/// Secure channel handshake version and cipher suite (ChaCha20).
pub const HANDSHAKE_VERSION: u32 = 2;
pub const CIPHER_SUITE_CHACHA20: u32 = 4097;
pub const HANDSHAKE_CURVE: &str = "secp256r1";

/// Secure channel headers.
pub const HEADER_SIGNATURE: &str = "x-tt-s-sign";
pub const HEADER_ENCRYPTED: &str = "x-tt-e-b";
pub const HEADER_TICKET: &str = "x-tt-e-t";
pub const HEADER_NONCE: &str = "x-tt-e-p";
pub const HEADER_STUB: &str = "x-ss-stub";
