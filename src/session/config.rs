use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Cookie name used when neither the manager nor the cookie provider configures one.
pub const DEFAULT_COOKIE_NAME: &str = "brrtsessionid";

/// Default GC interval and session lifetime, in seconds.
pub const DEFAULT_GC_LIFETIME: u64 = 3600;

/// Session manager configuration.
///
/// Parsed from a JSON object using the field names below. Every field is optional.
///
/// ```json
/// {
///   "cookieName": "brrtsessionid",
///   "enableSetCookie": true,
///   "gclifetime": 3600,
///   "maxLifetime": 3600,
///   "secure": false,
///   "sessionIDHashFunc": "sha1",
///   "sessionIDHashKey": "",
///   "cookieLifeTime": 0,
///   "providerConfig": "",
///   "domain": ""
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    #[serde(rename = "cookieName")]
    pub cookie_name: String,
    /// Emit `Set-Cookie` when a new session id is minted
    #[serde(rename = "enableSetCookie")]
    pub enable_set_cookie: bool,
    /// GC interval in seconds; 0 disables background GC
    #[serde(rename = "gclifetime")]
    pub gc_lifetime: u64,
    /// Session lifetime in seconds; 0 falls back to `gclifetime`
    #[serde(rename = "maxLifetime")]
    pub max_lifetime: u64,
    pub secure: bool,
    /// `sha1` (default) or `sha256`
    #[serde(rename = "sessionIDHashFunc")]
    pub session_id_hash_func: String,
    /// HMAC key for session ids; random when empty
    #[serde(rename = "sessionIDHashKey")]
    pub session_id_hash_key: String,
    /// `Max-Age` of the session cookie in seconds; 0 makes it a browser-session cookie
    #[serde(rename = "cookieLifeTime")]
    pub cookie_lifetime: i64,
    /// Opaque string handed to the provider's `init`
    #[serde(rename = "providerConfig")]
    pub provider_config: String,
    pub domain: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            enable_set_cookie: true,
            gc_lifetime: DEFAULT_GC_LIFETIME,
            max_lifetime: 0,
            secure: false,
            session_id_hash_func: String::new(),
            session_id_hash_key: String::new(),
            cookie_lifetime: 0,
            provider_config: String::new(),
            domain: String::new(),
        }
    }
}

impl ManagerConfig {
    /// Parse a JSON config blob. An empty string yields the defaults.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|e| SessionError::InvalidConfig(e.to_string()))
    }

    /// Effective session lifetime in seconds.
    #[must_use]
    pub fn effective_max_lifetime(&self) -> u64 {
        if self.max_lifetime == 0 {
            self.gc_lifetime
        } else {
            self.max_lifetime
        }
    }
}

/// Cookie provider configuration, passed as the manager's `providerConfig` string.
///
/// `securityKey` signs the cookie, `blockKey` (16, 24 or 32 bytes) encrypts it.
/// Missing keys are replaced by random ones held for the life of the process, which
/// invalidates every outstanding cookie on restart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    #[serde(rename = "securityKey")]
    pub security_key: String,
    #[serde(rename = "blockKey")]
    pub block_key: String,
    /// Name bound into the cookie signature; random when empty
    #[serde(rename = "securityName")]
    pub security_name: String,
    #[serde(rename = "cookieName")]
    pub cookie_name: String,
    pub secure: bool,
    /// `Max-Age` of the written cookie in seconds; 0 omits it
    pub maxage: i64,
    /// Cookie signature HMAC, `sha1` (default) or `sha256`
    #[serde(rename = "hashFunc")]
    pub hash_func: String,
}

impl CookieConfig {
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json).map_err(|e| SessionError::InvalidProviderConfig(e.to_string()))
    }
}
