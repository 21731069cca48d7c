use super::codec::CookieCodec;
use super::config::{CookieConfig, DEFAULT_COOKIE_NAME};
use super::provider::{Provider, SessionStore};
use super::value::{SessionValue, SessionValues};
use crate::error::SessionError;
use crate::ids::{random_bytes, HashFunc};
use crate::server::{Cookie, ResponseWriter};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Reserved value key carrying the session id inside the encrypted cookie.
pub const SID_KEY: &str = "_sid";

#[derive(Debug)]
struct CookieSettings {
    name: String,
    secure: bool,
    max_age: i64,
}

/// Session store whose whole state travels in the client's cookie.
pub struct CookieStore {
    sid: String,
    values: RwLock<SessionValues>,
    codec: Arc<CookieCodec>,
    settings: Arc<CookieSettings>,
}

impl CookieStore {
    fn new(
        sid: &str,
        values: SessionValues,
        codec: &Arc<CookieCodec>,
        settings: &Arc<CookieSettings>,
    ) -> Self {
        Self {
            sid: sid.to_string(),
            values: RwLock::new(values),
            codec: Arc::clone(codec),
            settings: Arc::clone(settings),
        }
    }
}

impl SessionStore for CookieStore {
    fn set(&self, key: &str, value: SessionValue) {
        self.values.write().insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<SessionValue> {
        self.values.read().get(key).cloned()
    }

    fn delete(&self, key: &str) -> Option<SessionValue> {
        self.values.write().remove(key)
    }

    fn flush(&self) {
        self.values.write().clear();
    }

    fn session_id(&self) -> &str {
        &self.sid
    }

    fn values(&self) -> SessionValues {
        self.values.read().clone()
    }

    fn release(&self, res: &mut ResponseWriter) -> Result<(), SessionError> {
        let mut values = self.values();
        values.insert(SID_KEY.to_string(), SessionValue::Str(self.sid.clone()));
        let encoded = self.codec.encode(&values)?;

        let cookie = Cookie {
            path: Some("/".into()),
            http_only: true,
            secure: self.settings.secure,
            max_age: (self.settings.max_age > 0).then_some(self.settings.max_age),
            ..Cookie::new(
                self.settings.name.as_str(),
                urlencoding::encode(&encoded).into_owned(),
            )
        };
        if !res.set_cookie(&cookie) {
            return Err(SessionError::HeadersAlreadyWritten(self.sid.clone()));
        }
        debug!(session_id = %self.sid, bytes = cookie.value.len(), "Session cookie written");
        Ok(())
    }
}

/// Provider that keeps no server-side state.
///
/// The session id is carried inside the encrypted payload, so a valid cookie value
/// is its own lookup key. `gc`, `destroy` and `count` have nothing to act on.
pub struct CookieProvider {
    codec: Option<Arc<CookieCodec>>,
    settings: Arc<CookieSettings>,
}

impl Default for CookieProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            codec: None,
            settings: Arc::new(CookieSettings {
                name: DEFAULT_COOKIE_NAME.to_string(),
                secure: false,
                max_age: 0,
            }),
        }
    }

    fn codec(&self) -> Result<&Arc<CookieCodec>, SessionError> {
        self.codec
            .as_ref()
            .ok_or_else(|| SessionError::InvalidProviderConfig("cookie provider not initialised".into()))
    }

    fn decode(&self, value: &str) -> Option<SessionValues> {
        self.codec.as_ref()?.decode(value).ok()
    }

    fn store(&self, sid: &str, values: SessionValues) -> Result<Arc<dyn SessionStore>, SessionError> {
        Ok(Arc::new(CookieStore::new(
            sid,
            values,
            self.codec()?,
            &self.settings,
        )))
    }
}

impl Provider for CookieProvider {
    fn init(&mut self, max_lifetime: u64, config: &str) -> Result<(), SessionError> {
        let cfg = CookieConfig::from_json(config)?;

        let hash = HashFunc::parse(&cfg.hash_func).ok_or_else(|| {
            SessionError::InvalidProviderConfig(format!("unsupported hashFunc {:?}", cfg.hash_func))
        })?;
        let hash_key = if cfg.security_key.is_empty() {
            random_bytes(32)
        } else {
            cfg.security_key.into_bytes()
        };
        let block_key = if cfg.block_key.is_empty() {
            random_bytes(16)
        } else {
            cfg.block_key.into_bytes()
        };
        let security_name = if cfg.security_name.is_empty() {
            hex::encode(random_bytes(10))
        } else {
            cfg.security_name
        };

        let codec = CookieCodec::new(security_name, &hash_key, &block_key, hash, max_lifetime)
            .map_err(|e| SessionError::InvalidProviderConfig(e.to_string()))?;
        self.codec = Some(Arc::new(codec));
        self.settings = Arc::new(CookieSettings {
            name: if cfg.cookie_name.is_empty() {
                DEFAULT_COOKIE_NAME.to_string()
            } else {
                cfg.cookie_name
            },
            secure: cfg.secure,
            max_age: cfg.maxage,
        });
        info!(
            cookie_name = %self.settings.name,
            hash = hash.as_str(),
            max_lifetime,
            "Cookie session provider initialised"
        );
        Ok(())
    }

    fn read(&self, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        self.load(sid)?
            .ok_or_else(|| SessionError::NotFound("<undecodable cookie>".to_string()))
    }

    fn exists(&self, sid: &str) -> bool {
        self.decode(sid)
            .is_some_and(|values| matches!(values.get(SID_KEY), Some(SessionValue::Str(_))))
    }

    fn load(&self, sid: &str) -> Result<Option<Arc<dyn SessionStore>>, SessionError> {
        let Some(mut values) = self.decode(sid) else {
            return Ok(None);
        };
        match values.remove(SID_KEY) {
            Some(SessionValue::Str(id)) => self.store(&id, values).map(Some),
            _ => {
                debug!("Session cookie carries no session id, ignoring it");
                Ok(None)
            }
        }
    }

    fn create(&self, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        self.store(sid, SessionValues::new())
    }

    fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        let mut values = self.decode(old_sid).unwrap_or_default();
        values.remove(SID_KEY);
        self.store(sid, values)
    }

    fn destroy(&self, _sid: &str) -> Result<(), SessionError> {
        Ok(())
    }

    fn gc(&self) {}

    fn count(&self) -> usize {
        0
    }
}
