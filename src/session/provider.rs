use super::value::{SessionValue, SessionValues};
use crate::error::{CodecError, SessionError};
use crate::server::ResponseWriter;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// One session's key/value state, as seen by handlers during a request.
///
/// Stores are shared behind `Arc` and use interior locking, so every method takes
/// `&self`.
pub trait SessionStore: Send + Sync {
    /// Set a value, replacing any previous one.
    fn set(&self, key: &str, value: SessionValue);
    /// Clone of the value under `key`.
    fn get(&self, key: &str) -> Option<SessionValue>;
    /// Remove and return the value under `key`.
    fn delete(&self, key: &str) -> Option<SessionValue>;
    /// Remove every value.
    fn flush(&self);
    /// Opaque session identifier.
    fn session_id(&self) -> &str;
    /// Snapshot of all values.
    fn values(&self) -> SessionValues;
    /// Persist the session at the end of a request.
    ///
    /// Cookie-backed stores encode themselves into a `Set-Cookie` header here, so this
    /// must run before the response headers are written.
    fn release(&self, res: &mut ResponseWriter) -> Result<(), SessionError>;
}

/// Typed helpers over [`SessionStore`] for arbitrary `serde` types.
///
/// Values are bincode-encoded into [`SessionValue::Bytes`].
pub trait SessionStoreExt: SessionStore {
    fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CodecError> {
        let bytes =
            bincode::serialize(value).map_err(|e| CodecError::SerializeFailed(e.to_string()))?;
        self.set(key, SessionValue::Bytes(bytes));
        Ok(())
    }

    /// `Ok(None)` when the key is absent.
    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CodecError> {
        match self.get(key) {
            None => Ok(None),
            Some(SessionValue::Bytes(bytes)) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|_| CodecError::DeserializeFailed),
            Some(_) => Err(CodecError::DeserializeFailed),
        }
    }
}

impl<S: SessionStore + ?Sized> SessionStoreExt for S {}

/// Session storage backend.
///
/// A provider is created from the global registry by name, initialised once by the
/// [`SessionManager`](super::SessionManager) and then shared by all request threads.
pub trait Provider: Send + Sync {
    /// Configure the provider. `config` is the opaque `providerConfig` string.
    fn init(&mut self, max_lifetime: u64, config: &str) -> Result<(), SessionError>;
    /// Load the session for `sid`. Backends that create sessions lazily return an
    /// empty one under that id; the cookie backend fails with `NotFound` instead.
    fn read(&self, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError>;
    /// Whether `sid` refers to a live session.
    fn exists(&self, sid: &str) -> bool;
    /// Load the live session named by `sid`, checking and reading in one step.
    fn load(&self, sid: &str) -> Result<Option<Arc<dyn SessionStore>>, SessionError> {
        if self.exists(sid) {
            self.read(sid).map(Some)
        } else {
            Ok(None)
        }
    }
    /// Start an empty session under a freshly minted `sid`.
    fn create(&self, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        self.read(sid)
    }
    /// Move the session at `old_sid` to `sid`.
    fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError>;
    fn destroy(&self, sid: &str) -> Result<(), SessionError>;
    /// Evict expired sessions. May run concurrently with `read`.
    fn gc(&self);
    /// Number of live server-side sessions.
    fn count(&self) -> usize;
}

/// Constructor stored in the provider registry.
pub type ProviderFactory = fn() -> Box<dyn Provider>;

fn cookie_provider() -> Box<dyn Provider> {
    Box::new(super::cookie::CookieProvider::new())
}

fn memory_provider() -> Box<dyn Provider> {
    Box::new(super::memory::MemoryProvider::new())
}

static PROVIDERS: Lazy<RwLock<HashMap<String, ProviderFactory>>> = Lazy::new(|| {
    let mut builtins: HashMap<String, ProviderFactory> = HashMap::new();
    builtins.insert("cookie".into(), cookie_provider);
    builtins.insert("memory".into(), memory_provider);
    RwLock::new(builtins)
});

/// Register a session provider under `name`.
///
/// Registration belongs in process startup, before managers are built.
///
/// # Panics
///
/// Panics if `name` is already registered (including the builtin `cookie` and
/// `memory` providers).
#[allow(clippy::panic)]
pub fn register_provider(name: &str, factory: ProviderFactory) {
    let mut providers = PROVIDERS.write();
    if providers.contains_key(name) {
        panic!("session: register called twice for provider {name}");
    }
    providers.insert(name.to_string(), factory);
    info!(provider = %name, "Session provider registered");
}

/// Create a fresh, uninitialised provider instance.
pub fn create_provider(name: &str) -> Result<Box<dyn Provider>, SessionError> {
    let factory = PROVIDERS
        .read()
        .get(name)
        .copied()
        .ok_or_else(|| SessionError::UnknownProvider(name.to_string()))?;
    Ok(factory())
}

/// Names of all registered providers, sorted.
#[must_use]
pub fn provider_names() -> Vec<String> {
    let mut names: Vec<String> = PROVIDERS.read().keys().cloned().collect();
    names.sort();
    names
}
