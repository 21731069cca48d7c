use super::config::ManagerConfig;
use super::provider::{create_provider, Provider, SessionStore};
use crate::error::SessionError;
use crate::ids::{mint_session_id, random_bytes, HashFunc};
use crate::server::{Cookie, Request, ResponseWriter};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

struct IdSettings {
    hash: HashFunc,
    key: Vec<u8>,
}

/// Orchestrates session start, release, regeneration and GC for one provider.
///
/// Built once at startup from a provider name and a JSON config blob; construction
/// fails outright on any configuration problem. Shared across request threads behind
/// an `Arc`.
pub struct SessionManager {
    provider: Box<dyn Provider>,
    config: ManagerConfig,
    ids: RwLock<IdSettings>,
    secure: AtomicBool,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("cookie_name", &self.config.cookie_name)
            .field("gc_lifetime", &self.config.gc_lifetime)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Build a manager for the provider registered as `provider_name`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidConfig`] if `config_json` does not parse or names an
    ///   unsupported hash function
    /// - [`SessionError::UnknownProvider`] if no provider has that name
    /// - [`SessionError::InvalidProviderConfig`] if the provider rejects `providerConfig`
    pub fn new(provider_name: &str, config_json: &str) -> Result<Self, SessionError> {
        Self::with_config(provider_name, ManagerConfig::from_json(config_json)?)
    }

    pub fn with_config(provider_name: &str, mut config: ManagerConfig) -> Result<Self, SessionError> {
        let hash = HashFunc::parse(&config.session_id_hash_func).ok_or_else(|| {
            SessionError::InvalidConfig(format!(
                "unsupported sessionIDHashFunc {:?}",
                config.session_id_hash_func
            ))
        })?;
        let key = if config.session_id_hash_key.is_empty() {
            random_bytes(16)
        } else {
            config.session_id_hash_key.as_bytes().to_vec()
        };
        config.max_lifetime = config.effective_max_lifetime();

        let mut provider = create_provider(provider_name)?;
        provider.init(config.max_lifetime, &config.provider_config)?;

        info!(
            provider = %provider_name,
            cookie_name = %config.cookie_name,
            gc_lifetime = config.gc_lifetime,
            max_lifetime = config.max_lifetime,
            hash = hash.as_str(),
            "Session manager ready"
        );
        Ok(Self {
            provider,
            secure: AtomicBool::new(config.secure),
            config,
            ids: RwLock::new(IdSettings { hash, key }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// Start the session for one request.
    ///
    /// A cookie that names a live session loads it. Otherwise (no cookie, or one that
    /// fails to decode or has expired) a new id is minted, announced with `Set-Cookie`
    /// when enabled and recorded on `req` so later readers in the same request see it.
    pub fn session_start(
        &self,
        res: &mut ResponseWriter,
        req: &mut Request,
    ) -> Result<Arc<dyn SessionStore>, SessionError> {
        if let Some(sid) = self.request_sid(req) {
            if let Some(store) = self.provider.load(&sid)? {
                return Ok(store);
            }
            debug!(
                request_id = %req.request_id,
                "Session cookie rejected, minting a new session"
            );
        }

        let sid = self.mint(req);
        let store = self.provider.create(&sid)?;
        let cookie = self.cookie(&sid);
        if self.config.enable_set_cookie {
            res.set_cookie(&cookie);
        }
        req.add_cookie(&self.config.cookie_name, cookie.value);
        debug!(request_id = %req.request_id, session_id = %sid, "Session started");
        Ok(store)
    }

    /// Persist `store` into the response.
    pub fn session_release(
        &self,
        store: &dyn SessionStore,
        res: &mut ResponseWriter,
    ) -> Result<(), SessionError> {
        store.release(res)
    }

    /// Destroy the request's session and expire its cookie.
    pub fn session_destroy(&self, res: &mut ResponseWriter, req: &Request) -> Result<(), SessionError> {
        let Some(sid) = self.request_sid(req) else {
            return Ok(());
        };
        self.provider.destroy(&sid)?;
        let expired = Cookie {
            max_age: Some(0),
            ..self.cookie("")
        };
        if !res.set_cookie(&expired) {
            return Err(SessionError::HeadersAlreadyWritten(sid));
        }
        debug!(request_id = %req.request_id, "Session destroyed");
        Ok(())
    }

    /// Move the request's session to a freshly minted id and send the new cookie.
    pub fn session_regenerate_id(
        &self,
        res: &mut ResponseWriter,
        req: &mut Request,
    ) -> Result<Arc<dyn SessionStore>, SessionError> {
        let sid = self.mint(req);
        let store = match self.request_sid(req) {
            Some(old) => self.provider.regenerate(&old, &sid)?,
            None => self.provider.create(&sid)?,
        };
        let cookie = self.cookie(&sid);
        if !res.set_cookie(&cookie) {
            return Err(SessionError::HeadersAlreadyWritten(sid));
        }
        req.add_cookie(&self.config.cookie_name, cookie.value);
        debug!(request_id = %req.request_id, session_id = %sid, "Session id regenerated");
        Ok(store)
    }

    /// Load a session by id, bypassing the request cookie.
    ///
    /// With the cookie provider `sid` is a cookie value; one that fails to decode
    /// yields [`SessionError::NotFound`] rather than a session under that value.
    pub fn get_session_store(&self, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        self.provider.read(sid)
    }

    /// Number of live server-side sessions (always 0 for the cookie provider).
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.provider.count()
    }

    /// Run one GC pass on the provider.
    pub fn gc(&self) {
        self.provider.gc();
    }

    /// Start the recurring GC task on its own thread.
    ///
    /// Runs every `gclifetime` seconds until the returned handle is stopped or the
    /// manager is dropped. A `gclifetime` of 0 starts nothing.
    pub fn start_gc(self: &Arc<Self>) -> GcHandle {
        Self::start_gc_every(self, Duration::from_secs(self.config.gc_lifetime))
    }

    /// [`start_gc`](Self::start_gc) with an explicit interval.
    pub fn start_gc_every(self: &Arc<Self>, interval: Duration) -> GcHandle {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        if interval.is_zero() {
            return GcHandle { stop, thread: None };
        }

        let manager: Weak<Self> = Arc::downgrade(self);
        let signal = Arc::clone(&stop);
        let spawned = std::thread::Builder::new()
            .name("brrtcontext-session-gc".into())
            .spawn(move || {
                let (lock, cvar) = &*signal;
                loop {
                    {
                        let mut stopped = lock.lock();
                        if !*stopped {
                            cvar.wait_for(&mut stopped, interval);
                        }
                        if *stopped {
                            break;
                        }
                    }
                    let Some(manager) = manager.upgrade() else {
                        break;
                    };
                    manager.gc();
                    debug!(active = manager.active_sessions(), "Session GC pass complete");
                }
            });

        match spawned {
            Ok(thread) => {
                info!(interval_secs = interval.as_secs(), "Session GC started");
                GcHandle {
                    stop,
                    thread: Some(thread),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to spawn session GC thread");
                GcHandle { stop, thread: None }
            }
        }
    }

    /// Change the session id hash function and key. An empty key draws a random one.
    pub fn set_hash_func(&self, func: &str, key: &str) -> Result<(), SessionError> {
        let hash = HashFunc::parse(func)
            .ok_or_else(|| SessionError::InvalidConfig(format!("unsupported hash func {func:?}")))?;
        let key = if key.is_empty() {
            random_bytes(16)
        } else {
            key.as_bytes().to_vec()
        };
        *self.ids.write() = IdSettings { hash, key };
        Ok(())
    }

    pub fn set_secure(&self, secure: bool) {
        self.secure.store(secure, Ordering::Relaxed);
    }

    fn request_sid(&self, req: &Request) -> Option<String> {
        let raw = req.get_cookie(&self.config.cookie_name)?;
        if raw.is_empty() {
            return None;
        }
        urlencoding::decode(raw).ok().map(|s| s.into_owned())
    }

    fn mint(&self, req: &Request) -> String {
        let ids = self.ids.read();
        mint_session_id(ids.hash, &ids.key, &req.remote_addr)
    }

    fn cookie(&self, sid: &str) -> Cookie {
        let max_age = self.config.cookie_lifetime;
        Cookie {
            path: Some("/".into()),
            domain: (!self.config.domain.is_empty()).then(|| self.config.domain.clone()),
            max_age: (max_age > 0).then_some(max_age),
            http_only: true,
            secure: self.secure.load(Ordering::Relaxed),
            ..Cookie::new(
                self.config.cookie_name.as_str(),
                urlencoding::encode(sid).into_owned(),
            )
        }
    }
}

/// Handle to the background GC thread started by [`SessionManager::start_gc`].
///
/// Dropping the handle stops the thread.
#[derive(Debug)]
pub struct GcHandle {
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl GcHandle {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the GC thread and wait for it to exit.
    pub fn stop(&mut self) {
        let (lock, cvar) = &*self.stop;
        *lock.lock() = true;
        cvar.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Session GC thread panicked");
            }
        }
    }
}

impl Drop for GcHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
