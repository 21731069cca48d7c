use super::errors::{ErrorList, ErrorRecord, ErrorType};
use crate::app::{App, Mode};
use crate::error::{ContextError, RegistryError, SessionError};
use crate::functions::{builtins, Arg, CallOutput};
use crate::server::{Cookie, Request, ResponseWriter};
use crate::session::SessionStore;
use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// A handler in a route's chain.
pub type HandlerFn = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Wrap a closure as a [`HandlerFn`].
pub fn handler<F>(f: F) -> HandlerFn
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Cursor value after [`Context::abort`]. Larger than any real chain.
pub const ABORT_INDEX: i32 = i32::MAX / 2;

type Deferred = Box<dyn FnOnce(&mut Context) + Send>;
type DataMap = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Per-request state carried through a handler chain.
///
/// Contexts are pooled per route (see [`ContextPool`](super::ContextPool)). Every
/// field below is cleared by [`reset`](Context::reset) before a context is reused.
pub struct Context {
    /// The inbound request
    pub request: Request,
    /// The response being built
    pub response: ResponseWriter,
    index: i32,
    handlers: Vec<HandlerFn>,
    data: Option<DataMap>,
    errors: ErrorList,
    session: Option<Arc<dyn SessionStore>>,
    session_released: bool,
    deferred: Vec<Deferred>,
    route: Arc<str>,
    app: Arc<App>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("route", &self.route)
            .field("request_id", &self.request.request_id)
            .field("index", &self.index)
            .field("handlers", &self.handlers.len())
            .field("errors", &self.errors.len())
            .field("has_session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create an empty context bound to `app`.
    #[must_use]
    pub fn new(app: Arc<App>) -> Self {
        Self {
            request: Request::default(),
            response: ResponseWriter::new(),
            index: -1,
            handlers: Vec::new(),
            data: None,
            errors: ErrorList::default(),
            session: None,
            session_released: false,
            deferred: Vec::new(),
            route: Arc::from(""),
            app,
        }
    }

    /// Load a request and a handler chain into a fresh or reset context.
    pub fn begin(&mut self, route: &Arc<str>, request: Request, chain: &[HandlerFn]) {
        self.route = Arc::clone(route);
        self.request = request;
        self.handlers.clear();
        self.handlers.extend(chain.iter().cloned());
        self.index = -1;
    }

    /// Clear all per-request state.
    pub fn reset(&mut self) {
        self.request = Request::default();
        self.response.reset();
        self.index = -1;
        self.handlers.clear();
        self.data = None;
        self.errors.clear();
        self.session = None;
        self.session_released = false;
        self.deferred.clear();
        self.route = Arc::from("");
    }

    // ---------------------------------------------------------------------
    // Chain execution
    // ---------------------------------------------------------------------

    /// Run the remaining handlers in order.
    ///
    /// Called by the route to start the chain, and by a handler to run the rest of the
    /// chain before continuing with its own "after" code. Handlers appended with
    /// [`push_handler`](Self::push_handler) during the pass are run too.
    pub fn next(&mut self) {
        self.index = self.index.saturating_add(1);
        while let Some(h) = self.current_handler() {
            h(self);
            self.index = self.index.saturating_add(1);
        }
    }

    fn current_handler(&self) -> Option<HandlerFn> {
        usize::try_from(self.index)
            .ok()
            .and_then(|i| self.handlers.get(i))
            .cloned()
    }

    /// Stop the chain. No handler after the current one is started. A handler that
    /// called [`next`](Self::next) still runs its remaining code once `next` returns
    /// and can check [`is_aborted`](Self::is_aborted). `code` becomes the response
    /// status unless headers were already written; pass 0 to leave the status alone.
    pub fn abort(&mut self, code: u16) {
        if code != 0 && !self.response.written() {
            self.response.write_header(code);
        }
        debug!(
            request_id = %self.request.request_id,
            route = %self.route,
            handler_index = self.index,
            status = self.response.status(),
            "Handler chain aborted"
        );
        self.index = ABORT_INDEX;
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.index >= ABORT_INDEX
    }

    /// Current cursor position: -1 before dispatch, [`ABORT_INDEX`] after abort.
    #[must_use]
    pub fn index(&self) -> i32 {
        self.index
    }

    /// Append a handler to this request's chain only.
    pub fn push_handler(&mut self, h: HandlerFn) {
        self.handlers.push(h);
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Set the response status without stopping the chain.
    pub fn status(&mut self, code: u16) {
        self.response.write_header(code);
    }

    /// Set headers and status, then commit them.
    pub fn write_header(&mut self, code: u16, headers: &[(&str, &str)]) {
        for (name, value) in headers {
            self.response.set_header(name, *value);
        }
        self.response.write_header(code);
        self.response.write_header_now();
    }

    // ---------------------------------------------------------------------
    // Key/value store
    // ---------------------------------------------------------------------

    /// Store a value for later handlers in this request.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), Arc::new(value));
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Any + Send + Sync>, ContextError> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .cloned()
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))
    }

    /// Typed [`get`](Self::get).
    pub fn get_as<T: Any>(&self, key: &str) -> Result<&T, ContextError> {
        let value = self
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .ok_or_else(|| ContextError::KeyNotFound(key.to_string()))?;
        (**value)
            .downcast_ref::<T>()
            .ok_or_else(|| ContextError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// [`get`](Self::get) for keys that a handler earlier in the chain must have set.
    ///
    /// # Panics
    ///
    /// Panics if `key` is absent.
    #[allow(clippy::panic)]
    #[must_use]
    pub fn must_get(&self, key: &str) -> Arc<dyn Any + Send + Sync> {
        match self.get(key) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data.as_ref().is_some_and(|d| d.contains_key(key))
    }

    /// Keys currently set, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.data
            .as_ref()
            .map(|d| d.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Detached snapshot that may outlive the request, e.g. for a background task.
    ///
    /// The copy shares stored values and the session handle but has no handlers and
    /// no deferred hooks, and cannot release the session.
    #[must_use]
    pub fn copy(&self) -> Context {
        Context {
            request: self.request.clone(),
            response: self.response.clone(),
            index: -1,
            handlers: Vec::new(),
            data: self.data.clone(),
            errors: self.errors.clone(),
            session: self.session.clone(),
            session_released: true,
            deferred: Vec::new(),
            route: Arc::clone(&self.route),
            app: Arc::clone(&self.app),
        }
    }

    // ---------------------------------------------------------------------
    // Deferred hooks
    // ---------------------------------------------------------------------

    /// Run `f` after the chain has finished, in registration order.
    pub fn defer<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        self.deferred.push(Box::new(f));
    }

    /// Run and drain the deferred hooks. Hooks deferred by a hook run afterwards.
    pub fn run_deferred(&mut self) {
        while !self.deferred.is_empty() {
            let batch = std::mem::take(&mut self.deferred);
            for hook in batch {
                hook(self);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Errors
    // ---------------------------------------------------------------------

    /// Record an external (client-visible) error. Does not abort.
    pub fn error(&mut self, err: impl Display, meta: Option<serde_json::Value>) {
        self.error_typed(err, ErrorType::EXTERNAL, meta);
    }

    pub fn error_typed(&mut self, err: impl Display, kind: ErrorType, meta: Option<serde_json::Value>) {
        let message = err.to_string();
        debug!(
            request_id = %self.request.request_id,
            route = %self.route,
            error = %message,
            internal = kind.intersects(ErrorType::INTERNAL),
            "Handler error recorded"
        );
        self.errors.push(ErrorRecord {
            message,
            kind,
            meta,
        });
    }

    /// Record `err` and abort with `code`.
    pub fn fail(&mut self, code: u16, err: impl Display) {
        self.error(err, Some(serde_json::Value::from("Operation aborted")));
        self.abort(code);
    }

    #[must_use]
    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    /// Message of the most recent error.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(|e| e.message.as_str())
    }

    // ---------------------------------------------------------------------
    // Extension functions
    // ---------------------------------------------------------------------

    /// Call a registered extension function.
    pub fn call(&mut self, name: &str, args: Vec<Arg>) -> Result<CallOutput, RegistryError> {
        let registry = Arc::clone(self.app.functions());
        registry.call(self, name, args)
    }

    pub fn redirect(&mut self, code: u16, location: &str) -> anyhow::Result<()> {
        builtins::redirect(self, code, location)
    }

    pub fn serve_data(&mut self, code: u16, data: &[u8]) -> anyhow::Result<()> {
        builtins::serve_data(self, code, data)
    }

    pub fn flash(&mut self, category: &str, message: &str) -> anyhow::Result<()> {
        builtins::flash(self, category, message)
    }

    pub fn flash_messages(&mut self, categories: &[String]) -> anyhow::Result<Vec<String>> {
        builtins::flash_messages(self, categories)
    }

    pub fn all_flash_messages(&mut self) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        builtins::all_flash_messages(self)
    }

    /// Add a `Set-Cookie` header for `cookie`.
    pub fn cookie(&mut self, cookie: Cookie) -> anyhow::Result<()> {
        builtins::set_cookie(self, false, cookie)
    }

    /// Add a `Set-Cookie` header whose value is signed with the app secret key.
    /// [`read_cookies`](Self::read_cookies) returns the unsigned value.
    pub fn secure_cookie(&mut self, cookie: Cookie) -> anyhow::Result<()> {
        builtins::set_cookie(self, true, cookie)
    }

    #[must_use]
    pub fn cookies(&self) -> BTreeMap<String, String> {
        builtins::cookies(self)
    }

    #[must_use]
    pub fn read_cookies(&self) -> BTreeMap<String, String> {
        builtins::read_cookies(self)
    }

    // ---------------------------------------------------------------------
    // Session
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn session(&self) -> Option<&Arc<dyn SessionStore>> {
        self.session.as_ref()
    }

    pub(crate) fn attach_session(&mut self, store: Arc<dyn SessionStore>) {
        self.session = Some(store);
        self.session_released = false;
    }

    #[must_use]
    pub fn session_released(&self) -> bool {
        self.session_released
    }

    /// Persist the session into the response.
    ///
    /// Must happen before the response headers are written, and at most once per
    /// request. A second call fails with [`SessionError::AlreadyReleased`]. Without an
    /// active session this does nothing.
    pub fn release_session(&mut self) -> Result<(), SessionError> {
        let Some(session) = self.session.clone() else {
            return Ok(());
        };
        if self.session_released {
            return Err(SessionError::AlreadyReleased(session.session_id().to_string()));
        }
        session.release(&mut self.response)?;
        self.session_released = true;
        debug!(
            request_id = %self.request.request_id,
            session_id = %session.session_id(),
            "Session released"
        );
        Ok(())
    }

    /// Move the session to a new id, keeping the values set so far in this request.
    pub fn session_regenerate_id(&mut self) -> Result<(), SessionError> {
        let manager = self.sessions_enabled()?;
        let store = manager.session_regenerate_id(&mut self.response, &mut self.request)?;
        if let Some(previous) = self.session.take() {
            store.flush();
            for (key, value) in previous.values() {
                store.set(&key, value);
            }
        }
        self.attach_session(store);
        Ok(())
    }

    /// Destroy the session and expire its cookie. Nothing is released afterwards.
    pub fn session_destroy(&mut self) -> Result<(), SessionError> {
        let manager = self.sessions_enabled()?;
        manager.session_destroy(&mut self.response, &self.request)?;
        self.session = None;
        Ok(())
    }

    fn sessions_enabled(&self) -> Result<Arc<crate::session::SessionManager>, SessionError> {
        self.app
            .sessions()
            .cloned()
            .ok_or_else(|| SessionError::InvalidConfig("sessions are not enabled for this app".into()))
    }

    // ---------------------------------------------------------------------
    // Environment
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.app.mode()
    }

    /// Name of the route serving this request.
    #[must_use]
    pub fn route_name(&self) -> &str {
        &self.route
    }
}
