//! # Application and Routes
//!
//! An [`App`] holds what every request shares: the extension function registry, the
//! optional session manager, the rendering mode and the runtime configuration. A
//! [`Route`] binds a handler chain to its own [`ContextPool`] and drives one request
//! through the full lifecycle:
//!
//! 1. acquire a context and load the request, chain and path parameters
//! 2. start the session (when the app has a session manager)
//! 3. run the chain, recovering from handler panics
//! 4. run deferred hooks
//! 5. release the session if no handler did
//! 6. render a status or panic page for an empty error response
//! 7. reset the context and return it to the pool
//!
//! ## Example
//!
//! ```rust
//! use brrtcontext::app::App;
//! use brrtcontext::context::{handler, Context};
//! use brrtcontext::server::Request;
//! use http::Method;
//!
//! let app = App::builder().build();
//! let route = app.route(
//!     "hello",
//!     vec![handler(|ctx: &mut Context| {
//!         ctx.response.write(b"hello");
//!     })],
//! );
//! let res = route.serve(Request::new(Method::GET, "/hello"));
//! assert_eq!(res.status(), 200);
//! assert_eq!(res.body(), b"hello");
//! ```

use crate::context::{Context, ContextPool, ErrorType, HandlerFn};
use crate::exceptions::{self, PanicReport, HTML_CONTENT_TYPE};
use crate::functions::FunctionRegistry;
use crate::runtime_config::RuntimeConfig;
use crate::server::{Request, ResponseWriter};
use crate::session::{GcHandle, SessionManager};
use parking_lot::Mutex;
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Fallback source of the key that signs secure cookies.
pub const SECRET_KEY_ENV: &str = "BRRTC_SECRET_KEY";

/// Rendering mode for error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mode {
    /// Hide panic details and error lists from clients
    pub production: bool,
}

impl Mode {
    pub const DEVELOPMENT: Mode = Mode { production: false };
    pub const PRODUCTION: Mode = Mode { production: true };
}

/// State shared by every route and request of one application.
pub struct App {
    mode: Mode,
    sessions: Option<Arc<SessionManager>>,
    functions: Arc<FunctionRegistry>,
    config: RuntimeConfig,
    secret_key: Option<Arc<[u8]>>,
    gc: Mutex<Option<GcHandle>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("mode", &self.mode)
            .field("sessions", &self.sessions.is_some())
            .field("functions", &self.functions.names().len())
            .field("config", &self.config)
            .field("secret_key", &self.secret_key.is_some())
            .finish_non_exhaustive()
    }
}

impl App {
    #[must_use]
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn sessions(&self) -> Option<&Arc<SessionManager>> {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn functions(&self) -> &Arc<FunctionRegistry> {
        &self.functions
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Key used to sign and verify secure cookies.
    #[must_use]
    pub fn secret_key(&self) -> Option<&[u8]> {
        self.secret_key.as_deref()
    }

    /// Whether the background session GC thread is running.
    #[must_use]
    pub fn gc_running(&self) -> bool {
        self.gc.lock().as_ref().is_some_and(GcHandle::is_running)
    }

    /// Stop the background session GC thread, if any.
    pub fn stop_gc(&self) {
        if let Some(mut handle) = self.gc.lock().take() {
            handle.stop();
        }
    }

    /// Bind `chain` to a new route with its own context pool.
    #[must_use]
    pub fn route(self: &Arc<Self>, name: &str, chain: Vec<HandlerFn>) -> Route {
        debug!(route = %name, handlers = chain.len(), "Route registered");
        Route {
            name: Arc::from(name),
            chain: Arc::from(chain),
            pool: ContextPool::new(Arc::clone(self), self.config.pool_max_idle),
        }
    }
}

/// Builder for [`App`].
#[derive(Default)]
pub struct AppBuilder {
    config: Option<RuntimeConfig>,
    mode: Option<Mode>,
    sessions: Option<SessionManager>,
    functions: Option<FunctionRegistry>,
    secret_key: Option<Vec<u8>>,
}

impl AppBuilder {
    /// Runtime configuration. Defaults to [`RuntimeConfig::from_env`].
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Rendering mode. Defaults to the `production` flag of the runtime configuration.
    #[must_use]
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Enable sessions for every route of the app.
    #[must_use]
    pub fn sessions(mut self, manager: SessionManager) -> Self {
        self.sessions = Some(manager);
        self
    }

    /// Extension function registry. Defaults to [`FunctionRegistry::with_builtins`].
    #[must_use]
    pub fn functions(mut self, registry: FunctionRegistry) -> Self {
        self.functions = Some(registry);
        self
    }

    /// Key for secure cookies. Defaults to the `BRRTC_SECRET_KEY` environment variable.
    #[must_use]
    pub fn secret_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.secret_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<App> {
        let config = self.config.unwrap_or_else(RuntimeConfig::from_env);
        let mode = self.mode.unwrap_or(Mode {
            production: config.production,
        });
        let sessions = self.sessions.map(Arc::new);
        let gc = match &sessions {
            Some(manager) if config.session_gc => Some(manager.start_gc()),
            _ => None,
        };
        let secret_key = self
            .secret_key
            .or_else(|| std::env::var(SECRET_KEY_ENV).ok().map(String::into_bytes))
            .filter(|key| !key.is_empty())
            .map(Arc::from);
        let app = App {
            mode,
            sessions,
            functions: Arc::new(self.functions.unwrap_or_else(FunctionRegistry::with_builtins)),
            config,
            secret_key,
            gc: Mutex::new(gc),
        };
        info!(
            production = mode.production,
            sessions = app.sessions.is_some(),
            pool_max_idle = config.pool_max_idle,
            "App built"
        );
        Arc::new(app)
    }
}

/// A handler chain with its own context pool.
pub struct Route {
    name: Arc<str>,
    chain: Arc<[HandlerFn]>,
    pool: ContextPool,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.name)
            .field("handlers", &self.chain.len())
            .field("pool", &self.pool)
            .finish()
    }
}

impl Route {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Serve a request with no path parameters.
    pub fn serve(&self, request: Request) -> ResponseWriter {
        self.serve_with_params(request, &[])
    }

    /// Serve a request. Path parameters are readable as `String`s from the context
    /// store under their names.
    pub fn serve_with_params(&self, request: Request, params: &[(&str, &str)]) -> ResponseWriter {
        let start = Instant::now();
        let mut ctx = self.pool.acquire();
        ctx.begin(&self.name, request, &self.chain);
        for (name, value) in params {
            ctx.set(*name, (*value).to_string());
        }

        if let Some(manager) = ctx.app().sessions().cloned() {
            match manager.session_start(&mut ctx.response, &mut ctx.request) {
                Ok(store) => ctx.attach_session(store),
                Err(e) => {
                    warn!(
                        request_id = %ctx.request.request_id,
                        route = %self.name,
                        error = %e,
                        "Session start failed"
                    );
                    ctx.error_typed(e, ErrorType::INTERNAL, None);
                }
            }
        }

        let mut panic = run_guarded(&mut ctx, "handler chain", Context::next);
        if let Some(report) = run_guarded(&mut ctx, "deferred hook", Context::run_deferred) {
            panic.get_or_insert(report);
        }

        if ctx.session().is_some() && !ctx.session_released() {
            if let Err(e) = ctx.release_session() {
                warn!(
                    request_id = %ctx.request.request_id,
                    route = %self.name,
                    error = %e,
                    "Session release failed"
                );
            }
        }

        render_error_page(&mut ctx, panic.as_ref());
        ctx.response.write_header_now();
        let response = std::mem::take(&mut ctx.response);

        debug!(
            request_id = %ctx.request.request_id,
            route = %self.name,
            status = response.status(),
            aborted = ctx.is_aborted(),
            errors = ctx.errors().len(),
            latency_us = start.elapsed().as_micros() as u64,
            "Request complete"
        );
        self.pool.release(ctx);
        response
    }
}

/// Run `f`, turning a panic into an internal error, a 500 abort and a report.
fn run_guarded(ctx: &mut Context, stage: &str, f: fn(&mut Context)) -> Option<PanicReport> {
    let panic = catch_unwind(AssertUnwindSafe(|| f(ctx))).err()?;
    let message = exceptions::panic_message(panic.as_ref());
    let backtrace = Backtrace::capture();

    error!(
        request_id = %ctx.request.request_id,
        route = %ctx.route_name(),
        stage = stage,
        panic_message = %message,
        backtrace = %backtrace,
        "Handler panicked - CRITICAL"
    );

    ctx.error_typed(&message, ErrorType::INTERNAL, None);
    ctx.abort(500);
    Some(PanicReport {
        message,
        backtrace: backtrace.to_string(),
    })
}

fn render_error_page(ctx: &mut Context, panic: Option<&PanicReport>) {
    if ctx.response.written() || !ctx.response.body().is_empty() {
        return;
    }
    let production = ctx.mode().production;
    let page = match panic {
        Some(report) if !production => exceptions::panic_page(report, ctx.errors()),
        Some(_) => exceptions::status_page(500),
        None if ctx.response.status() >= 400 => {
            let mut page = exceptions::status_page(ctx.response.status());
            if !production && !ctx.errors().is_empty() {
                let errors = exceptions::escape_html(&ctx.errors().to_string());
                page.push_str(&format!("<pre>{errors}</pre>\n"));
            }
            page
        }
        None => return,
    };
    ctx.response.set_header("content-type", HTML_CONTENT_TYPE);
    ctx.response.write(page.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::handler;

    #[test]
    fn test_mode_follows_config() {
        let app = App::builder()
            .config(RuntimeConfig {
                production: true,
                ..RuntimeConfig::default()
            })
            .build();
        assert_eq!(app.mode(), Mode::PRODUCTION);
        let app = App::builder().mode(Mode::DEVELOPMENT).build();
        assert!(!app.mode().production);
    }

    #[test]
    fn test_builtins_registered_by_default() {
        let app = App::builder().build();
        assert!(app.functions().contains("redirect"));
        assert!(app.sessions().is_none());
        assert!(!app.gc_running());
    }

    #[test]
    fn test_params_in_store() {
        let app = App::builder().build();
        let route = app.route(
            "user",
            vec![handler(|ctx: &mut Context| {
                let id = ctx.get_as::<String>("id").cloned().unwrap_or_default();
                ctx.response.write(id.as_bytes());
            })],
        );
        let res = route.serve_with_params(Request::default(), &[("id", "42")]);
        assert_eq!(res.body(), b"42");
    }
}
