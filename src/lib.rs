//! # brrtcontext
//!
//! **brrtcontext** is the per-request layer of a BRRTRouter service: pooled request
//! contexts, a deterministic and abortable handler chain, a registry of shared
//! extension functions and a session store whose reference backend keeps all state in
//! an encrypted, signed and expiring cookie.
//!
//! ## Overview
//!
//! The HTTP layer that owns the socket builds a [`server::Request`] and hands it to a
//! [`app::Route`]. The route takes a [`context::Context`] from its pool, starts the
//! session, runs the handler chain, releases the session and returns a
//! [`server::ResponseWriter`]. Nothing in this crate opens sockets or matches paths.
//!
//! ## Architecture
//!
//! - **[`app`]** - `App` (shared registry, session manager, mode) and `Route` (one
//!   context pool per handler chain)
//! - **[`context`]** - `Context`, the chain cursor, the key/value store, error list and
//!   the context pool
//! - **[`functions`]** - extension function registry and the builtin `redirect`,
//!   `serve_data` and flash message functions
//! - **[`session`]** - secure cookie codec, provider trait and registry, cookie and
//!   memory providers, session manager with background GC
//! - **[`middleware`]** - before/after middleware adapted into chain handlers, metrics
//!   and tracing middleware
//! - **[`server`]** - request and response carriers, `Set-Cookie` formatting
//! - **[`exceptions`]** - status and panic pages
//! - **[`logging`]** / **[`runtime_config`]** - environment driven setup
//!
//! ### Request Lifecycle
//!
//! ```mermaid
//! sequenceDiagram
//!     participant HTTP as HTTP layer
//!     participant Route
//!     participant Pool as ContextPool
//!     participant Mgr as SessionManager
//!     participant Chain as Handlers
//!
//!     HTTP->>Route: serve(request)
//!     Route->>Pool: acquire()
//!     Route->>Mgr: session_start(res, req)
//!     Mgr-->>Route: Arc<dyn SessionStore>
//!     Route->>Chain: ctx.next()
//!     Chain-->>Route: done / aborted / panicked
//!     Route->>Route: run_deferred()
//!     Route->>Mgr: release session (Set-Cookie)
//!     Route->>Pool: release(ctx) (reset)
//!     Route-->>HTTP: ResponseWriter
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use brrtcontext::app::App;
//! use brrtcontext::context::{handler, Context};
//! use brrtcontext::server::Request;
//! use brrtcontext::session::{SessionManager, SessionValue, DEFAULT_COOKIE_NAME};
//!
//! let sessions = SessionManager::new("cookie", "").unwrap();
//! let app = App::builder().sessions(sessions).build();
//!
//! let route = app.route(
//!     "visit",
//!     vec![handler(|ctx: &mut Context| {
//!         if let Some(session) = ctx.session() {
//!             let visits = session.get("visits").and_then(|v| v.as_i64()).unwrap_or(0);
//!             session.set("visits", SessionValue::Int(visits + 1));
//!         }
//!         ctx.status(204);
//!     })],
//! );
//!
//! let res = route.serve(Request::default());
//! assert!(res.cookie(DEFAULT_COOKIE_NAME).is_some());
//! ```
//!
//! ## Invariants
//!
//! - A pooled context never exposes state from an earlier request.
//! - Handlers run in registration order; after `abort` no later handler runs.
//! - A session is released at most once per request and always before the response
//!   headers are committed by the route.
//! - A cookie that fails any codec check is treated as absent and a fresh session is
//!   minted; it is never partially trusted.

pub mod app;
pub mod context;
pub mod error;
pub mod exceptions;
pub mod functions;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod runtime_config;
pub mod server;
pub mod session;

pub use app::{App, Mode, Route};
pub use context::{Context, ContextPool, HandlerFn};
pub use error::{CodecError, ContextError, RegistryError, SessionError};
pub use functions::{ExtensionFn, FunctionRegistry};
pub use session::{SessionManager, SessionStore, SessionValue};
