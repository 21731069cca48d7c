//! # Session Module
//!
//! Provider-abstracted sessions with an encrypted, signed, expiring cookie as the
//! reference backend.
//!
//! ## Overview
//!
//! - [`SessionManager`] owns one [`Provider`] and runs the per-request lifecycle:
//!   `session_start` when a context is acquired, `release` on the store before the
//!   response headers are written, plus id regeneration, destroy and periodic GC.
//! - [`Provider`] implementations are looked up by name in a process-wide registry
//!   ([`register_provider`]). Two are built in:
//!   - `cookie` ([`CookieProvider`]): no server-side state at all. The session values
//!     and id are serialized into the cookie by [`CookieCodec`] on release and
//!     reconstructed from it on the next request.
//!   - `memory` ([`MemoryProvider`]): a concurrent in-process table with last-access
//!     expiry, safe to GC while requests read and write sessions.
//! - [`SessionStore`] is the handle handlers use during a request.
//!
//! ## Request Lifecycle
//!
//! ```text
//! NoSession --session_start--> Active --release--> Written
//! ```
//!
//! A cookie that is missing, forged, expired or otherwise undecodable is not an error:
//! the manager mints a fresh session id and carries on. Configuration problems on the
//! other hand are fatal to [`SessionManager::new`].
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use brrtcontext::session::SessionManager;
//!
//! let provider_config = r#"{"securityKey":"sign-me","blockKey":"0123456789abcdef","cookieName":"sid"}"#;
//! let config = serde_json::json!({
//!     "cookieName": "sid",
//!     "gclifetime": 3600,
//!     "providerConfig": provider_config,
//! });
//! let manager = SessionManager::new("cookie", &config.to_string())?;
//! # Ok::<(), brrtcontext::error::SessionError>(())
//! ```
//!
//! With the `cookie` provider the manager's `cookieName` and the provider's
//! `cookieName` must agree: the manager reads the session cookie by its own name and
//! hands the value to the provider to decode. Both default to
//! [`DEFAULT_COOKIE_NAME`].
//!
//! ## Cookie Wire Format
//!
//! ```text
//! Set-Cookie: <name>=<url-escaped base64 blob>; Path=/; [Max-Age=<n>; ]HttpOnly[; Secure]
//! ```
//!
//! See [`CookieCodec`] for the structure of the blob.

mod codec;
mod config;
mod cookie;
mod manager;
mod memory;
mod provider;
mod value;

pub use codec::{CookieCodec, IV_LEN};
pub use config::{CookieConfig, ManagerConfig, DEFAULT_COOKIE_NAME, DEFAULT_GC_LIFETIME};
pub use cookie::{CookieProvider, CookieStore, SID_KEY};
pub use manager::{GcHandle, SessionManager};
pub use memory::{MemoryProvider, MemoryStore};
pub use provider::{
    create_provider, provider_names, register_provider, Provider, ProviderFactory, SessionStore,
    SessionStoreExt,
};
pub use value::{SessionValue, SessionValues};
