//! # Runtime Configuration Module
//!
//! Environment variable based configuration for the request lifecycle, loaded once
//! when an [`App`](crate::app::App) is built.
//!
//! ## Environment Variables
//!
//! ### `BRRTC_PRODUCTION`
//!
//! `true`/`1` selects production mode: failed requests get a generic status page and
//! panics never expose their message or backtrace. Default: `false`.
//!
//! ### `BRRTC_POOL_MAX_IDLE`
//!
//! Upper bound on idle contexts kept per route. Contexts released while the free list
//! is full are dropped. Default: `1024`.
//!
//! ### `BRRTC_SESSION_GC`
//!
//! Whether building an app with a session manager starts the background GC thread.
//! Default: `true`.
//!
//! ## Usage
//!
//! ```rust
//! use brrtcontext::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Idle contexts per route: {}", config.pool_max_idle);
//! ```

use std::env;

/// Default for [`RuntimeConfig::pool_max_idle`].
pub const DEFAULT_POOL_MAX_IDLE: usize = 1024;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Render production status pages (default: false)
    pub production: bool,
    /// Idle contexts kept per route (default: 1024)
    pub pool_max_idle: usize,
    /// Start the session GC thread on app build (default: true)
    pub session_gc: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            production: false,
            pool_max_idle: DEFAULT_POOL_MAX_IDLE,
            session_gc: true,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        RuntimeConfig {
            production: env::var("BRRTC_PRODUCTION")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.production),
            pool_max_idle: env::var("BRRTC_POOL_MAX_IDLE")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.pool_max_idle),
            session_gc: env::var("BRRTC_SESSION_GC")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.session_gc),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_defaults() {
        let c = RuntimeConfig::default();
        assert!(!c.production);
        assert!(c.session_gc);
        assert_eq!(c.pool_max_idle, DEFAULT_POOL_MAX_IDLE);
    }
}
