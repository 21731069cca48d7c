//! Error taxonomy shared by the context, registry and session subsystems.
//!
//! Errors fall into four groups:
//!
//! - **Configuration** ([`SessionError::UnknownProvider`],
//!   [`SessionError::InvalidProviderConfig`], [`SessionError::InvalidConfig`]) are
//!   fatal when building a [`SessionManager`](crate::session::SessionManager).
//! - **Per-request session** errors ([`CodecError`]) are recovered locally: a
//!   cookie that fails to decode is treated as "no session" and a fresh one is minted.
//! - **Handler chain** errors are not Rust errors at all; they are accumulated on the
//!   [`Context`](crate::context::Context) as [`ErrorRecord`](crate::context::ErrorRecord)s.
//! - **Registry** errors ([`RegistryError`]) are returned synchronously to the caller
//!   of [`Context::call`](crate::context::Context::call).

use thiserror::Error;

/// Errors raised by the context key/value store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// `get` was called with a key that was never set on this request.
    #[error("key {0} does not exist")]
    KeyNotFound(String),
    /// The key exists but holds a value of another type.
    #[error("key {key} holds a value that is not a {expected}")]
    TypeMismatch {
        /// Key that was looked up
        key: String,
        /// Rust type name the caller asked for
        expected: &'static str,
    },
}

/// Errors raised by the dynamic function registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The function does not return exactly one value, or one value plus one error.
    #[error("function {name:?} is not a valid extension function; it must return 1 value, or 1 value and 1 error value")]
    InvalidSignature {
        /// Name the function was registered under
        name: String,
    },
    /// Wrong number of arguments for the target function.
    #[error("function {name:?} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Function name
        name: String,
        /// Human readable expectation, e.g. `2` or `at least 1`
        expected: String,
        /// Number of arguments supplied
        got: usize,
    },
    /// An argument is not assignable to the declared parameter type.
    #[error("function {name:?} argument {index} must be {expected}")]
    TypeMismatch {
        /// Function name
        name: String,
        /// Zero-based argument position
        index: usize,
        /// Declared parameter type
        expected: &'static str,
    },
    /// No function is registered under this name.
    #[error("no extension function named {0:?}")]
    UnknownFunction(String),
    /// A function with this name is already registered.
    #[error("extension function {0:?} is already registered")]
    DuplicateFunction(String),
}

/// Reasons the secure cookie codec refuses a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Not base64, or not exactly three `|` separated parts.
    #[error("malformed cookie value")]
    MalformedCookie,
    /// HMAC over `name|timestamp|ciphertext|` does not match.
    #[error("cookie signature is not valid")]
    SignatureInvalid,
    /// Timestamp part is not a decimal integer.
    #[error("invalid cookie timestamp")]
    BadTimestamp,
    /// Timestamp is later than the current time.
    #[error("cookie timestamp is too new")]
    TimestampInFuture,
    /// Timestamp is older than the configured max lifetime.
    #[error("cookie timestamp has expired")]
    Expired,
    /// Ciphertext is not valid base64 or is too short to carry an IV.
    #[error("cookie value could not be decrypted")]
    DecryptFailed,
    /// Decrypted bytes are not a valid session value map.
    #[error("cookie payload could not be deserialized")]
    DeserializeFailed,
    /// The value map could not be serialized.
    #[error("session values could not be serialized: {0}")]
    SerializeFailed(String),
    /// Block key is not 16, 24 or 32 bytes, or a signing key is empty.
    #[error("invalid cookie key material: {0}")]
    InvalidKey(String),
}

/// Errors raised by session providers and the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No provider was registered under this name.
    #[error("session: unknown provider {0:?} (forgotten registration?)")]
    UnknownProvider(String),
    /// The provider rejected its configuration blob.
    #[error("session: invalid provider config: {0}")]
    InvalidProviderConfig(String),
    /// The manager configuration could not be parsed or is inconsistent.
    #[error("session: invalid manager config: {0}")]
    InvalidConfig(String),
    /// `release` was called a second time for the same request.
    #[error("session {0} was already released for this request")]
    AlreadyReleased(String),
    /// The response headers were flushed before the session cookie could be set.
    #[error("session {0} cannot be released after response headers were written")]
    HeadersAlreadyWritten(String),
    /// The provider has no session with this id.
    #[error("session {0} not found")]
    NotFound(String),
    /// Encoding the cookie payload failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
