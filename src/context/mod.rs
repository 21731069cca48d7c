//! # Request Context
//!
//! A [`Context`] carries one request through a route's handler chain: the request and
//! response, a cursor into the chain, a typed key/value store, the accumulated error
//! list, the session handle and the deferred hooks.
//!
//! ## Chain Semantics
//!
//! Handlers run in registration order. A handler that calls [`Context::next`] runs the
//! rest of the chain before its own remaining code, so code after `next()` sees the
//! final state of the request. [`Context::abort`] moves the cursor past the end: no
//! later handler runs, and handlers waiting on `next()` resume with
//! [`Context::is_aborted`] returning `true`.
//!
//! ## Pooling
//!
//! Each [`Route`](crate::app::Route) owns a [`ContextPool`]. Contexts are reset when
//! returned, so nothing set by one request is visible to the next. Use
//! [`Context::copy`] for anything that must outlive the request.
//!
//! ## Errors
//!
//! Handler errors do not unwind the chain; they are appended to an [`ErrorList`] with
//! an [`ErrorType`] so that middleware or the final status page can decide what to
//! show. Only [`ErrorType::EXTERNAL`] records are considered client-visible.

mod core;
mod errors;
mod pool;

pub use self::core::{handler, Context, HandlerFn, ABORT_INDEX};
pub use errors::{ErrorList, ErrorRecord, ErrorType};
pub use pool::ContextPool;
