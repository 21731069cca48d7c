//! # Middleware
//!
//! A [`Middleware`] observes a request from both sides of the rest of the chain:
//! [`before`](Middleware::before) runs first and may short-circuit with a status code,
//! [`after`](Middleware::after) runs once the rest of the chain has finished (or been
//! aborted) and receives the elapsed time.
//!
//! [`handler`] adapts a middleware into an ordinary chain handler, so middleware and
//! plain handlers mix freely in one route:
//!
//! ```rust
//! use brrtcontext::app::App;
//! use brrtcontext::context::{handler, Context};
//! use brrtcontext::middleware::{self, MetricsMiddleware};
//! use brrtcontext::server::Request;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(MetricsMiddleware::new());
//! let app = App::builder().build();
//! let route = app.route(
//!     "index",
//!     vec![
//!         middleware::handler(Arc::clone(&metrics)),
//!         handler(|ctx: &mut Context| ctx.status(204)),
//!     ],
//! );
//! route.serve(Request::default());
//! assert_eq!(metrics.request_count(), 1);
//! ```

mod core;
mod metrics;
mod tracing;

pub use self::core::{handler, Middleware};
pub use self::metrics::MetricsMiddleware;
pub use self::tracing::{TracingMiddleware, SPAN_KEY};
