use std::time::Duration;

use tracing::{field, info_span, Span};

use super::Middleware;
use crate::context::Context;

/// Context key holding the request [`Span`] opened by [`TracingMiddleware`].
pub const SPAN_KEY: &str = "_brrtc.span";

/// Opens a `request` span per request and records status and latency on it.
///
/// Later handlers run inside the span, so their events carry its fields. The span is
/// also stored in the context under [`SPAN_KEY`] for handlers that record their own
/// fields or hand it to deferred work.
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn before(&self, ctx: &mut Context) -> Option<u16> {
        let span = info_span!(
            "request",
            request_id = %ctx.request.request_id,
            method = %ctx.request.method,
            path = %ctx.request.path,
            route = %ctx.route_name(),
            status = field::Empty,
            latency_ms = field::Empty,
        );
        ctx.set(SPAN_KEY, span);
        None
    }

    fn run_next(&self, ctx: &mut Context) {
        let span = ctx.get_as::<Span>(SPAN_KEY).ok().cloned();
        let _entered = span.as_ref().map(Span::enter);
        ctx.next();
    }

    fn after(&self, ctx: &mut Context, latency: Duration) {
        let status = ctx.response.status();
        if let Ok(span) = ctx.get_as::<Span>(SPAN_KEY) {
            span.record("status", status);
            span.record("latency_ms", latency.as_millis() as u64);
        }
    }
}
