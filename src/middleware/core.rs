use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::{Context, HandlerFn};

pub trait Middleware: Send + Sync {
    /// Return `Some(status)` to abort the chain before any later handler runs.
    fn before(&self, _ctx: &mut Context) -> Option<u16> {
        None
    }
    /// Run the rest of the chain. Override to wrap it, e.g. inside a span.
    fn run_next(&self, ctx: &mut Context) {
        ctx.next();
    }
    fn after(&self, _ctx: &mut Context, _latency: Duration) {}
}

/// Wrap `mw` as a chain handler: `before`, then the rest of the chain, then `after`.
pub fn handler<M: Middleware + 'static>(mw: Arc<M>) -> HandlerFn {
    Arc::new(move |ctx: &mut Context| {
        let start = Instant::now();
        match mw.before(ctx) {
            Some(code) => ctx.abort(code),
            None => mw.run_next(ctx),
        }
        mw.after(ctx, start.elapsed());
    })
}
