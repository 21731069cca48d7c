use super::core::Context;
use crate::app::App;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Free list of reusable [`Context`]s.
///
/// A context handed out by [`acquire`](Self::acquire) is exclusively owned by one
/// request until it comes back through [`release`](Self::release), which resets it.
/// Idle contexts beyond `max_idle` are dropped.
pub struct ContextPool {
    app: Arc<App>,
    idle: Mutex<Vec<Context>>,
    max_idle: usize,
    created: AtomicUsize,
    reused: AtomicUsize,
}

impl std::fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.idle_count())
            .field("max_idle", &self.max_idle)
            .field("created", &self.created())
            .field("reused", &self.reused())
            .finish()
    }
}

impl ContextPool {
    #[must_use]
    pub fn new(app: Arc<App>, max_idle: usize) -> Self {
        Self {
            app,
            idle: Mutex::new(Vec::new()),
            max_idle,
            created: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    /// Take an idle context, or build a new one when none is idle.
    pub fn acquire(&self) -> Context {
        if let Some(ctx) = self.idle.lock().pop() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return ctx;
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Context::new(Arc::clone(&self.app))
    }

    /// Reset `ctx` and return it to the free list.
    pub fn release(&self, mut ctx: Context) {
        ctx.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Contexts built because the free list was empty.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Acquisitions served from the free list.
    #[must_use]
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }
}
