use super::codec::unix_now;
use super::provider::{Provider, SessionStore};
use super::value::{SessionValue, SessionValues};
use crate::error::SessionError;
use crate::server::ResponseWriter;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Server-side session kept in process memory.
pub struct MemoryStore {
    sid: String,
    values: RwLock<SessionValues>,
    last_access: AtomicI64,
}

impl MemoryStore {
    fn new(sid: &str, values: SessionValues) -> Self {
        Self {
            sid: sid.to_string(),
            values: RwLock::new(values),
            last_access: AtomicI64::new(unix_now()),
        }
    }

    fn touch(&self, now: i64) {
        self.last_access.store(now, Ordering::Relaxed);
    }

    fn expired(&self, now: i64, max_lifetime: i64) -> bool {
        max_lifetime > 0 && self.last_access.load(Ordering::Relaxed) < now - max_lifetime
    }
}

impl SessionStore for MemoryStore {
    fn set(&self, key: &str, value: SessionValue) {
        self.values.write().insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<SessionValue> {
        self.values.read().get(key).cloned()
    }

    fn delete(&self, key: &str) -> Option<SessionValue> {
        self.values.write().remove(key)
    }

    fn flush(&self) {
        self.values.write().clear();
    }

    fn session_id(&self) -> &str {
        &self.sid
    }

    fn values(&self) -> SessionValues {
        self.values.read().clone()
    }

    fn release(&self, _res: &mut ResponseWriter) -> Result<(), SessionError> {
        self.touch(unix_now());
        Ok(())
    }
}

/// Provider keeping sessions in a concurrent in-process table.
///
/// Sessions expire `max_lifetime` seconds after their last access. Expired entries
/// are invisible to `exists` immediately and are removed by the next `gc` pass.
#[derive(Default)]
pub struct MemoryProvider {
    sessions: DashMap<String, Arc<MemoryStore>>,
    max_lifetime: i64,
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Provider for MemoryProvider {
    fn init(&mut self, max_lifetime: u64, _config: &str) -> Result<(), SessionError> {
        self.max_lifetime = i64::try_from(max_lifetime).unwrap_or(i64::MAX);
        Ok(())
    }

    fn read(&self, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        let now = unix_now();
        let store = match self.sessions.entry(sid.to_string()) {
            Entry::Occupied(mut e) if e.get().expired(now, self.max_lifetime) => {
                let fresh = Arc::new(MemoryStore::new(sid, SessionValues::new()));
                e.insert(Arc::clone(&fresh));
                fresh
            }
            Entry::Occupied(e) => Arc::clone(e.get()),
            Entry::Vacant(e) => {
                let fresh = Arc::new(MemoryStore::new(sid, SessionValues::new()));
                e.insert(Arc::clone(&fresh));
                fresh
            }
        };
        store.touch(now);
        Ok(store)
    }

    fn exists(&self, sid: &str) -> bool {
        let now = unix_now();
        self.sessions
            .get(sid)
            .is_some_and(|s| !s.expired(now, self.max_lifetime))
    }

    fn load(&self, sid: &str) -> Result<Option<Arc<dyn SessionStore>>, SessionError> {
        let now = unix_now();
        let Some(store) = self.sessions.get(sid).map(|s| Arc::clone(s.value())) else {
            return Ok(None);
        };
        if store.expired(now, self.max_lifetime) {
            return Ok(None);
        }
        store.touch(now);
        Ok(Some(store as Arc<dyn SessionStore>))
    }

    fn regenerate(&self, old_sid: &str, sid: &str) -> Result<Arc<dyn SessionStore>, SessionError> {
        let values = self
            .sessions
            .remove(old_sid)
            .map(|(_, old)| old.values())
            .unwrap_or_default();
        let store = Arc::new(MemoryStore::new(sid, values));
        self.sessions.insert(sid.to_string(), Arc::clone(&store));
        Ok(store)
    }

    fn destroy(&self, sid: &str) -> Result<(), SessionError> {
        self.sessions.remove(sid);
        Ok(())
    }

    fn gc(&self) {
        let now = unix_now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| !s.expired(now, self.max_lifetime));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.sessions.len(), "Memory sessions collected");
        }
    }

    fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_is_shared() {
        let p = MemoryProvider::new();
        p.read("a").unwrap().set("k", SessionValue::from(1i64));
        assert_eq!(p.read("a").unwrap().get("k"), Some(SessionValue::from(1i64)));
        assert_eq!(p.count(), 1);
    }

    #[test]
    fn test_regenerate_moves_values() {
        let p = MemoryProvider::new();
        p.read("old").unwrap().set("k", SessionValue::from("v"));
        let store = p.regenerate("old", "new").unwrap();
        assert_eq!(store.session_id(), "new");
        assert_eq!(store.get("k"), Some(SessionValue::from("v")));
        assert!(!p.exists("old"));
        assert!(p.exists("new"));
    }

    #[test]
    fn test_gc_evicts_expired() {
        let mut p = MemoryProvider::new();
        p.init(10, "").unwrap();
        p.read("stale").unwrap();
        p.read("live").unwrap();
        if let Some(s) = p.sessions.get("stale") {
            s.touch(unix_now() - 11);
        }
        assert!(!p.exists("stale"));
        p.gc();
        assert_eq!(p.count(), 1);
        assert!(p.exists("live"));
    }
}
