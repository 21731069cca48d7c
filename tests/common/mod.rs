#![allow(dead_code)]

pub mod sessions {
    use brrtcontext::server::{Request, ResponseWriter};
    use brrtcontext::session::SessionManager;

    pub const COOKIE: &str = "sid";
    pub const BLOCK_KEY: &str = "0123456789abcdef0123456789abcdef";

    /// Cookie provider config with fixed keys so a test can decode what it encoded.
    pub fn cookie_provider_config(max_age: i64) -> String {
        serde_json::json!({
            "securityKey": "test-signing-key",
            "blockKey": BLOCK_KEY,
            "securityName": "brrtc-test",
            "cookieName": COOKIE,
            "maxage": max_age,
        })
        .to_string()
    }

    pub fn cookie_manager() -> SessionManager {
        let config = serde_json::json!({
            "cookieName": COOKIE,
            "gclifetime": 3600,
            "providerConfig": cookie_provider_config(0),
        });
        SessionManager::new("cookie", &config.to_string()).unwrap()
    }

    pub fn memory_manager(max_lifetime: u64) -> SessionManager {
        let config = serde_json::json!({
            "cookieName": COOKIE,
            "gclifetime": 3600,
            "maxLifetime": max_lifetime,
        });
        SessionManager::new("memory", &config.to_string()).unwrap()
    }

    /// The next request from a browser that received `res`.
    pub fn follow_up(res: &ResponseWriter) -> Request {
        let cookie = res.cookie(COOKIE).expect("response sets the session cookie");
        Request::default().with_header("cookie", format!("{}={}", cookie.name, cookie.value))
    }
}

pub mod chain {
    use brrtcontext::context::{handler, Context, HandlerFn};
    use std::sync::{Arc, Mutex};

    pub type Log = Arc<Mutex<Vec<String>>>;

    pub fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Handler that records `name` and falls through.
    pub fn step(log: &Log, name: &'static str) -> HandlerFn {
        let log = Arc::clone(log);
        handler(move |_ctx: &mut Context| log.lock().unwrap().push(name.to_string()))
    }

    /// Handler that records `name-before`, runs the rest of the chain, then records
    /// `name-after`.
    pub fn wrap(log: &Log, name: &'static str) -> HandlerFn {
        let log = Arc::clone(log);
        handler(move |ctx: &mut Context| {
            log.lock().unwrap().push(format!("{name}-before"));
            ctx.next();
            log.lock().unwrap().push(format!("{name}-after"));
        })
    }
}
