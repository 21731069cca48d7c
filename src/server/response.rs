use super::request::HeaderVec;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// A `Set-Cookie` header value.
///
/// Rendered as `name=value; Path=/; Domain=d; Max-Age=n; HttpOnly; Secure`, omitting
/// attributes that are not set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    /// `Some(0)` expires the cookie immediately
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    /// Parse a rendered `Set-Cookie` value back into its parts.
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let mut parts = set_cookie.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;
        let mut cookie = Cookie::new(name.trim(), value.trim());
        for attr in parts {
            let attr = attr.trim();
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.to_ascii_lowercase().as_str() {
                "path" => cookie.path = Some(val.to_string()),
                "domain" => cookie.domain = Some(val.to_string()),
                "max-age" => cookie.max_age = val.parse().ok(),
                "httponly" => cookie.http_only = true,
                "secure" => cookie.secure = true,
                _ => {}
            }
        }
        Some(cookie)
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = self.domain.as_deref().filter(|d| !d.is_empty()) {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.max(0))?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

/// Buffered response carrier wrapped by a [`Context`](crate::context::Context).
///
/// Tracks whether the status line and headers have been committed so that a
/// double write after `abort` (or a late `Set-Cookie`) is caught instead of silently
/// producing a corrupt response. Once [`written`](ResponseWriter::written) is true,
/// header mutations are refused.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    status: u16,
    headers: HeaderVec,
    body: Vec<u8>,
    written: bool,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Vec::new(),
            written: false,
        }
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all state for reuse by the next request.
    pub fn reset(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.body.clear();
        self.written = false;
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Record the status code to send. Has no effect once headers are written.
    pub fn write_header(&mut self, code: u16) {
        if code == 0 {
            return;
        }
        if self.written {
            warn!(
                current = self.status,
                requested = code,
                "Headers were already written"
            );
            return;
        }
        self.status = code;
    }

    /// Commit the status line and headers.
    pub fn write_header_now(&mut self) {
        self.written = true;
    }

    /// Append body bytes, committing headers first.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.write_header_now();
        self.body.extend_from_slice(data);
        data.len()
    }

    #[must_use]
    pub fn written(&self) -> bool {
        self.written
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Get a header by name (first occurrence)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a repeated header (e.g. `Set-Cookie`).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header. Returns `false` if headers were already written.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> bool {
        if self.written {
            warn!(header = %name, "Cannot set header after headers were written");
            return false;
        }
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
        true
    }

    /// Emit a `Set-Cookie` header, replacing any earlier one for the same cookie name.
    /// Returns `false` if headers were already written.
    pub fn set_cookie(&mut self, cookie: &Cookie) -> bool {
        if self.written {
            warn!(cookie = %cookie.name, "Cannot set cookie after headers were written");
            return false;
        }
        let prefix = format!("{}=", cookie.name);
        self.headers
            .retain(|(k, v)| !(k.eq_ignore_ascii_case("set-cookie") && v.starts_with(&prefix)));
        self.headers
            .push((Arc::from("set-cookie"), cookie.to_string()));
        true
    }

    /// Find the `Set-Cookie` emitted for `name`.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<Cookie> {
        self.get_all("set-cookie")
            .filter_map(Cookie::parse)
            .find(|c| c.name == name)
    }
}
