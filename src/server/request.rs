use crate::ids::RequestId;
use http::Method;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::debug;

/// Maximum inline headers/cookies before heap allocation
/// Most requests have ≤16 headers (JSF: no heap in hot path)
pub const MAX_INLINE_HEADERS: usize = 16;

/// Maximum number of path/query parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated header/cookie storage for the hot path
///
/// Header names use `Arc<str>` so repeated names (Content-Type, Set-Cookie, ...)
/// clone in O(1).
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Stack-allocated parameter storage for path and query parameters.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Request data carried by a [`Context`](crate::context::Context).
///
/// The HTTP layer that owns the socket builds one of these per request and hands it
/// to [`Route::serve`](crate::app::Route::serve). Cookies are parsed from the
/// `Cookie` header as it is added.
#[derive(Debug, Clone)]
pub struct Request {
    /// Unique request ID for tracing and correlation
    pub request_id: RequestId,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request path without the query string
    pub path: String,
    /// Peer address as reported by the HTTP layer (`ip:port`)
    pub remote_addr: String,
    /// Query string parameters
    pub query_params: ParamVec,
    /// HTTP headers (lowercase names)
    pub headers: HeaderVec,
    /// Cookies parsed from the Cookie header
    pub cookies: HeaderVec,
    /// Raw request body
    pub body: Vec<u8>,
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl Request {
    /// Create a request for `method` and `path`. A query string in `path` is split off
    /// into [`Request::query_params`].
    pub fn new(method: Method, path: &str) -> Self {
        let (path, query_params) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), parse_query_params(q)),
            None => (path.to_string(), ParamVec::new()),
        };
        Self {
            request_id: RequestId::new(),
            method,
            path,
            remote_addr: String::new(),
            query_params,
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header. A `Cookie` header is also parsed into [`Request::cookies`].
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "cookie" {
            self.cookies.extend(parse_cookies(&value));
        }
        if name == "x-request-id" {
            self.request_id = RequestId::from_header_or_new(Some(&value));
        }
        self.headers.push((Arc::from(name.as_str()), value));
        self
    }

    /// Set the peer address used when minting session ids.
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    /// Set the raw body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get a cookie by name
    #[inline]
    #[must_use]
    pub fn get_cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name ("last write wins").
    #[inline]
    #[must_use]
    pub fn get_query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Record a cookie on the request so later readers in the same request see it.
    ///
    /// The session manager uses this after minting an id, mirroring what the client
    /// will send on its next request.
    pub fn add_cookie(&mut self, name: &str, value: impl Into<String>) {
        self.cookies.retain(|(k, _)| k.as_ref() != name);
        self.cookies.push((Arc::from(name), value.into()));
    }
}

/// Parse a `Cookie` header value (`a=b; c=d`) into name/value pairs.
pub fn parse_cookies(header: &str) -> HeaderVec {
    let cookies: HeaderVec = header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((Arc::from(name), value.to_string()))
        })
        .collect();
    debug!(cookie_count = cookies.len(), "Cookies extracted");
    cookies
}

/// Parse a query string (without the leading `?`), URL-decoding names and values.
pub fn parse_query_params(query: &str) -> ParamVec {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}
