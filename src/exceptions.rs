//! # Status and Panic Pages
//!
//! HTML bodies for responses that finished with an error status but no body.
//!
//! - [`status_page`] is the page for a status code, used in both modes.
//! - [`panic_page`] is the development-mode page for a panicking handler. It shows the
//!   panic message, the request's error list and the captured backtrace. Production
//!   mode renders `status_page(500)` instead.

use crate::context::ErrorList;
use http::StatusCode;
use std::any::Any;

/// Content type of every page rendered here.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Human readable explanation of a status code.
#[must_use]
pub fn status_message(code: u16) -> &'static str {
    match code {
        400 => "The browser (or proxy) sent a request that this server could not understand.",
        401 => "The server could not verify that you are authorized to access the URL requested. You either supplied the wrong credentials (e.g. a bad password), or your browser doesn't understand how to supply the credentials required.",
        403 => "You do not have the permission to access the requested resource. It is either read-protected or not readable by the server.",
        404 => "The requested URL was not found on the server. If you entered the URL manually please check your spelling and try again",
        405 => "The method is not allowed for the requested URL.",
        418 => "This server is a teapot, not a coffee machine",
        500 => "The server encountered an internal error and was unable to complete your request. Either the server is overloaded or there is an error in the application.",
        502 => "The proxy server received an invalid response from an upstream server.",
        503 => "The server is temporarily unable to service your request due to maintenance downtime or capacity problems. Please try again later.",
        504 => "The connection to an upstream server timed out.",
        505 => "The server does not support the HTTP protocol version used in the request",
        _ => "",
    }
}

/// Reason phrase for `code`, or `Unknown Status` for codes outside the IANA registry.
#[must_use]
pub fn status_title(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
}

/// Standard page for `code`.
#[must_use]
pub fn status_page(code: u16) -> String {
    let title = status_title(code);
    format!(
        "<!DOCTYPE HTML>\n<title>{code} {title}</title>\n<h1>{title}</h1>\n<p>{}</p>\n",
        status_message(code)
    )
}

/// What a handler panic left behind.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    pub backtrace: String,
}

/// Development page for a panicking handler.
#[must_use]
pub fn panic_page(report: &PanicReport, errors: &ErrorList) -> String {
    let mut page = String::from("<!DOCTYPE HTML>\n<title>500 Internal Server Error</title>\n");
    page.push_str("<h1>Handler panicked</h1>\n");
    page.push_str(&format!("<h2>{}</h2>\n", escape_html(&report.message)));
    if !errors.is_empty() {
        page.push_str(&format!(
            "<h3>Errors</h3>\n<pre>{}</pre>\n",
            escape_html(&errors.to_string())
        ));
    }
    page.push_str(&format!(
        "<h3>Backtrace</h3>\n<pre>{}</pre>\n",
        escape_html(&report.backtrace)
    ));
    page
}

/// Best-effort text of a `catch_unwind` payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}

/// Escape text for inclusion in an HTML page.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
