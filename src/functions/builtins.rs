//! Extension functions registered by [`FunctionRegistry::with_builtins`](super::FunctionRegistry::with_builtins).

use super::core::ExtensionFn;
use crate::context::Context;
use crate::ids::HashFunc;
use crate::server::Cookie;
use crate::session::{SessionStore, SessionValue};
use anyhow::{anyhow, bail, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Session key holding flashed messages, as a map of category to message list.
pub const FLASHES_KEY: &str = "_flashes";

pub(crate) fn builtins() -> Vec<(&'static str, ExtensionFn)> {
    vec![
        (
            "redirect",
            ExtensionFn::try_fn2(|ctx: &mut Context, code: u16, location: String| {
                redirect(ctx, code, &location)
            }),
        ),
        (
            "serve_data",
            ExtensionFn::try_fn2(|ctx: &mut Context, code: u16, data: Vec<u8>| {
                serve_data(ctx, code, &data)
            }),
        ),
        (
            "flash",
            ExtensionFn::try_fn2(|ctx: &mut Context, category: String, message: String| {
                flash(ctx, &category, &message)
            }),
        ),
        (
            "flash_messages",
            ExtensionFn::try_fn1(|ctx: &mut Context, categories: Vec<String>| {
                flash_messages(ctx, &categories)
            }),
        ),
        (
            "all_flash_messages",
            ExtensionFn::try_fn0(|ctx: &mut Context| all_flash_messages(ctx)),
        ),
        (
            "cookie",
            ExtensionFn::try_fn2(|ctx: &mut Context, secure: bool, cookie: Cookie| {
                set_cookie(ctx, secure, cookie)
            }),
        ),
        ("cookies", ExtensionFn::fn0(|ctx: &mut Context| cookies(ctx))),
        (
            "read_cookies",
            ExtensionFn::fn0(|ctx: &mut Context| read_cookies(ctx)),
        ),
    ]
}

/// Release the session, then redirect with a 3xx status.
pub fn redirect(ctx: &mut Context, code: u16, location: &str) -> Result<()> {
    if !(300..=308).contains(&code) {
        bail!("cannot redirect with status code {code}");
    }
    release_if_pending(ctx)?;
    ctx.response.set_header("location", location);
    ctx.response.write_header(code);
    ctx.response.write_header_now();
    Ok(())
}

/// Release the session, then write `data` as `text/plain`.
pub fn serve_data(ctx: &mut Context, code: u16, data: &[u8]) -> Result<()> {
    release_if_pending(ctx)?;
    ctx.response.set_header("content-type", "text/plain");
    ctx.response.write_header(code);
    ctx.response.write(data);
    Ok(())
}

/// Queue `message` under `category` for a later request.
pub fn flash(ctx: &mut Context, category: &str, message: &str) -> Result<()> {
    let session = active_session(ctx)?;
    let mut flashes = take_flashes(session.as_ref());
    flashes
        .entry(category.to_string())
        .or_default()
        .push(message.to_string());
    store_flashes(session.as_ref(), flashes);
    Ok(())
}

/// Remove and return the messages of the given categories, in category order.
pub fn flash_messages(ctx: &mut Context, categories: &[String]) -> Result<Vec<String>> {
    let session = active_session(ctx)?;
    let mut flashes = take_flashes(session.as_ref());
    let messages = categories
        .iter()
        .filter_map(|c| flashes.remove(c))
        .flatten()
        .collect();
    store_flashes(session.as_ref(), flashes);
    Ok(messages)
}

/// Remove and return every flashed message.
pub fn all_flash_messages(ctx: &mut Context) -> Result<BTreeMap<String, Vec<String>>> {
    let session = active_session(ctx)?;
    let flashes = take_flashes(session.as_ref());
    session.delete(FLASHES_KEY);
    Ok(flashes)
}

/// Append a `Set-Cookie` for `cookie`. With `secure`, the value is signed with the
/// app secret key (see [`read_cookies`]).
pub fn set_cookie(ctx: &mut Context, secure: bool, mut cookie: Cookie) -> Result<()> {
    cookie.name = cookie.name.replace(['\n', '\r'], "-");
    cookie.value = sanitize(&cookie.value);
    cookie.path = cookie.path.as_deref().map(sanitize);
    cookie.domain = cookie.domain.as_deref().map(sanitize);
    if secure {
        let Some(secret) = ctx.app().secret_key() else {
            bail!("cannot sign cookie {:?}: the app has no secret key", cookie.name);
        };
        cookie.value = sign_value(secret, &cookie.name, &cookie.value);
    }
    if !ctx.response.set_cookie(&cookie) {
        bail!(
            "cannot set cookie {:?} after response headers were written",
            cookie.name
        );
    }
    Ok(())
}

/// Request cookies keyed by name, values as sent.
pub fn cookies(ctx: &Context) -> BTreeMap<String, String> {
    ctx.request
        .cookies
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Request cookies keyed by name with signed values unpacked.
///
/// Values that are not signed are returned as sent. A signed value whose signature
/// does not verify against the app secret key reads as an empty string.
pub fn read_cookies(ctx: &Context) -> BTreeMap<String, String> {
    let secret = ctx.app().secret_key();
    ctx.request
        .cookies
        .iter()
        .map(|(name, value)| (name.to_string(), unpack_value(secret, name, value)))
        .collect()
}

fn sanitize(value: &str) -> String {
    value.replace(['\n', '\r', ';'], " ")
}

fn sign_value(secret: &[u8], name: &str, value: &str) -> String {
    let encoded = URL_SAFE.encode(value);
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string();
    let mac = HashFunc::Sha1.mac(
        secret,
        &[name.as_bytes(), b"|", encoded.as_bytes(), b"|", ts.as_bytes()],
    );
    format!("{encoded}|{ts}|{}", hex::encode(mac))
}

fn unpack_value(secret: Option<&[u8]>, name: &str, value: &str) -> String {
    let mut parts = value.splitn(3, '|');
    let (Some(encoded), Some(ts), Some(sig)) = (parts.next(), parts.next(), parts.next()) else {
        return value.to_string();
    };
    let verified = secret.is_some_and(|secret| {
        hex::decode(sig).is_ok_and(|tag| {
            HashFunc::Sha1.verify(
                secret,
                &[name.as_bytes(), b"|", encoded.as_bytes(), b"|", ts.as_bytes()],
                &tag,
            )
        })
    });
    if !verified {
        return String::new();
    }
    URL_SAFE
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

fn release_if_pending(ctx: &mut Context) -> Result<()> {
    if ctx.session().is_some() && !ctx.session_released() {
        ctx.release_session()?;
    }
    Ok(())
}

fn active_session(ctx: &Context) -> Result<Arc<dyn SessionStore>> {
    ctx.session()
        .cloned()
        .ok_or_else(|| anyhow!("no session is active for this request"))
}

fn take_flashes(session: &dyn SessionStore) -> BTreeMap<String, Vec<String>> {
    let Some(SessionValue::Map(map)) = session.get(FLASHES_KEY) else {
        return BTreeMap::new();
    };
    map.into_iter()
        .map(|(category, messages)| {
            let messages = messages
                .as_list()
                .unwrap_or_default()
                .iter()
                .filter_map(|m| m.as_str().map(str::to_string))
                .collect();
            (category, messages)
        })
        .collect()
}

fn store_flashes(session: &dyn SessionStore, flashes: BTreeMap<String, Vec<String>>) {
    if flashes.is_empty() {
        session.delete(FLASHES_KEY);
        return;
    }
    let map = flashes
        .into_iter()
        .map(|(category, messages)| {
            let list = messages.into_iter().map(SessionValue::Str).collect();
            (category, SessionValue::List(list))
        })
        .collect();
    session.set(FLASHES_KEY, SessionValue::Map(map));
}
