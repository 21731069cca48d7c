use crate::error::CodecError;
use crate::ids::{random_bytes, HashFunc};
use aes::cipher::{KeyIvInit, StreamCipher};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

const SEP: &[u8] = b"|";

/// AES block size, which is also the counter-mode IV length.
pub const IV_LEN: usize = 16;

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Encrypt-then-sign codec for cookie values.
///
/// A value is serialized with bincode, encrypted with AES-CTR under a fresh random
/// IV and signed together with the cookie name and a unix timestamp:
///
/// ```text
/// payload = base64(iv || aes_ctr(bincode(value)))
/// mac     = HMAC(hash_key, name "|" ts "|" payload "|")
/// cookie  = base64(ts "|" payload "|" mac)
/// ```
///
/// Decoding verifies the MAC before looking at the timestamp or the ciphertext.
#[derive(Clone)]
pub struct CookieCodec {
    name: String,
    hash_key: Vec<u8>,
    block_key: Vec<u8>,
    hash: HashFunc,
    max_lifetime: i64,
}

impl std::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCodec")
            .field("name", &self.name)
            .field("hash", &self.hash)
            .field("max_lifetime", &self.max_lifetime)
            .finish_non_exhaustive()
    }
}

impl CookieCodec {
    /// Build a codec.
    ///
    /// `block_key` selects AES-128, AES-192 or AES-256 by length (16, 24 or 32 bytes).
    /// A `max_lifetime` of 0 disables the expiry check.
    pub fn new(
        name: impl Into<String>,
        hash_key: &[u8],
        block_key: &[u8],
        hash: HashFunc,
        max_lifetime: u64,
    ) -> Result<Self, CodecError> {
        if hash_key.is_empty() {
            return Err(CodecError::InvalidKey("hash key must not be empty".into()));
        }
        if !matches!(block_key.len(), 16 | 24 | 32) {
            return Err(CodecError::InvalidKey(format!(
                "block key must be 16, 24 or 32 bytes, got {}",
                block_key.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            hash_key: hash_key.to_vec(),
            block_key: block_key.to_vec(),
            hash,
            max_lifetime: i64::try_from(max_lifetime).unwrap_or(i64::MAX),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        self.encode_at(value, unix_now())
    }

    /// Encode with an explicit timestamp (unix seconds).
    pub fn encode_at<T: Serialize>(&self, value: &T, now: i64) -> Result<String, CodecError> {
        let plain =
            bincode::serialize(value).map_err(|e| CodecError::SerializeFailed(e.to_string()))?;
        let payload = URL_SAFE.encode(self.encrypt(plain)?);
        let ts = now.to_string();

        let mac = self.hash.mac(
            &self.hash_key,
            &[
                self.name.as_bytes(),
                SEP,
                ts.as_bytes(),
                SEP,
                payload.as_bytes(),
                SEP,
            ],
        );

        let mut out = Vec::with_capacity(ts.len() + payload.len() + mac.len() + 2);
        out.extend_from_slice(ts.as_bytes());
        out.push(b'|');
        out.extend_from_slice(payload.as_bytes());
        out.push(b'|');
        out.extend_from_slice(&mac);
        Ok(URL_SAFE.encode(out))
    }

    pub fn decode<T: DeserializeOwned>(&self, cookie: &str) -> Result<T, CodecError> {
        self.decode_at(cookie, unix_now())
    }

    /// Decode as if the current time were `now` (unix seconds).
    pub fn decode_at<T: DeserializeOwned>(&self, cookie: &str, now: i64) -> Result<T, CodecError> {
        let raw = URL_SAFE
            .decode(cookie.as_bytes())
            .map_err(|_| self.reject(CodecError::MalformedCookie))?;

        // The MAC is raw bytes and may itself contain '|', hence at most 3 parts.
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(ts), Some(payload), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(self.reject(CodecError::MalformedCookie));
        };

        let signed_len = raw.len() - tag.len();
        if !self.hash.verify(
            &self.hash_key,
            &[self.name.as_bytes(), SEP, &raw[..signed_len]],
            tag,
        ) {
            return Err(self.reject(CodecError::SignatureInvalid));
        }

        let ts: i64 = std::str::from_utf8(ts)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.reject(CodecError::BadTimestamp))?;
        if ts > now {
            return Err(self.reject(CodecError::TimestampInFuture));
        }
        if self.max_lifetime > 0 && ts < now.saturating_sub(self.max_lifetime) {
            return Err(self.reject(CodecError::Expired));
        }

        let sealed = URL_SAFE
            .decode(payload)
            .map_err(|_| self.reject(CodecError::DecryptFailed))?;
        let plain = self.decrypt(sealed)?;
        bincode::deserialize(&plain).map_err(|_| self.reject(CodecError::DeserializeFailed))
    }

    fn reject(&self, err: CodecError) -> CodecError {
        debug!(cookie = %self.name, reason = %err, "Cookie rejected");
        err
    }

    fn encrypt(&self, mut plain: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let iv = random_bytes(IV_LEN);
        self.apply_keystream(&iv, &mut plain)?;
        let mut sealed = iv;
        sealed.append(&mut plain);
        Ok(sealed)
    }

    fn decrypt(&self, mut sealed: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        if sealed.len() < IV_LEN {
            return Err(self.reject(CodecError::DecryptFailed));
        }
        let mut body = sealed.split_off(IV_LEN);
        self.apply_keystream(&sealed, &mut body)?;
        Ok(body)
    }

    fn apply_keystream(&self, iv: &[u8], buf: &mut [u8]) -> Result<(), CodecError> {
        let key = self.block_key.as_slice();
        let bad_len = |_| CodecError::DecryptFailed;
        match key.len() {
            16 => Aes128Ctr::new_from_slices(key, iv)
                .map_err(bad_len)?
                .apply_keystream(buf),
            24 => Aes192Ctr::new_from_slices(key, iv)
                .map_err(bad_len)?
                .apply_keystream(buf),
            _ => Aes256Ctr::new_from_slices(key, iv)
                .map_err(bad_len)?
                .apply_keystream(buf),
        }
        Ok(())
    }
}
