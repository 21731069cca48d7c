use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Values held by one session, keyed by name.
pub type SessionValues = HashMap<String, SessionValue>;

/// A dynamically typed session value.
///
/// Covers the shapes handlers usually keep in a session (scalars, text, raw bytes,
/// nested lists and maps). Arbitrary `serde` types go through
/// [`SessionStoreExt::set_typed`](super::SessionStoreExt::set_typed), which stores
/// them as [`SessionValue::Bytes`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum SessionValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<SessionValue>),
    Map(BTreeMap<String, SessionValue>),
}

impl SessionValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SessionValue::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Signed view of an integer value. `UInt` converts when it fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SessionValue::Int(i) => Some(*i),
            SessionValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            SessionValue::UInt(u) => Some(*u),
            SessionValue::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SessionValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SessionValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[SessionValue]> {
        match self {
            SessionValue::List(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, SessionValue>> {
        match self {
            SessionValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, SessionValue>> {
        match self {
            SessionValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        SessionValue::Bool(v)
    }
}

impl From<i32> for SessionValue {
    fn from(v: i32) -> Self {
        SessionValue::Int(i64::from(v))
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        SessionValue::Int(v)
    }
}

impl From<u32> for SessionValue {
    fn from(v: u32) -> Self {
        SessionValue::UInt(u64::from(v))
    }
}

impl From<u64> for SessionValue {
    fn from(v: u64) -> Self {
        SessionValue::UInt(v)
    }
}

impl From<f64> for SessionValue {
    fn from(v: f64) -> Self {
        SessionValue::Float(v)
    }
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        SessionValue::Str(v.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        SessionValue::Str(v)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(v: Vec<u8>) -> Self {
        SessionValue::Bytes(v)
    }
}

impl From<Vec<SessionValue>> for SessionValue {
    fn from(v: Vec<SessionValue>) -> Self {
        SessionValue::List(v)
    }
}

impl From<BTreeMap<String, SessionValue>> for SessionValue {
    fn from(v: BTreeMap<String, SessionValue>) -> Self {
        SessionValue::Map(v)
    }
}

impl<T: Into<SessionValue>> From<Option<T>> for SessionValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SessionValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_views() {
        assert_eq!(SessionValue::from(7u64).as_i64(), Some(7));
        assert_eq!(SessionValue::from(-1i64).as_u64(), None);
        assert_eq!(SessionValue::from(u64::MAX).as_i64(), None);
    }

    #[test]
    fn test_option_maps_to_null() {
        assert!(SessionValue::from(None::<String>).is_null());
        assert_eq!(SessionValue::from(Some("x")).as_str(), Some("x"));
    }

    #[test]
    fn test_nested_bincode() {
        let mut inner = BTreeMap::new();
        inner.insert("k".to_string(), SessionValue::from(vec![1u8, 2, 3]));
        let value = SessionValue::List(vec![SessionValue::Map(inner), SessionValue::Float(1.5)]);
        let bytes = bincode::serialize(&value).unwrap();
        let back: SessionValue = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, value);
    }
}
