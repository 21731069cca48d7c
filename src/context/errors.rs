use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::BitOr;

/// Classification bitmask of an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorType(pub u32);

impl ErrorType {
    /// Diagnostic only, never shown to clients
    pub const INTERNAL: ErrorType = ErrorType(1);
    /// Safe to surface in a response
    pub const EXTERNAL: ErrorType = ErrorType(1 << 1);
    pub const ALL: ErrorType = ErrorType(u32::MAX);

    #[must_use]
    pub fn intersects(self, mask: ErrorType) -> bool {
        self.0 & mask.0 != 0
    }
}

impl BitOr for ErrorType {
    type Output = ErrorType;

    fn bitor(self, rhs: Self) -> Self::Output {
        ErrorType(self.0 | rhs.0)
    }
}

/// One error recorded by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub message: String,
    pub kind: ErrorType,
    pub meta: Option<serde_json::Value>,
}

impl Serialize for ErrorRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("error", &self.message)?;
        map.serialize_entry("meta", &self.meta)?;
        map.end()
    }
}

/// Append-only list of errors recorded during one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ErrorList(Vec<ErrorRecord>);

impl ErrorList {
    pub(crate) fn push(&mut self, record: ErrorRecord) {
        self.0.push(record);
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ErrorRecord> {
        self.0.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ErrorRecord> {
        self.0.iter()
    }

    /// Records whose type intersects `mask`, in recording order.
    #[must_use]
    pub fn by_type(&self, mask: ErrorType) -> Vec<&ErrorRecord> {
        self.0.iter().filter(|e| e.kind.intersects(mask)).collect()
    }

    /// Messages of all records, in recording order.
    #[must_use]
    pub fn messages(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.message.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a ErrorRecord;
    type IntoIter = std::slice::Iter<'a, ErrorRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            writeln!(f, "Error #{:02}: {} ", i + 1, e.message)?;
            match &e.meta {
                Some(meta) => writeln!(f, "     Meta: {meta}")?,
                None => writeln!(f, "     Meta: <nil>")?,
            }
        }
        Ok(())
    }
}
