//! Multi-valued, case-insensitive headers and trailers.

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};

/// Headers or trailers exchanged with a peer.
///
/// Keys are always stored lower-cased, so lookups are case-insensitive.
/// The same type is used for both headers and trailers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create new metadata from HTTP headers.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Create empty metadata.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the first value for a key.
    ///
    /// Returns `None` if the key is not present or the value is not visible ASCII.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Get a value as bytes.
    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        self.headers.get(key).map(|v| v.as_bytes())
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Get all values for a key.
    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(key)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Append a value, keeping any existing values for the key.
    ///
    /// Returns `false` when the key or value is not a legal header token.
    pub fn append(&mut self, key: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
                true
            }
            _ => false,
        }
    }

    /// Replace every value for a key with a single value.
    ///
    /// Returns `false` when the key or value is not a legal header token.
    pub fn insert(&mut self, key: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                true
            }
            _ => false,
        }
    }

    /// Replace every value for a key with the given list.
    pub fn insert_all<'a, I>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.remove(key);
        for value in values {
            self.append(key, value);
        }
    }

    /// Remove a key, returning whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => self.headers.remove(&name).is_some(),
            Err(_) => false,
        }
    }

    /// Append every entry of `other` to this map.
    pub fn merge(&mut self, other: &Metadata) {
        for (name, value) in other.headers.iter() {
            self.headers.append(name.clone(), value.clone());
        }
    }

    /// Get the underlying HeaderMap.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the underlying HeaderMap.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Consume self and return the underlying HeaderMap.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Iterate over every (name, value) pair.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter()
    }

    /// Iterate over distinct keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.headers.keys().map(|k| k.as_str())
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the number of values stored.
    pub fn len(&self) -> usize {
        self.headers.len()
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}

impl From<Metadata> for HeaderMap {
    fn from(metadata: Metadata) -> Self {
        metadata.headers
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut metadata = Metadata::empty();
        for (key, value) in iter {
            metadata.append(key, value);
        }
        metadata
    }
}
