//! Capture data model shared by the index client, matcher and fetcher.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Where a record lives in remote storage.
///
/// `length` of `None` means "read to the end of the compressed member".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StorageLocator {
    pub file: String,
    pub offset: u64,
    pub length: Option<u64>,
}

/// A single index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub timestamp: Timestamp,
    pub file: String,
    pub compressed_offset: u64,
    pub compressed_end_offset: Option<u64>,
}

impl Capture {
    /// The end offset becomes a length only when it is positive.
    pub fn locator(&self) -> StorageLocator {
        StorageLocator {
            file: self.file.clone(),
            offset: self.compressed_offset,
            length: self.compressed_end_offset.filter(|end| *end > 0),
        }
    }
}

/// Captures of one query key, ascending by timestamp.
///
/// Inserting an already-present timestamp replaces the earlier locator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures(BTreeMap<Timestamp, StorageLocator>);

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, capture: Capture) {
        let locator = capture.locator();
        self.0.insert(capture.timestamp, locator);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, timestamp: &Timestamp) -> Option<&StorageLocator> {
        self.0.get(timestamp)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Timestamp, StorageLocator> {
        self.0.iter()
    }

    pub fn first(&self) -> Option<(&Timestamp, &StorageLocator)> {
        self.0.first_key_value()
    }

    pub fn last(&self) -> Option<(&Timestamp, &StorageLocator)> {
        self.0.last_key_value()
    }
}

impl FromIterator<Capture> for Captures {
    fn from_iter<I: IntoIterator<Item = Capture>>(iter: I) -> Self {
        let mut captures = Self::new();
        captures.extend(iter);
        captures
    }
}

impl Extend<Capture> for Captures {
    fn extend<I: IntoIterator<Item = Capture>>(&mut self, iter: I) {
        for capture in iter {
            self.insert(capture);
        }
    }
}

impl<'a> IntoIterator for &'a Captures {
    type Item = (&'a Timestamp, &'a StorageLocator);
    type IntoIter = btree_map::Iter<'a, Timestamp, StorageLocator>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Index query key: an optional render-type prefix plus the URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureQueryKey {
    render_type: Option<String>,
    url: String,
}

impl CaptureQueryKey {
    pub fn url(url: impl Into<String>) -> Self {
        Self { render_type: None, url: url.into() }
    }

    /// Key for a render-type listing such as `screenshot:http://example.org/`.
    pub fn rendered(render_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self { render_type: Some(render_type.into()), url: url.into() }
    }

    pub fn target_url(&self) -> &str {
        &self.url
    }

    pub fn render_type(&self) -> Option<&str> {
        self.render_type.as_deref()
    }
}

impl fmt::Display for CaptureQueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.render_type {
            Some(render_type) => write!(f, "{render_type}:{}", self.url),
            None => f.write_str(&self.url),
        }
    }
}
