//! Domain types shared by the source listing, the store inventory and the
//! reconciler.
//!
//! Everything here is a read-only snapshot value: entries and objects are
//! captured at the start of a pass and never outlive it.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Opaque content token recorded by the store for one object.
///
/// Compared byte-for-byte against a locally computed lowercase MD5 hex
/// digest; the hash algorithm behind a store-assigned value is never checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// Build a fingerprint from a raw store value, stripping the double
    /// quotes S3 wraps around ETags.
    pub fn from_store_value(raw: &str) -> Self {
        Self(raw.trim().trim_matches('"').to_owned())
    }

    /// `true` when the value looks like a single-part MD5 digest
    /// (32 lowercase hex characters). Multipart ETags (`<hex>-<parts>`) do not.
    pub fn is_content_md5(&self) -> bool {
        self.0.len() == 32
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Result of looking up a single key in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Present(Fingerprint),
    Absent,
}

impl Presence {
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            Presence::Present(fp) => Some(fp),
            Presence::Absent => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Source entries
// ---------------------------------------------------------------------------

/// One file published by the source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Final path segment of `locator`, used as the store key.
    pub logical_name: String,
    pub locator: Url,
}

impl SourceEntry {
    /// Derive an entry from an absolute locator.
    ///
    /// Returns `None` when the locator has no usable final path segment
    /// (e.g. `https://host/dir/`).
    pub fn from_locator(locator: Url) -> Option<Self> {
        let logical_name = logical_name_of(&locator)?;
        Some(Self {
            logical_name,
            locator,
        })
    }
}

/// Final path segment of `locator` exactly as published, if non-empty.
///
/// Escapes are kept: `%2F` must not become a separator, and distinct
/// invalid-UTF-8 escapes must not collapse into one name.
pub fn logical_name_of(locator: &Url) -> Option<String> {
    let last = locator.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    Some(last.to_owned())
}

// ---------------------------------------------------------------------------
// Store objects
// ---------------------------------------------------------------------------

/// One object currently held by the destination container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreObject {
    pub key: String,
    pub fingerprint: Fingerprint,
}

impl StoreObject {
    pub fn new(key: impl Into<String>, fingerprint: impl Into<Fingerprint>) -> Self {
        Self {
            key: key.into(),
            fingerprint: fingerprint.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
