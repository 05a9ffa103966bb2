//! Error types for mirror-sync.
//!
//! Three layers:
//! - [`SyncError`] aborts a whole pass (nothing trustworthy to reconcile against).
//! - [`EntryError`] is scoped to one source file; the reconciler records it and moves on.
//! - [`StoreError`] is raised by an [`ObjectStore`](crate::store::ObjectStore) backend and
//!   wrapped into one of the above depending on where it happened.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use mirror_core::ConfigError;

/// Errors that abort a sync pass or a payload fetch.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Only `http` and `https` source directories are supported.
    #[error("unsupported source directory: {url}")]
    UnsupportedSource { url: String },

    #[error("source {url} unreachable: {reason}")]
    SourceUnreachable { url: String, reason: String },

    /// The listing parsed to nothing usable and was not empty by design.
    #[error("source {url} returned an unusable listing: {reason}")]
    SourceFormat { url: String, reason: String },

    /// Inventory failed; no mutation was attempted.
    #[error("store container '{container}' unreachable: {source}")]
    StoreUnreachable {
        container: String,
        #[source]
        source: StoreError,
    },

    #[error("source listing is empty; refusing to delete {existing} object(s) from '{container}'")]
    EmptySource { container: String, existing: usize },

    #[error("payload {url} unreachable: {reason}")]
    PayloadUnreachable { url: String, reason: String },

    #[error("payload from {url} is not usable: {reason}")]
    PayloadFormat { url: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to start upload workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Per-entry failure; never escapes the reconciler.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("fetch of {locator} failed: {reason}")]
    Fetch { locator: String, reason: String },

    #[error("local I/O error at {path}: {source}")]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fingerprint lookup for '{key}' failed: {source}")]
    StoreRead {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("store write for '{key}' failed: {source}")]
    StoreWrite {
        key: String,
        #[source]
        source: StoreError,
    },
}

/// Coarse classification of an [`EntryError`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Fetch,
    LocalIo,
    StoreRead,
    StoreWrite,
}

impl EntryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EntryError::Fetch { .. } => FailureKind::Fetch,
            EntryError::LocalIo { .. } => FailureKind::LocalIo,
            EntryError::StoreRead { .. } => FailureKind::StoreRead,
            EntryError::StoreWrite { .. } => FailureKind::StoreWrite,
        }
    }
}

/// Errors raised by object store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error talking to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode object listing: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("malformed object listing: {0}")]
    MalformedListing(String),

    #[error("AWS credentials not found; set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY")]
    MissingCredentials,

    #[error("invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
