//! Mirror core library: domain types, configuration, errors.
//!
//! - [`types`]: source entries, store objects, fingerprints
//! - [`config`]: [`MirrorConfig`] loading and environment overrides
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{MirrorConfig, BUCKET_ENV};
pub use error::ConfigError;
pub use types::{logical_name_of, Fingerprint, Presence, SourceEntry, StoreObject};
