//! Destination object stores.
//!
//! [`ObjectStore`] is the seam between the reconciler and a concrete
//! container. Every backend must honour two contracts:
//!
//! - `put` creates or overwrites; there is no separate update verb.
//! - `delete` on an absent key succeeds.

use std::path::Path;

use mirror_core::{Fingerprint, Presence, StoreObject};

use crate::error::StoreError;

pub mod local;
pub mod memory;
pub mod s3;
mod sigv4;

pub use local::LocalStore;
pub use memory::{MemoryStore, StoreOp};
pub use s3::{S3Credentials, S3Store};

/// A flat key space holding one object per key.
pub trait ObjectStore: Send + Sync {
    /// Container identity (bucket name, directory), used in logs and summaries.
    fn container(&self) -> &str;

    /// Every object in the container, with pagination fully drained.
    fn inventory(&self) -> Result<Vec<StoreObject>, StoreError>;

    /// Content fingerprint of a single key.
    ///
    /// Backends that record their own content digest on `put` return it
    /// here in preference to a store-assigned token.
    fn fingerprint(&self, key: &str) -> Result<Presence, StoreError>;

    /// Upload the file at `body` under `key`. `digest` is its local MD5.
    fn put(&self, key: &str, body: &Path, digest: &Fingerprint) -> Result<(), StoreError>;

    fn delete(&self, key: &str) -> Result<(), StoreError>;
}
