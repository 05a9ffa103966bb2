//! In-process container with an operation log and failure injection.
//!
//! Backs the reconciler tests and embedders that want a container without
//! any I/O.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mirror_core::{Fingerprint, Presence, StoreObject};

use crate::digest;
use crate::error::{store_io_err, StoreError};
use crate::store::ObjectStore;

/// A mutating call observed by a [`MemoryStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put(String),
    Delete(String),
}

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    /// What the inventory reports (an ETag stand-in).
    etag: Fingerprint,
    /// Digest recorded by `put`, preferred by `fingerprint`.
    content_md5: Option<Fingerprint>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    ops: Mutex<Vec<StoreOp>>,
    failing_puts: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    inventory_down: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Seed an object as if it had been uploaded in one part.
    pub fn insert(&self, key: &str, body: &[u8]) {
        let etag = digest::md5_bytes(body);
        lock(&self.objects).insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                etag,
                content_md5: None,
            },
        );
    }

    /// Seed an object whose listed fingerprint is not its content MD5, as a
    /// multipart upload would leave it. `content_md5` is the recorded
    /// metadata, if any.
    pub fn insert_with_etag(
        &self,
        key: &str,
        body: &[u8],
        etag: &str,
        content_md5: Option<Fingerprint>,
    ) {
        lock(&self.objects).insert(
            key.to_string(),
            StoredObject {
                body: body.to_vec(),
                etag: Fingerprint::from(etag),
                content_md5,
            },
        );
    }

    pub fn fail_put(&self, key: &str) {
        lock(&self.failing_puts).insert(key.to_string());
    }

    pub fn fail_delete(&self, key: &str) {
        lock(&self.failing_deletes).insert(key.to_string());
    }

    pub fn fail_inventory(&self, down: bool) {
        self.inventory_down.store(down, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn body(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).map(|o| o.body.clone())
    }

    /// Mutations in the order they were applied.
    pub fn ops(&self) -> Vec<StoreOp> {
        lock(&self.ops).clone()
    }

    pub fn clear_ops(&self) {
        lock(&self.ops).clear();
    }
}

impl ObjectStore for MemoryStore {
    fn container(&self) -> &str {
        &self.name
    }

    fn inventory(&self) -> Result<Vec<StoreObject>, StoreError> {
        if self.inventory_down.load(Ordering::SeqCst) {
            return Err(StoreError::Transport {
                endpoint: format!("memory://{}", self.name),
                reason: "inventory unavailable".to_string(),
            });
        }
        Ok(lock(&self.objects)
            .iter()
            .map(|(key, object)| StoreObject::new(key.clone(), object.etag.clone()))
            .collect())
    }

    fn fingerprint(&self, key: &str) -> Result<Presence, StoreError> {
        Ok(match lock(&self.objects).get(key) {
            Some(object) => Presence::Present(
                object
                    .content_md5
                    .clone()
                    .unwrap_or_else(|| object.etag.clone()),
            ),
            None => Presence::Absent,
        })
    }

    fn put(&self, key: &str, body: &Path, content_md5: &Fingerprint) -> Result<(), StoreError> {
        if lock(&self.failing_puts).contains(key) {
            return Err(StoreError::Status {
                operation: "PutObject",
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        let bytes = std::fs::read(body).map_err(|e| store_io_err(body, e))?;
        let etag = digest::md5_bytes(&bytes);
        lock(&self.objects).insert(
            key.to_string(),
            StoredObject {
                body: bytes,
                etag,
                content_md5: Some(content_md5.clone()),
            },
        );
        lock(&self.ops).push(StoreOp::Put(key.to_string()));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if lock(&self.failing_deletes).contains(key) {
            return Err(StoreError::Status {
                operation: "DeleteObject",
                status: 403,
                body: "injected failure".to_string(),
            });
        }
        lock(&self.objects).remove(key);
        lock(&self.ops).push(StoreOp::Delete(key.to_string()));
        Ok(())
    }
}
