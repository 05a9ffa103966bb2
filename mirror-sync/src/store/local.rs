//! Directory-backed container.
//!
//! Each key is one regular file directly under the root directory.
//! Writes go to `<key>.mirror.tmp` and are renamed into place, so a reader
//! never observes a half-written object.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use mirror_core::{Fingerprint, Presence, StoreObject};

use crate::digest;
use crate::error::{store_io_err, StoreError};
use crate::store::ObjectStore;

const TMP_SUFFIX: &str = ".mirror.tmp";

/// A local directory used as the destination container.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    label: String,
}

impl LocalStore {
    /// No I/O happens here; a missing root surfaces on the first inventory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = root.display().to_string();
        Self { root, label }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let invalid = |reason| StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        };
        if key.is_empty() {
            return Err(invalid("key is empty"));
        }
        if key == "." || key == ".." {
            return Err(invalid("key is a relative path component"));
        }
        if key.contains(['/', '\\', '\0']) {
            return Err(invalid("key contains a path separator"));
        }
        if key.ends_with(TMP_SUFFIX) {
            return Err(invalid("key uses the reserved temp suffix"));
        }
        Ok(self.root.join(key))
    }
}

fn hash_file(path: &Path) -> Result<Fingerprint, StoreError> {
    let file = std::fs::File::open(path).map_err(|e| store_io_err(path, e))?;
    digest::md5_reader(file).map_err(|e| store_io_err(path, e))
}

impl ObjectStore for LocalStore {
    fn container(&self) -> &str {
        &self.label
    }

    fn inventory(&self) -> Result<Vec<StoreObject>, StoreError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| store_io_err(&self.root, e))?;
        let mut objects = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| store_io_err(&self.root, e))?;
            let file_type = entry.file_type().map_err(|e| store_io_err(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let Some(key) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            if key.ends_with(TMP_SUFFIX) {
                continue;
            }
            let fingerprint = hash_file(&entry.path())?;
            objects.push(StoreObject { key, fingerprint });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn fingerprint(&self, key: &str) -> Result<Presence, StoreError> {
        let path = self.object_path(key)?;
        match std::fs::File::open(&path) {
            Ok(file) => digest::md5_reader(file)
                .map(Presence::Present)
                .map_err(|e| store_io_err(&path, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Presence::Absent),
            Err(e) => Err(store_io_err(&path, e)),
        }
    }

    fn put(&self, key: &str, body: &Path, _digest: &Fingerprint) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        let tmp = self.root.join(format!("{key}{TMP_SUFFIX}"));

        std::fs::copy(body, &tmp).map_err(|e| store_io_err(&tmp, e))?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(store_io_err(&path, e));
        }
        tracing::debug!(path = %path.display(), "wrote object");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.object_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_io_err(&path, e)),
        }
    }
}
