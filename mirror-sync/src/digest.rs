//! Content digests compared against store fingerprints.
//!
//! Files are hashed in fixed-size chunks so a large download never has to be
//! resident in memory.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use md5::{Digest, Md5};

use mirror_core::Fingerprint;

use crate::error::EntryError;

/// Read buffer size used while hashing.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase hex MD5 of everything `reader` yields.
pub fn md5_reader<R: Read>(mut reader: R) -> std::io::Result<Fingerprint> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Lowercase hex MD5 of the file at `path`.
pub fn md5_file(path: &Path) -> Result<Fingerprint, EntryError> {
    let local_io = |source| EntryError::LocalIo {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(local_io)?;
    md5_reader(file).map_err(local_io)
}

/// Lowercase hex MD5 of an in-memory buffer.
pub fn md5_bytes(bytes: &[u8]) -> Fingerprint {
    Fingerprint(hex::encode(Md5::digest(bytes)))
}
