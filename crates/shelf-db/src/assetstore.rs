//! File-backed asset store.
//!
//! Content files are stored under the assetstore root in a three-level
//! sharded layout derived from a random hex internal ID:
//! `aa/bb/cc/aabbcc...`. Ingest computes the SHA-256 digest while copying
//! so the stored checksum always matches the stored bytes.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use shelf_core::{Error, Result};
use uuid::Uuid;

/// Copy-buffer size for ingest; a multiple of common filesystem blocks.
const INGEST_BUFFER: usize = 64 * 1024;

/// Outcome of storing a file in the asset store.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    /// Opaque key locating the content file (32 hex chars).
    pub internal_id: String,
    /// Hex SHA-256 digest of the stored bytes.
    pub checksum: String,
    /// Number of bytes stored.
    pub size_bytes: i64,
}

/// Resolve the on-disk path for an internal ID.
///
/// Rejects IDs that are too short or contain path separators; the internal
/// ID is an opaque key, never a client-supplied path.
pub fn path_for(root: &Path, internal_id: &str) -> Result<PathBuf> {
    if internal_id.len() < 6 || !internal_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Internal(format!(
            "malformed assetstore internal id: {internal_id}"
        )));
    }
    Ok(root
        .join(&internal_id[0..2])
        .join(&internal_id[2..4])
        .join(&internal_id[4..6])
        .join(internal_id))
}

/// Store a file into the asset store, returning its internal ID, checksum,
/// and size.
pub fn store(root: &Path, source: &Path) -> Result<StoredAsset> {
    let internal_id = Uuid::new_v4().simple().to_string();
    let dest = path_for(root, &internal_id)?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut reader = fs::File::open(source)?;
    let mut writer = fs::File::create(&dest)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; INGEST_BUFFER];
    let mut size_bytes: i64 = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        size_bytes += n as i64;
    }
    writer.flush()?;

    let checksum = hex::encode(hasher.finalize());
    tracing::debug!(internal_id, size_bytes, "stored asset");

    Ok(StoredAsset {
        internal_id,
        checksum,
        size_bytes,
    })
}
