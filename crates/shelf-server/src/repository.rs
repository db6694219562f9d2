//! Bitstream repository: metadata lookup and content access.

use std::path::PathBuf;

use async_trait::async_trait;

use shelf_core::{BitstreamId, Error, Result};
use shelf_db::{assetstore, queries, Bitstream};

use crate::session::Session;
use crate::source::ByteSource;

/// Looks up bitstream metadata and opens its content for streaming.
///
/// The lookup is synchronous (SQLite through the session's pooled
/// connection); opening content is async because it touches the
/// filesystem.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Fetch metadata for a bitstream, or `None` when it does not exist.
    fn lookup(&self, session: &Session, id: BitstreamId) -> Result<Option<Bitstream>>;

    /// Open the raw stored content of a bitstream.
    async fn open_stream(&self, bitstream: &Bitstream) -> Result<ByteSource>;
}

/// Repository backed by SQLite metadata and the on-disk asset store.
pub struct AssetRepository {
    assetstore: PathBuf,
}

impl AssetRepository {
    pub fn new(assetstore: impl Into<PathBuf>) -> Self {
        Self {
            assetstore: assetstore.into(),
        }
    }
}

#[async_trait]
impl Repository for AssetRepository {
    fn lookup(&self, session: &Session, id: BitstreamId) -> Result<Option<Bitstream>> {
        session.with_conn(|conn| queries::bitstreams::get_bitstream(conn, id))
    }

    async fn open_stream(&self, bitstream: &Bitstream) -> Result<ByteSource> {
        let path = assetstore::path_for(&self.assetstore, &bitstream.internal_id)?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            // Metadata without content is a store inconsistency, not a 404.
            Error::Internal(format!(
                "assetstore content missing for bitstream {}: {e}",
                bitstream.id
            ))
        })?;
        Ok(Box::new(file))
    }
}
