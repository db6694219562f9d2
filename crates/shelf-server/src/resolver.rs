//! Content resolution: from bitstream ID to a streamable source.
//!
//! The resolver decides, per request, whether to serve the raw stored
//! bytes or a citation-transformed rendering, and opens the matching byte
//! source. The decision is made once here; everything downstream (length,
//! range support, checksum validators) follows from it.

use shelf_core::{format, BitstreamId, Error, Result};
use shelf_db::Bitstream;

use crate::citation::CitationEngine;
use crate::repository::Repository;
use crate::session::Session;
use crate::source::ByteSource;

/// Which content variant a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    /// The stored bytes, exactly as ingested. Range requests apply.
    Raw,
    /// A citation-transformed rendering. Served whole; the stored size and
    /// checksum do not describe these bytes.
    Transformed,
}

/// A resolved bitstream with an open byte source.
#[derive(Debug)]
pub struct ResolvedContent {
    pub bitstream: Bitstream,
    pub source: ByteSource,
    /// Length of the bytes that will actually be sent.
    pub length: u64,
    pub decision: DeliveryDecision,
}

/// Resolve a bitstream ID into streamable content.
///
/// Returns `Ok(None)` when no such bitstream exists. A citation rendering
/// that comes back empty is a hard failure: serving zero bytes in place of
/// a document would silently corrupt downloads.
pub async fn resolve(
    repository: &dyn Repository,
    citation: &dyn CitationEngine,
    session: &Session,
    id: BitstreamId,
) -> Result<Option<ResolvedContent>> {
    let Some(bitstream) = repository.lookup(session, id)? else {
        return Ok(None);
    };

    if citation.is_eligible(&bitstream, session) {
        let rendered = citation.render(&bitstream, session).await?;
        if rendered.length == 0 {
            tracing::error!(
                bitstream = %bitstream.id,
                "citation engine produced an empty document"
            );
            return Err(Error::Citation(format!(
                "citation engine produced an empty document for bitstream {}",
                bitstream.id
            )));
        }
        tracing::debug!(
            bitstream = %bitstream.id,
            stored = bitstream.size_bytes,
            rendered = rendered.length,
            "serving citation-transformed content"
        );
        return Ok(Some(ResolvedContent {
            bitstream,
            source: rendered.source,
            length: rendered.length,
            decision: DeliveryDecision::Transformed,
        }));
    }

    let source = repository.open_stream(&bitstream).await?;
    let length = bitstream.size_bytes.max(0) as u64;
    Ok(Some(ResolvedContent {
        bitstream,
        source,
        length,
        decision: DeliveryDecision::Raw,
    }))
}

/// Display name for a bitstream, used in `Content-Disposition`.
///
/// Nameless bitstreams get `{id}.{ext}` with the extension derived from
/// the stored format; when the format registry knows no extension, the
/// bare identifier is used.
pub fn display_name(bitstream: &Bitstream) -> String {
    match &bitstream.name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => match format::primary_extension(&bitstream.mime_type) {
            Some(ext) => format!("{}.{ext}", bitstream.id),
            None => bitstream.id.to_string(),
        },
    }
}
