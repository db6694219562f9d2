//! Citation cover-page rendering.
//!
//! Some deployments prepend a generated citation page to eligible
//! documents at delivery time. The engine decides eligibility per request
//! and produces the rendered bytes as an in-memory source; rendered output
//! has its own length and is served without range support, since the
//! stored metadata no longer describes the bytes on the wire.

use async_trait::async_trait;

use shelf_core::{Error, Result};
use shelf_db::Bitstream;

use crate::session::Session;
use crate::source::ByteSource;

/// A rendered document ready for streaming.
pub struct RenderedDocument {
    pub source: ByteSource,
    /// Length of the rendered bytes; zero is treated as a render failure.
    pub length: u64,
}

/// Decides whether a bitstream gets a citation cover page and renders it.
#[async_trait]
pub trait CitationEngine: Send + Sync {
    /// Whether this bitstream should be served with a citation page for
    /// this session.
    fn is_eligible(&self, bitstream: &Bitstream, session: &Session) -> bool;

    /// Render the document with its citation page prepended.
    async fn render(&self, bitstream: &Bitstream, session: &Session) -> Result<RenderedDocument>;
}

/// Default engine: citation rendering switched off.
pub struct CitationDisabled;

#[async_trait]
impl CitationEngine for CitationDisabled {
    fn is_eligible(&self, _bitstream: &Bitstream, _session: &Session) -> bool {
        false
    }

    async fn render(&self, bitstream: &Bitstream, _session: &Session) -> Result<RenderedDocument> {
        Err(Error::Citation(format!(
            "citation rendering is disabled; cannot render bitstream {}",
            bitstream.id
        )))
    }
}
