//! Byte-source abstraction for streamed content.

use tokio::io::{AsyncRead, AsyncSeek};

/// A readable, forward-seekable stream of content bytes.
///
/// Implemented by `tokio::fs::File` for raw assetstore content and by
/// `std::io::Cursor` for rendered in-memory documents.
pub trait SourceStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SourceStream for T {}

impl std::fmt::Debug for dyn SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SourceStream")
    }
}

/// An exclusively-owned byte source, positioned at offset 0 when opened.
///
/// Released exactly once on every exit path by drop semantics, including
/// when the peer aborts the transfer and the response body is dropped
/// mid-stream.
pub type ByteSource = Box<dyn SourceStream>;
