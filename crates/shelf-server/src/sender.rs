//! Transfer sender: response assembly and body streaming.
//!
//! [`BitstreamSender`] takes the metadata of a resolved bitstream plus the
//! client's request headers, negotiates the range/conditional outcome, and
//! assembles the HTTP response: status, headers with an exact
//! `Content-Length` for every case (including the serialized
//! `multipart/byteranges` body), and a chunked body that copies from the
//! byte source through a fixed-size buffer.
//!
//! A transfer that ends early (the common case: a media player probing for
//! range support, then dropping the connection) is a debug-level event, not
//! a server failure; the byte source is released when the body stream is
//! dropped.

use std::io::{self, SeekFrom};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use shelf_core::{Error, Result};

use crate::range::{self, ByteRange, Disposition, ResourceMeta};
use crate::source::ByteSource;

/// Boundary marker for `multipart/byteranges` bodies.
const MULTIPART_BOUNDARY: &str = "SHELF_BYTERANGES";

// ---------------------------------------------------------------------------
// SenderParams
// ---------------------------------------------------------------------------

/// Everything the sender needs besides the byte source itself.
#[derive(Debug, Clone)]
pub struct SenderParams {
    /// Resolved display name (used in `Content-Disposition`).
    pub name: String,
    pub mime_type: String,
    /// Total length of the stream being served.
    pub length: u64,
    /// Stored content digest; `None` for transformed streams, whose bytes
    /// the stored digest does not describe.
    pub checksum: Option<String>,
    pub last_modified: DateTime<Utc>,
    /// Copy-buffer size for the streaming loop.
    pub buffer_size: usize,
    /// Whether byte-range negotiation applies to this stream.
    pub range_supported: bool,
}

// ---------------------------------------------------------------------------
// BitstreamSender
// ---------------------------------------------------------------------------

/// Assembles and streams one bitstream response.
pub struct BitstreamSender {
    params: SenderParams,
    disposition: Disposition,
    range_requested: bool,
}

impl BitstreamSender {
    /// Negotiate the request headers against the resource metadata.
    ///
    /// For transformed streams range and validator negotiation is skipped
    /// entirely: the stored size and checksum do not describe the rendered
    /// bytes, so the full rendered body is served.
    pub fn negotiate(params: SenderParams, request_headers: &HeaderMap) -> Self {
        let range_requested = request_headers.contains_key(header::RANGE);
        let disposition = if params.range_supported {
            range::negotiate(
                request_headers,
                &ResourceMeta {
                    length: params.length,
                    checksum: params.checksum.as_deref(),
                    last_modified: params.last_modified,
                },
            )
        } else {
            Disposition::FullBody
        };

        Self {
            params,
            disposition,
            range_requested,
        }
    }

    /// True when the client sent no `Range` header at all.
    ///
    /// Telemetry keys off this: browsers and media players issue a plain
    /// request first to probe for range support, and only that first
    /// request counts as a view.
    pub fn is_no_range_request(&self) -> bool {
        !self.range_requested
    }

    /// True when the negotiated outcome carries a body worth streaming.
    ///
    /// Callers must check this before invoking the body write and skip it
    /// entirely when invalid; status and headers are correct either way.
    pub fn is_valid(&self) -> bool {
        matches!(
            self.disposition,
            Disposition::FullBody | Disposition::SingleRange(_) | Disposition::MultiRange(_)
        )
    }

    /// Negotiated response status.
    pub fn status(&self) -> StatusCode {
        match &self.disposition {
            Disposition::NotModified => StatusCode::NOT_MODIFIED,
            Disposition::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            Disposition::FullBody => StatusCode::OK,
            Disposition::SingleRange(_) | Disposition::MultiRange(_) => {
                StatusCode::PARTIAL_CONTENT
            }
            Disposition::Unsatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    /// Exact serialized body length for the negotiated outcome.
    ///
    /// `None` only for 304, which carries no length at all.
    fn content_length(&self) -> Option<u64> {
        match &self.disposition {
            Disposition::NotModified => None,
            Disposition::PreconditionFailed | Disposition::Unsatisfiable => Some(0),
            Disposition::FullBody => Some(self.params.length),
            Disposition::SingleRange(r) => Some(r.len()),
            Disposition::MultiRange(ranges) => Some(
                ranges
                    .iter()
                    .map(|r| self.part_header(r).len() as u64 + r.len())
                    .sum::<u64>()
                    + multipart_trailer().len() as u64,
            ),
        }
    }

    /// Sub-header block introducing one part of a multipart body.
    fn part_header(&self, r: &ByteRange) -> String {
        format!(
            "\r\n--{MULTIPART_BOUNDARY}\r\nContent-Type: {}\r\nContent-Range: {}\r\n\r\n",
            self.params.mime_type,
            r.content_range(self.params.length),
        )
    }

    /// Response headers for the negotiated outcome.
    fn response_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        // Advertised unconditionally so clients know ranged requests work.
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(
            header::LAST_MODIFIED,
            header_value(&range::fmt_http_date(self.params.last_modified))?,
        );
        if let Some(checksum) = &self.params.checksum {
            headers.insert(header::ETAG, header_value(&range::quote_etag(checksum))?);
        }

        if matches!(self.disposition, Disposition::NotModified) {
            return Ok(headers);
        }

        if let Some(length) = self.content_length() {
            headers.insert(
                header::CONTENT_LENGTH,
                header_value(&length.to_string())?,
            );
        }

        match &self.disposition {
            Disposition::FullBody | Disposition::SingleRange(_) => {
                headers.insert(header::CONTENT_TYPE, header_value(&self.params.mime_type)?);
            }
            Disposition::MultiRange(_) => {
                headers.insert(
                    header::CONTENT_TYPE,
                    header_value(&format!(
                        "multipart/byteranges; boundary={MULTIPART_BOUNDARY}"
                    ))?,
                );
            }
            _ => {}
        }

        match &self.disposition {
            Disposition::SingleRange(r) => {
                headers.insert(
                    header::CONTENT_RANGE,
                    header_value(&r.content_range(self.params.length))?,
                );
            }
            Disposition::Unsatisfiable => {
                headers.insert(
                    header::CONTENT_RANGE,
                    header_value(&format!("bytes */{}", self.params.length))?,
                );
            }
            _ => {}
        }

        if self.is_valid() {
            headers.insert(
                header::CONTENT_DISPOSITION,
                header_value(&format!(
                    "inline; filename=\"{}\"",
                    sanitize_filename(&self.params.name)
                ))?,
            );
        }

        Ok(headers)
    }

    /// Build the final response, consuming the byte source.
    ///
    /// The body is streamed only for GET requests with a valid outcome;
    /// HEAD requests and bodyless statuses get the same headers over an
    /// empty body.
    pub fn into_response(self, source: ByteSource, method: &Method) -> Result<Response<Body>> {
        let status = self.status();
        let headers = self.response_headers()?;

        let body = if *method != Method::HEAD && self.is_valid() && self.params.length > 0 {
            let (parts, trailer) = self.body_plan();
            Body::from_stream(body_stream(
                source,
                parts,
                trailer,
                self.params.buffer_size.max(1),
            ))
        } else {
            Body::empty()
        };

        let mut response = Response::builder().status(status);
        if let Some(map) = response.headers_mut() {
            map.extend(headers);
        }
        response
            .body(body)
            .map_err(|e| Error::Internal(format!("failed to build response: {e}")))
    }

    /// Flatten the disposition into a list of parts plus an optional
    /// multipart trailer.
    fn body_plan(&self) -> (Vec<BodyPart>, Option<String>) {
        match &self.disposition {
            Disposition::FullBody => (
                vec![BodyPart {
                    preamble: None,
                    range: ByteRange {
                        start: 0,
                        end: self.params.length - 1,
                    },
                }],
                None,
            ),
            Disposition::SingleRange(r) => (
                vec![BodyPart {
                    preamble: None,
                    range: *r,
                }],
                None,
            ),
            Disposition::MultiRange(ranges) => (
                ranges
                    .iter()
                    .map(|r| BodyPart {
                        preamble: Some(self.part_header(r)),
                        range: *r,
                    })
                    .collect(),
                Some(multipart_trailer()),
            ),
            // is_valid() gates body_plan; bodyless outcomes never reach it.
            _ => (Vec::new(), None),
        }
    }
}

fn multipart_trailer() -> String {
    format!("\r\n--{MULTIPART_BOUNDARY}--\r\n")
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Internal(format!("invalid header value: {e}")))
}

/// Strip quote and control characters so the name embeds safely in a
/// `Content-Disposition` header.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if cleaned.is_empty() {
        "download".into()
    } else {
        cleaned
    }
}

// ---------------------------------------------------------------------------
// Body streaming
// ---------------------------------------------------------------------------

/// One contiguous region of the source, optionally introduced by a
/// multipart sub-header.
struct BodyPart {
    preamble: Option<String>,
    range: ByteRange,
}

/// Logs transfers that end before the planned bytes were written.
///
/// The response body is dropped without reaching `finish()` when the peer
/// disconnects mid-stream; that is expected client behavior, not an error.
struct TransferGuard {
    finished: bool,
}

impl TransferGuard {
    fn new() -> Self {
        Self { finished: false }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                "bitstream transfer ended before completion; client likely disconnected and may \
                 follow up with a range request"
            );
        }
    }
}

/// Stream the planned parts of `source` as chunks of at most `buffer_size`
/// bytes.
///
/// Seeks forward to each part's offset instead of buffering skipped
/// regions; memory use is bounded by one buffer regardless of object size.
fn body_stream(
    mut source: ByteSource,
    parts: Vec<BodyPart>,
    trailer: Option<String>,
    buffer_size: usize,
) -> impl Stream<Item = io::Result<Bytes>> + Send {
    async_stream::try_stream! {
        let mut guard = TransferGuard::new();

        for part in parts {
            if let Some(preamble) = part.preamble {
                yield Bytes::from(preamble);
            }

            source.seek(SeekFrom::Start(part.range.start)).await?;

            let mut remaining = part.range.len();
            while remaining > 0 {
                let cap = buffer_size.min(remaining as usize);
                let mut buf = vec![0u8; cap];
                let n = source.read(&mut buf).await?;
                if n == 0 {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "byte source ended before the advertised length",
                    ))?;
                }
                buf.truncate(n);
                remaining -= n as u64;
                yield Bytes::from(buf);
            }
        }

        if let Some(trailer) = trailer {
            yield Bytes::from(trailer);
        }

        guard.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use futures::StreamExt;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

    fn params(length: u64) -> SenderParams {
        SenderParams {
            name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            length,
            checksum: Some("cafebabe".into()),
            last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            buffer_size: 8,
            range_supported: true,
        }
    }

    fn source_of(bytes: Vec<u8>) -> ByteSource {
        Box::new(Cursor::new(bytes))
    }

    async fn collect(
        stream: impl Stream<Item = io::Result<Bytes>> + Send,
    ) -> io::Result<Vec<u8>> {
        futures::pin_mut!(stream);
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn full_body_round_trips() {
        let data: Vec<u8> = (0..100u8).collect();
        let sender = BitstreamSender::negotiate(params(100), &HeaderMap::new());
        assert_eq!(sender.status(), StatusCode::OK);
        assert!(sender.is_valid());
        assert!(sender.is_no_range_request());

        let (parts, trailer) = sender.body_plan();
        let body = collect(body_stream(source_of(data.clone()), parts, trailer, 8))
            .await
            .unwrap();
        assert_eq!(body, data);
    }

    #[tokio::test]
    async fn single_range_emits_exact_bytes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=9000-"));

        let sender = BitstreamSender::negotiate(params(10_000), &headers);
        assert_eq!(sender.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(sender.content_length(), Some(1000));
        assert!(!sender.is_no_range_request());

        let response_headers = sender.response_headers().unwrap();
        assert_eq!(
            response_headers.get(header::CONTENT_RANGE).unwrap(),
            "bytes 9000-9999/10000"
        );

        let (parts, trailer) = sender.body_plan();
        let body = collect(body_stream(source_of(data.clone()), parts, trailer, 512))
            .await
            .unwrap();
        assert_eq!(body, &data[9000..]);
    }

    #[tokio::test]
    async fn multipart_length_matches_serialized_body() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::RANGE,
            HeaderValue::from_static("bytes=0-9,20-29"),
        );

        let sender = BitstreamSender::negotiate(params(100), &headers);
        assert_eq!(sender.status(), StatusCode::PARTIAL_CONTENT);
        let declared = sender.content_length().unwrap();

        let content_type = sender
            .response_headers()
            .unwrap()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("multipart/byteranges; boundary="));

        let (parts, trailer) = sender.body_plan();
        let body = collect(body_stream(source_of(data.clone()), parts, trailer, 7))
            .await
            .unwrap();
        assert_eq!(body.len() as u64, declared);

        let text = String::from_utf8_lossy(&body);
        assert_eq!(text.matches(MULTIPART_BOUNDARY).count(), 3);
        assert!(text.contains("Content-Range: bytes 0-9/100"));
        assert!(text.contains("Content-Range: bytes 20-29/100"));
    }

    #[test]
    fn unsatisfiable_has_range_hint_and_zero_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=600-700"));

        let sender = BitstreamSender::negotiate(params(500), &headers);
        assert_eq!(sender.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(!sender.is_valid());

        let response_headers = sender.response_headers().unwrap();
        assert_eq!(
            response_headers.get(header::CONTENT_RANGE).unwrap(),
            "bytes */500"
        );
        assert_eq!(response_headers.get(header::CONTENT_LENGTH).unwrap(), "0");
    }

    #[test]
    fn not_modified_omits_length_and_disposition() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_NONE_MATCH,
            HeaderValue::from_static("\"cafebabe\""),
        );

        let sender = BitstreamSender::negotiate(params(100), &headers);
        assert_eq!(sender.status(), StatusCode::NOT_MODIFIED);
        assert!(!sender.is_valid());

        let response_headers = sender.response_headers().unwrap();
        assert!(response_headers.get(header::CONTENT_LENGTH).is_none());
        assert!(response_headers.get(header::CONTENT_DISPOSITION).is_none());
        assert_eq!(
            response_headers.get(header::ETAG).unwrap(),
            "\"cafebabe\""
        );
    }

    #[test]
    fn transformed_stream_ignores_range_header() {
        let mut p = params(2150);
        p.range_supported = false;
        p.checksum = None;
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=0-9"));

        let sender = BitstreamSender::negotiate(p, &headers);
        assert_eq!(sender.status(), StatusCode::OK);
        assert_eq!(sender.content_length(), Some(2150));
        // The probe still counts as a range request for telemetry purposes.
        assert!(!sender.is_no_range_request());

        let response_headers = sender.response_headers().unwrap();
        assert!(response_headers.get(header::ETAG).is_none());
        assert_eq!(
            response_headers.get(header::ACCEPT_RANGES).unwrap(),
            "bytes"
        );
    }

    #[tokio::test]
    async fn head_request_gets_headers_without_body() {
        let sender = BitstreamSender::negotiate(params(100), &HeaderMap::new());
        let response = sender
            .into_response(source_of(vec![0u8; 100]), &Method::HEAD)
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_LENGTH).unwrap(),
            "100"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn filename_is_sanitized() {
        assert_eq!(sanitize_filename("plain.pdf"), "plain.pdf");
        assert_eq!(sanitize_filename("we\"ird\\.pdf"), "weird.pdf");
        assert_eq!(sanitize_filename("\u{7}"), "download");
    }

    // -- byte-source release ------------------------------------------------

    /// Cursor wrapper that counts drops, to observe source release.
    struct TrackedSource {
        inner: Cursor<Vec<u8>>,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for TrackedSource {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl AsyncRead for TrackedSource {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncSeek for TrackedSource {
        fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
            Pin::new(&mut self.inner).start_seek(position)
        }

        fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
            Pin::new(&mut self.inner).poll_complete(cx)
        }
    }

    #[tokio::test]
    async fn aborted_transfer_releases_source_exactly_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let source: ByteSource = Box::new(TrackedSource {
            inner: Cursor::new(vec![0u8; 10_000]),
            drops: drops.clone(),
        });

        let parts = vec![BodyPart {
            preamble: None,
            range: ByteRange {
                start: 0,
                end: 9999,
            },
        }];

        {
            let stream = body_stream(source, parts, None, 64);
            futures::pin_mut!(stream);
            // Pull a single chunk, then drop the stream mid-transfer as a
            // disconnecting client would.
            let first = stream.next().await.unwrap().unwrap();
            assert_eq!(first.len(), 64);
        }

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn truncated_source_surfaces_unexpected_eof() {
        // Source advertises 100 bytes but only holds 10.
        let parts = vec![BodyPart {
            preamble: None,
            range: ByteRange { start: 0, end: 99 },
        }];
        let err = collect(body_stream(source_of(vec![1u8; 10]), parts, None, 64))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
