//! Byte-range and conditional-request negotiation.
//!
//! [`negotiate`] classifies a request against a resource's length, checksum
//! (served as a strong ETag) and last-modified time. It is pure with
//! respect to its inputs: identical headers and metadata always produce the
//! same [`Disposition`], which keeps it independently testable.
//!
//! Range grammar follows RFC 7233: bounded (`bytes=0-499`), open-ended
//! (`bytes=500-`), and suffix (`bytes=-500`) ranges, with multiple
//! comma-separated specs. A syntactically malformed header is ignored (full
//! body); a parseable set whose ranges overlap or fall outside the resource
//! is rejected as a unit (416).

use axum::http::{header, HeaderMap, HeaderName};
use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// ByteRange
// ---------------------------------------------------------------------------

/// An inclusive byte range within a resource of known total length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset (0-indexed).
    pub start: u64,
    /// Last byte offset (inclusive, `< total`).
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)] // an accepted range is never empty
impl ByteRange {
    /// Number of bytes covered by this range.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for this range.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// Outcome of negotiating conditional and range headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A cache validator matched; respond 304 with no body.
    NotModified,
    /// An `If-Match`/`If-Unmodified-Since` precondition failed; respond 412.
    PreconditionFailed,
    /// Serve the whole resource with status 200.
    FullBody,
    /// Serve one contiguous range with status 206.
    SingleRange(ByteRange),
    /// Serve several non-overlapping ranges as `multipart/byteranges`.
    MultiRange(Vec<ByteRange>),
    /// No requested range intersects the resource; respond 416.
    Unsatisfiable,
}

/// Resource metadata that negotiation validates against.
#[derive(Debug, Clone, Copy)]
pub struct ResourceMeta<'a> {
    /// Total resource length in bytes.
    pub length: u64,
    /// Opaque hex digest used as a strong ETag, when known.
    pub checksum: Option<&'a str>,
    /// Last modification instant (compared at second granularity).
    pub last_modified: DateTime<Utc>,
}

/// Negotiate conditional and range headers against resource metadata.
pub fn negotiate(headers: &HeaderMap, meta: &ResourceMeta) -> Disposition {
    let etag = meta.checksum.map(quote_etag);

    // Precondition order per RFC 7232 section 6.
    if let Some(value) = header_str(headers, &header::IF_MATCH) {
        if !etag_list_matches(value, etag.as_deref()) {
            return Disposition::PreconditionFailed;
        }
    } else if let Some(value) = header_str(headers, &header::IF_UNMODIFIED_SINCE) {
        if let Some(since) = parse_http_date(value) {
            if meta.last_modified.timestamp() > since.timestamp() {
                return Disposition::PreconditionFailed;
            }
        }
    }

    if let Some(value) = header_str(headers, &header::IF_NONE_MATCH) {
        if etag_list_matches(value, etag.as_deref()) {
            return Disposition::NotModified;
        }
    } else if let Some(value) = header_str(headers, &header::IF_MODIFIED_SINCE) {
        if let Some(since) = parse_http_date(value) {
            if meta.last_modified.timestamp() <= since.timestamp() {
                return Disposition::NotModified;
            }
        }
    }

    let Some(raw) = header_str(headers, &header::RANGE) else {
        return Disposition::FullBody;
    };

    // If-Range: a stale validator downgrades the range request to the full
    // body, never to an error.
    if let Some(validator) = header_str(headers, &header::IF_RANGE) {
        if !if_range_matches(validator, etag.as_deref(), meta.last_modified) {
            return Disposition::FullBody;
        }
    }

    match parse_ranges(raw, meta.length) {
        RangeParse::Malformed => Disposition::FullBody,
        RangeParse::Unsatisfiable => Disposition::Unsatisfiable,
        RangeParse::Ranges(mut ranges) => {
            if ranges.len() == 1 {
                Disposition::SingleRange(ranges.remove(0))
            } else {
                Disposition::MultiRange(ranges)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Range parsing
// ---------------------------------------------------------------------------

enum RangeParse {
    /// Header did not follow the `bytes=` grammar; ignore it.
    Malformed,
    /// Every parsed range misses the resource, or the set overlaps.
    Unsatisfiable,
    Ranges(Vec<ByteRange>),
}

fn parse_ranges(raw: &str, total: u64) -> RangeParse {
    let Some(spec) = raw.strip_prefix("bytes=") else {
        return RangeParse::Malformed;
    };

    if total == 0 {
        // No byte of an empty resource is addressable.
        return RangeParse::Unsatisfiable;
    }

    let mut ranges = Vec::new();
    for token in spec.split(',') {
        let token = token.trim();
        let Some(dash) = token.find('-') else {
            return RangeParse::Malformed;
        };
        let (first, rest) = token.split_at(dash);
        let last = &rest[1..];

        if first.is_empty() {
            // Suffix range: the last N bytes.
            let Ok(n) = last.parse::<u64>() else {
                return RangeParse::Malformed;
            };
            if n == 0 {
                return RangeParse::Unsatisfiable;
            }
            ranges.push(ByteRange {
                start: total.saturating_sub(n),
                end: total - 1,
            });
        } else {
            let Ok(start) = first.parse::<u64>() else {
                return RangeParse::Malformed;
            };
            let end = if last.is_empty() {
                total - 1
            } else {
                match last.parse::<u64>() {
                    Ok(end) => end,
                    Err(_) => return RangeParse::Malformed,
                }
            };
            if start > end {
                return RangeParse::Malformed;
            }
            if start >= total {
                // Out-of-bounds ranges reject the whole set.
                return RangeParse::Unsatisfiable;
            }
            ranges.push(ByteRange {
                start,
                end: end.min(total - 1),
            });
        }
    }

    if ranges.is_empty() {
        return RangeParse::Malformed;
    }
    if overlaps(&ranges) {
        return RangeParse::Unsatisfiable;
    }
    RangeParse::Ranges(ranges)
}

/// True when any two ranges in the set share a byte.
fn overlaps(ranges: &[ByteRange]) -> bool {
    let mut sorted: Vec<&ByteRange> = ranges.iter().collect();
    sorted.sort_by_key(|r| r.start);
    sorted.windows(2).any(|w| w[0].end >= w[1].start)
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

/// Quote a checksum for use as a strong ETag.
pub fn quote_etag(checksum: &str) -> String {
    format!("\"{checksum}\"")
}

/// Match a comma-separated ETag list (or `*`) against the resource's ETag.
///
/// Weak tags (`W/"..."`) never match; the checksum-backed ETag is strong.
fn etag_list_matches(value: &str, etag: Option<&str>) -> bool {
    if value.trim() == "*" {
        return true;
    }
    let Some(etag) = etag else {
        return false;
    };
    value.split(',').any(|candidate| candidate.trim() == etag)
}

/// Evaluate an `If-Range` validator: either a strong ETag or an HTTP date
/// equal (to the second) to the last-modified instant.
fn if_range_matches(validator: &str, etag: Option<&str>, last_modified: DateTime<Utc>) -> bool {
    let validator = validator.trim();
    if validator.starts_with('"') || validator.starts_with("W/") {
        return etag.is_some_and(|tag| validator == tag);
    }
    parse_http_date(validator)
        .is_some_and(|date| date.timestamp() == last_modified.timestamp())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ---------------------------------------------------------------------------
// HTTP dates
// ---------------------------------------------------------------------------

/// Format an instant as an RFC 1123 HTTP date (`Last-Modified` etc.).
pub fn fmt_http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse an HTTP date header value.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    fn meta(length: u64) -> ResourceMeta<'static> {
        ResourceMeta {
            length,
            checksum: Some("cafebabe"),
            last_modified: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn no_range_header_is_full_body() {
        assert_eq!(negotiate(&headers(&[]), &meta(100)), Disposition::FullBody);
    }

    #[test]
    fn bounded_range() {
        let d = negotiate(&headers(&[("range", "bytes=0-499")]), &meta(10_000));
        assert_eq!(d, Disposition::SingleRange(ByteRange { start: 0, end: 499 }));
    }

    #[test]
    fn open_ended_range() {
        let d = negotiate(&headers(&[("range", "bytes=9000-")]), &meta(10_000));
        assert_eq!(
            d,
            Disposition::SingleRange(ByteRange {
                start: 9000,
                end: 9999
            })
        );
    }

    #[test]
    fn suffix_range() {
        let d = negotiate(&headers(&[("range", "bytes=-500")]), &meta(10_000));
        assert_eq!(
            d,
            Disposition::SingleRange(ByteRange {
                start: 9500,
                end: 9999
            })
        );
    }

    #[test]
    fn suffix_longer_than_resource_serves_whole() {
        let d = negotiate(&headers(&[("range", "bytes=-500")]), &meta(100));
        assert_eq!(d, Disposition::SingleRange(ByteRange { start: 0, end: 99 }));
    }

    #[test]
    fn end_clamped_to_length() {
        let d = negotiate(&headers(&[("range", "bytes=50-5000")]), &meta(100));
        assert_eq!(d, Disposition::SingleRange(ByteRange { start: 50, end: 99 }));
    }

    #[test]
    fn start_past_end_of_resource_is_unsatisfiable() {
        let d = negotiate(&headers(&[("range", "bytes=600-700")]), &meta(500));
        assert_eq!(d, Disposition::Unsatisfiable);
    }

    #[test]
    fn start_at_length_is_unsatisfiable() {
        let d = negotiate(&headers(&[("range", "bytes=100-")]), &meta(100));
        assert_eq!(d, Disposition::Unsatisfiable);
    }

    #[test]
    fn any_range_on_empty_resource_is_unsatisfiable() {
        let d = negotiate(&headers(&[("range", "bytes=0-0")]), &meta(0));
        assert_eq!(d, Disposition::Unsatisfiable);
    }

    #[test]
    fn multi_range() {
        let d = negotiate(&headers(&[("range", "bytes=0-9,20-29")]), &meta(100));
        assert_eq!(
            d,
            Disposition::MultiRange(vec![
                ByteRange { start: 0, end: 9 },
                ByteRange { start: 20, end: 29 }
            ])
        );
    }

    #[test]
    fn overlapping_ranges_rejected_as_unit() {
        let d = negotiate(&headers(&[("range", "bytes=0-50,40-60")]), &meta(100));
        assert_eq!(d, Disposition::Unsatisfiable);
    }

    #[test]
    fn mixed_satisfiable_and_unsatisfiable_rejected_as_unit() {
        let d = negotiate(&headers(&[("range", "bytes=0-9,500-600")]), &meta(100));
        assert_eq!(d, Disposition::Unsatisfiable);
    }

    #[test]
    fn malformed_units_fall_back_to_full_body() {
        assert_eq!(
            negotiate(&headers(&[("range", "chunks=0-9")]), &meta(100)),
            Disposition::FullBody
        );
        assert_eq!(
            negotiate(&headers(&[("range", "bytes=abc-def")]), &meta(100)),
            Disposition::FullBody
        );
        assert_eq!(
            negotiate(&headers(&[("range", "bytes=9-5")]), &meta(100)),
            Disposition::FullBody
        );
        assert_eq!(
            negotiate(&headers(&[("range", "bytes=")]), &meta(100)),
            Disposition::FullBody
        );
    }

    #[test]
    fn determinism() {
        let h = headers(&[("range", "bytes=10-20")]);
        let m = meta(100);
        assert_eq!(negotiate(&h, &m), negotiate(&h, &m));
    }

    #[test]
    fn if_range_with_matching_etag_keeps_range() {
        let h = headers(&[("range", "bytes=0-9"), ("if-range", "\"cafebabe\"")]);
        let d = negotiate(&h, &meta(100));
        assert_eq!(d, Disposition::SingleRange(ByteRange { start: 0, end: 9 }));
    }

    #[test]
    fn if_range_with_stale_etag_downgrades_to_full_body() {
        let h = headers(&[("range", "bytes=0-9"), ("if-range", "\"deadbeef\"")]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::FullBody);
    }

    #[test]
    fn if_range_with_matching_date_keeps_range() {
        let m = meta(100);
        let h = headers(&[
            ("range", "bytes=0-9"),
            ("if-range", &fmt_http_date(m.last_modified)),
        ]);
        assert_eq!(
            negotiate(&h, &m),
            Disposition::SingleRange(ByteRange { start: 0, end: 9 })
        );
    }

    #[test]
    fn if_range_with_old_date_downgrades_to_full_body() {
        let h = headers(&[
            ("range", "bytes=0-9"),
            ("if-range", "Mon, 01 Jan 2001 00:00:00 GMT"),
        ]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::FullBody);
    }

    #[test]
    fn if_none_match_hit_is_not_modified() {
        let h = headers(&[("if-none-match", "\"cafebabe\"")]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::NotModified);
    }

    #[test]
    fn if_none_match_star_is_not_modified() {
        let h = headers(&[("if-none-match", "*")]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::NotModified);
    }

    #[test]
    fn if_none_match_miss_serves_body() {
        let h = headers(&[("if-none-match", "\"other\"")]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::FullBody);
    }

    #[test]
    fn if_modified_since_not_modified() {
        let m = meta(100);
        let h = headers(&[("if-modified-since", &fmt_http_date(m.last_modified))]);
        assert_eq!(negotiate(&h, &m), Disposition::NotModified);
    }

    #[test]
    fn if_modified_since_older_date_serves_body() {
        let h = headers(&[("if-modified-since", "Mon, 01 Jan 2001 00:00:00 GMT")]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::FullBody);
    }

    #[test]
    fn if_match_miss_is_precondition_failed() {
        let h = headers(&[("if-match", "\"other\"")]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::PreconditionFailed);
    }

    #[test]
    fn if_match_hit_proceeds_to_range() {
        let h = headers(&[("if-match", "\"cafebabe\""), ("range", "bytes=0-0")]);
        assert_eq!(
            negotiate(&h, &meta(100)),
            Disposition::SingleRange(ByteRange { start: 0, end: 0 })
        );
    }

    #[test]
    fn if_unmodified_since_past_date_is_precondition_failed() {
        let h = headers(&[("if-unmodified-since", "Mon, 01 Jan 2001 00:00:00 GMT")]);
        assert_eq!(negotiate(&h, &meta(100)), Disposition::PreconditionFailed);
    }

    #[test]
    fn http_date_round_trip() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let s = fmt_http_date(t);
        assert_eq!(s, "Fri, 01 Mar 2024 12:00:00 GMT");
        assert_eq!(parse_http_date(&s), Some(t));
    }

    #[test]
    fn content_range_format() {
        let r = ByteRange {
            start: 9000,
            end: 9999,
        };
        assert_eq!(r.content_range(10_000), "bytes 9000-9999/10000");
        assert_eq!(r.len(), 1000);
    }
}
