//! Bitstream-format registry: MIME types and file extensions.
//!
//! A small built-in table replaces a full format registry. The first
//! extension listed for a MIME type is its primary extension, used when a
//! bitstream has no stored name and a default display name must be derived.

/// Known formats as `(mime type, extensions)`; the first extension is
/// primary.
const KNOWN_FORMATS: &[(&str, &[&str])] = &[
    ("application/pdf", &["pdf"]),
    ("text/plain", &["txt"]),
    ("text/html", &["html", "htm"]),
    ("text/csv", &["csv"]),
    ("application/xml", &["xml"]),
    ("application/json", &["json"]),
    ("image/jpeg", &["jpg", "jpeg"]),
    ("image/png", &["png"]),
    ("image/gif", &["gif"]),
    ("image/tiff", &["tif", "tiff"]),
    ("audio/mpeg", &["mp3"]),
    ("audio/wav", &["wav"]),
    ("video/mp4", &["mp4", "m4v"]),
    ("video/webm", &["webm"]),
    ("application/zip", &["zip"]),
    ("application/msword", &["doc"]),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        &["docx"],
    ),
];

/// Fallback MIME type for anything the registry does not know.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Return the primary extension for a MIME type, if one is registered.
///
/// Any `; charset=...` style parameters on the MIME type are ignored.
pub fn primary_extension(mime_type: &str) -> Option<&'static str> {
    let bare = mime_type.split(';').next().unwrap_or("").trim();
    KNOWN_FORMATS
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(bare))
        .and_then(|(_, exts)| exts.first().copied())
}

/// Return the MIME type registered for a file extension, falling back to
/// [`OCTET_STREAM`].
pub fn mime_for_extension(ext: &str) -> &'static str {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    KNOWN_FORMATS
        .iter()
        .find(|(_, exts)| exts.iter().any(|e| *e == ext))
        .map(|(mime, _)| *mime)
        .unwrap_or(OCTET_STREAM)
}
