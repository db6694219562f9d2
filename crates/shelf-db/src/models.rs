//! Row models and `from_row` mappers.

use chrono::{DateTime, Utc};
use shelf_core::BitstreamId;

/// Parse a TEXT column into a typed ID.
fn parse_id<T: std::str::FromStr>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    s.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid UUID: {s}").into(),
        )
    })
}

// ---------------------------------------------------------------------------
// Bitstream
// ---------------------------------------------------------------------------

/// Metadata row describing one stored bitstream.
///
/// The content itself lives in the asset store under `internal_id`; this
/// row carries everything the delivery pipeline needs without touching the
/// content file.
#[derive(Debug, Clone)]
pub struct Bitstream {
    pub id: BitstreamId,
    /// Stored display name; `None` means a default name is derived from the
    /// ID and the format's primary extension at delivery time.
    pub name: Option<String>,
    pub size_bytes: i64,
    /// Hex digest of the content.
    pub checksum: String,
    pub checksum_algorithm: String,
    pub mime_type: String,
    /// Opaque key locating the content file in the asset store.
    pub internal_id: String,
    /// RFC 3339 timestamp of the last metadata/content change.
    pub last_modified: String,
    pub created_at: String,
}

impl Bitstream {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            size_bytes: row.get(2)?,
            checksum: row.get(3)?,
            checksum_algorithm: row.get(4)?,
            mime_type: row.get(5)?,
            internal_id: row.get(6)?,
            last_modified: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    /// The last-modified instant as a UTC timestamp.
    ///
    /// Falls back to the UNIX epoch if the stored text does not parse,
    /// which makes conditional requests behave as "always modified".
    pub fn last_modified_utc(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.last_modified)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}
