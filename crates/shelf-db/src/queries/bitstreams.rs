//! Bitstream metadata queries.

use chrono::Utc;
use rusqlite::Connection;
use shelf_core::{BitstreamId, Error, Result};

use crate::models::Bitstream;

const COLS: &str = "id, name, size_bytes, checksum, checksum_algorithm, mime_type,
    internal_id, last_modified, created_at";

/// Create a new bitstream record.
pub fn create_bitstream(
    conn: &Connection,
    name: Option<&str>,
    size_bytes: i64,
    checksum: &str,
    checksum_algorithm: &str,
    mime_type: &str,
    internal_id: &str,
) -> Result<Bitstream> {
    let id = BitstreamId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO bitstreams (id, name, size_bytes, checksum, checksum_algorithm,
            mime_type, internal_id, last_modified, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        rusqlite::params![
            id.to_string(),
            name,
            size_bytes,
            checksum,
            checksum_algorithm,
            mime_type,
            internal_id,
            now,
            now,
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Bitstream {
        id,
        name: name.map(String::from),
        size_bytes,
        checksum: checksum.to_string(),
        checksum_algorithm: checksum_algorithm.to_string(),
        mime_type: mime_type.to_string(),
        internal_id: internal_id.to_string(),
        last_modified: now.clone(),
        created_at: now,
    })
}

/// Look up a bitstream by ID.
pub fn get_bitstream(conn: &Connection, id: BitstreamId) -> Result<Option<Bitstream>> {
    let q = format!("SELECT {COLS} FROM bitstreams WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Bitstream::from_row);
    match result {
        Ok(bit) => Ok(Some(bit)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all bitstreams, newest first.
pub fn list_bitstreams(conn: &Connection, limit: usize) -> Result<Vec<Bitstream>> {
    let q = format!("SELECT {COLS} FROM bitstreams ORDER BY created_at DESC LIMIT ?1");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([limit as i64], Bitstream::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}
