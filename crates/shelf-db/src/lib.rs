//! shelf-db: SQLite persistence and the on-disk asset store.
//!
//! Bitstream metadata lives in SQLite (r2d2 pool, embedded migrations);
//! bitstream content lives in a sharded directory tree under the
//! assetstore root, keyed by an opaque internal ID.

pub mod assetstore;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use models::Bitstream;
pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
