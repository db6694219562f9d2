//! Per-request session lifecycle.
//!
//! Each delivery request opens a [`Session`] holding a pooled database
//! connection and the caller's identity. The session is closed explicitly
//! before the response body starts streaming: database work is done by
//! then, and holding a pooled connection for the lifetime of a large
//! transfer would starve the pool.

use std::time::Instant;

use axum::http::HeaderMap;
use parking_lot::Mutex;

use shelf_core::{Result, SessionId, UserId};
use shelf_db::{get_conn, DbPool, PooledConnection};

/// Header carrying the authenticated user ID, set by the fronting proxy.
const USER_HEADER: &str = "x-forwarded-user";

/// One request's worth of database access and caller identity.
///
/// The connection sits behind a mutex so the session can be shared across
/// await points; lookups lock it only for the duration of a query.
pub struct Session {
    id: SessionId,
    user: Option<UserId>,
    opened_at: Instant,
    conn: Mutex<PooledConnection>,
}

impl Session {
    /// Identity of the authenticated caller, if any.
    pub fn user(&self) -> Option<UserId> {
        self.user
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Run a closure against the session's database connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&PooledConnection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}

/// Opens and closes sessions against the shared connection pool.
pub struct SessionManager {
    pool: DbPool,
}

impl SessionManager {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open a session for an incoming request.
    ///
    /// The caller's identity comes from the proxy-set user header; a
    /// missing or unparseable value yields an anonymous session rather
    /// than an error.
    pub fn obtain(&self, headers: &HeaderMap) -> Result<Session> {
        let user = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<UserId>().ok());

        let session = Session {
            id: SessionId::new(),
            user,
            opened_at: Instant::now(),
            conn: Mutex::new(get_conn(&self.pool)?),
        };
        tracing::trace!(session = %session.id, "session opened");
        Ok(session)
    }

    /// Close a session, returning its connection to the pool.
    ///
    /// Called before body streaming begins so the transfer never pins a
    /// pooled connection.
    pub fn close(&self, session: Session) {
        tracing::debug!(
            session = %session.id,
            elapsed_ms = session.opened_at.elapsed().as_millis() as u64,
            "session closed"
        );
        drop(session);
    }
}
