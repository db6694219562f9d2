//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates an in-memory DB, a temp-dir
//! asset store, and a full [`AppContext`]. The [`with_server`] constructor
//! starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use shelf_core::config::Config;
use shelf_core::Result;
use shelf_db::queries::bitstreams::create_bitstream;
use shelf_db::{assetstore, init_memory_pool, Bitstream, DbPool};
use shelf_server::citation::{CitationEngine, RenderedDocument};
use shelf_server::context::AppContext;
use shelf_server::router::build_router;
use shelf_server::session::Session;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and a temp-dir asset store.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub assetstore: TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new() -> Self {
        let assetstore = tempfile::tempdir().expect("failed to create assetstore dir");
        let mut config = Config::default();
        config.server.assetstore = assetstore.path().to_path_buf();

        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::new(config, db.clone());

        Self {
            ctx,
            db,
            assetstore,
        }
    }

    /// Swap in a citation engine before starting the server.
    pub fn with_citation(mut self, engine: Arc<dyn CitationEngine>) -> Self {
        self.ctx = self.ctx.with_citation(engine);
        self
    }

    /// Store bytes in the asset store and register a bitstream row.
    pub fn ingest_bytes(&self, name: Option<&str>, mime: &str, data: &[u8]) -> Bitstream {
        let staging = self.assetstore.path().join("staging.tmp");
        std::fs::write(&staging, data).expect("failed to write staging file");

        let stored =
            assetstore::store(self.assetstore.path(), &staging).expect("failed to store asset");
        std::fs::remove_file(&staging).ok();

        let conn = shelf_db::get_conn(&self.db).expect("failed to get db connection");
        create_bitstream(
            &conn,
            name,
            stored.size_bytes,
            &stored.checksum,
            "SHA-256",
            mime,
            &stored.internal_id,
        )
        .expect("failed to create bitstream")
    }

    /// Start the server on a random port, consuming the harness builder
    /// state, and return it with the bound address.
    pub async fn start(self) -> (Self, SocketAddr) {
        let app = build_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    /// Convenience: new harness with a running server.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().start().await
    }
}

/// Citation engine that prepends a fixed banner to the stored content
/// length, standing in for a real cover-page renderer.
pub struct StampedCitation {
    pub banner: Vec<u8>,
}

#[async_trait]
impl CitationEngine for StampedCitation {
    fn is_eligible(&self, bitstream: &Bitstream, _session: &Session) -> bool {
        bitstream.mime_type == "application/pdf"
    }

    async fn render(
        &self,
        bitstream: &Bitstream,
        _session: &Session,
    ) -> Result<RenderedDocument> {
        let mut bytes = self.banner.clone();
        bytes.extend(std::iter::repeat(0u8).take(bitstream.size_bytes.max(0) as usize));
        Ok(RenderedDocument {
            length: bytes.len() as u64,
            source: Box::new(std::io::Cursor::new(bytes)),
        })
    }
}

/// Citation engine whose rendering always comes back empty.
pub struct EmptyCitation;

#[async_trait]
impl CitationEngine for EmptyCitation {
    fn is_eligible(&self, _bitstream: &Bitstream, _session: &Session) -> bool {
        true
    }

    async fn render(
        &self,
        _bitstream: &Bitstream,
        _session: &Session,
    ) -> Result<RenderedDocument> {
        Ok(RenderedDocument {
            length: 0,
            source: Box::new(std::io::Cursor::new(Vec::new())),
        })
    }
}
