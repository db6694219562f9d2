//! Bitstream endpoints: content delivery and metadata.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Response};
use axum::{Extension, Json};
use serde::Serialize;

use shelf_core::{BitstreamId, Error};
use shelf_db::Bitstream;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::resolver::{self, DeliveryDecision};
use crate::sender::{BitstreamSender, SenderParams};
use crate::telemetry::UsageEvent;

/// GET/HEAD /api/core/bitstreams/{id}/content
///
/// The delivery pipeline, in order: open a session, resolve the content
/// variant, negotiate ranges and conditionals, record telemetry for plain
/// retrievals, close the session, then stream. The session is closed
/// before the first body byte so a slow download never pins a database
/// connection.
pub async fn retrieve(
    State(ctx): State<AppContext>,
    Path(id): Path<BitstreamId>,
    Extension(request_id): Extension<RequestId>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response<Body>, AppError> {
    let fail = |e: Error| AppError::from(e).with_request_id(request_id.0.clone());

    let session = ctx.sessions.obtain(&headers).map_err(fail)?;

    let resolved =
        match resolver::resolve(ctx.repository.as_ref(), ctx.citation.as_ref(), &session, id)
            .await
        {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                ctx.sessions.close(session);
                return Err(fail(Error::not_found("bitstream", id)));
            }
            Err(e) => {
                ctx.sessions.close(session);
                return Err(fail(e));
            }
        };

    let raw = resolved.decision == DeliveryDecision::Raw;
    let sender = BitstreamSender::negotiate(
        SenderParams {
            name: resolver::display_name(&resolved.bitstream),
            mime_type: resolved.bitstream.mime_type.clone(),
            length: resolved.length,
            checksum: raw.then(|| resolved.bitstream.checksum.clone()),
            last_modified: resolved.bitstream.last_modified_utc(),
            buffer_size: ctx.config.delivery.buffer_size,
            range_supported: raw,
        },
        &headers,
    );

    // A request with any Range header is a probe or a resumption, not a
    // view; only plain retrievals that will succeed count.
    let status = sender.status();
    if sender.is_no_range_request() && (status.is_success() || status.is_redirection()) {
        ctx.telemetry
            .record(UsageEvent::view(resolved.bitstream.id, session.user()));
    }

    // All database work is done; release the connection before streaming.
    ctx.sessions.close(session);

    sender
        .into_response(resolved.source, &method)
        .map_err(fail)
}

/// JSON projection of a bitstream's metadata.
#[derive(Debug, Serialize)]
pub struct BitstreamResponse {
    pub id: BitstreamId,
    pub name: Option<String>,
    pub size_bytes: i64,
    pub checksum: String,
    pub checksum_algorithm: String,
    pub mime_type: String,
    pub last_modified: String,
    pub created_at: String,
}

impl From<Bitstream> for BitstreamResponse {
    fn from(b: Bitstream) -> Self {
        Self {
            id: b.id,
            name: b.name,
            size_bytes: b.size_bytes,
            checksum: b.checksum,
            checksum_algorithm: b.checksum_algorithm,
            mime_type: b.mime_type,
            last_modified: b.last_modified,
            created_at: b.created_at,
        }
    }
}

/// GET /api/core/bitstreams/{id}
pub async fn get_metadata(
    State(ctx): State<AppContext>,
    Path(id): Path<BitstreamId>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Result<Json<BitstreamResponse>, AppError> {
    let fail = |e: Error| AppError::from(e).with_request_id(request_id.0.clone());

    let session = ctx.sessions.obtain(&headers).map_err(fail)?;
    let result = ctx.repository.lookup(&session, id);
    ctx.sessions.close(session);

    match result {
        Ok(Some(bitstream)) => Ok(Json(bitstream.into())),
        Ok(None) => Err(fail(Error::not_found("bitstream", id))),
        Err(e) => Err(fail(e)),
    }
}
