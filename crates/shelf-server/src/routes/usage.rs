//! Recent-usage endpoint.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::context::AppContext;
use crate::telemetry::UsageEvent;

const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    limit: Option<usize>,
}

/// GET /api/core/usage/recent
pub async fn recent_usage(
    State(ctx): State<AppContext>,
    Query(params): Query<RecentParams>,
) -> Json<Vec<UsageEvent>> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    Json(ctx.telemetry.recent_events(limit))
}
