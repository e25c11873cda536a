use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::app_error::AppError;
use crate::reads::{self, GetThreadParams};
use crate::web::state::AppState;

use super::{parse_sort, parse_timeframe};

#[derive(Deserialize)]
pub struct GetThreadQuery {
    post_uri: String,
    sort: Option<String>,
    timeframe: Option<String>,
    depth: Option<u32>,
    limit: Option<i64>,
    cursor: Option<String>,
    /// Stand-in for the viewer DID a session-auth middleware would inject;
    /// that middleware is out of scope here, so it's accepted directly.
    viewer_did: Option<String>,
}

/// `social.coves.comment.getThread`
pub async fn get_thread(
    State(state): State<AppState>,
    Query(query): Query<GetThreadQuery>,
) -> Result<Json<reads::ThreadPage>, AppError> {
    let params = GetThreadParams {
        post_uri: query.post_uri,
        sort: parse_sort(query.sort.as_deref())?,
        timeframe: parse_timeframe(query.timeframe.as_deref())?,
        depth: query.depth,
        limit: query.limit,
        cursor: query.cursor,
        viewer_did: query.viewer_did,
    };
    let page = reads::get_thread(&state.pool, &state.config.cursor_hmac_secret, params).await?;
    Ok(Json(page))
}
