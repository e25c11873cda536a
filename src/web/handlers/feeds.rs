use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app_error::AppError;
use crate::reads::{self, feeds::FeedItem};
use crate::web::state::AppState;

use super::{parse_sort, parse_timeframe};

#[derive(Deserialize)]
pub struct FeedQuery {
    sort: Option<String>,
    timeframe: Option<String>,
    limit: Option<i64>,
    cursor: Option<String>,
    /// Stand-in for the viewer DID a session-auth middleware would inject.
    viewer_did: Option<String>,
}

#[derive(Serialize)]
pub struct FeedItemView {
    #[serde(flatten)]
    pub post: crate::models::post::Post,
    pub author: Option<crate::reads::hydrate::UserView>,
    pub community: Option<crate::models::community::Community>,
}

impl From<FeedItem> for FeedItemView {
    fn from(item: FeedItem) -> Self {
        Self { post: item.post, author: item.author, community: item.community }
    }
}

#[derive(Serialize)]
pub struct FeedResponse {
    pub items: Vec<FeedItemView>,
    pub cursor: Option<String>,
}

/// `social.coves.feed.getTimeline` — posts from the communities the viewer
/// subscribes to. Requires `viewer_did` until the auth seam is wired in.
pub async fn get_timeline(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let viewer_did = query
        .viewer_did
        .as_deref()
        .ok_or_else(|| AppError::unauthorized("getTimeline requires an authenticated viewer"))?;
    let page = reads::timeline(
        &state.pool,
        &state.config.cursor_hmac_secret,
        viewer_did,
        parse_sort(query.sort.as_deref())?,
        parse_timeframe(query.timeframe.as_deref())?,
        query.limit,
        query.cursor.as_deref(),
    )
    .await?;
    Ok(Json(FeedResponse {
        items: page.items.into_iter().map(Into::into).collect(),
        cursor: page.cursor,
    }))
}

/// `social.coves.feed.getDiscover` — global feed across every community.
pub async fn get_discover(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let page = reads::discover(
        &state.pool,
        &state.config.cursor_hmac_secret,
        parse_sort(query.sort.as_deref())?,
        parse_timeframe(query.timeframe.as_deref())?,
        query.limit,
        query.cursor.as_deref(),
    )
    .await?;
    Ok(Json(FeedResponse {
        items: page.items.into_iter().map(Into::into).collect(),
        cursor: page.cursor,
    }))
}

/// `social.coves.feed.getCommunityFeed`
pub async fn get_community_feed(
    State(state): State<AppState>,
    Path(community_did): Path<String>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<FeedResponse>, AppError> {
    let page = reads::community_feed(
        &state.pool,
        &state.config.cursor_hmac_secret,
        &community_did,
        parse_sort(query.sort.as_deref())?,
        parse_timeframe(query.timeframe.as_deref())?,
        query.limit,
        query.cursor.as_deref(),
    )
    .await?;
    Ok(Json(FeedResponse {
        items: page.items.into_iter().map(Into::into).collect(),
        cursor: page.cursor,
    }))
}
