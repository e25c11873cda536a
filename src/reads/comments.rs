use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::models::comment::{self, Comment, SortMode, Timeframe};
use crate::models::community::Community;
use crate::models::post::{self, Post};
use crate::models::vote::Direction;
use crate::reads::cursor::{self, CursorPayload};
use crate::reads::hydrate::{self, UserView};

/// Children fetched per parent at each tree-expansion level.
const DEFAULT_REPLIES_PER_PARENT: i64 = 5;
const MAX_DEPTH: u32 = 100;
const DEFAULT_DEPTH: u32 = 10;
const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 100;
const DEFAULT_LIMIT: i64 = 50;
const THREAD_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GetThreadParams {
    pub post_uri: String,
    pub sort: SortMode,
    pub timeframe: Timeframe,
    pub depth: Option<u32>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
    pub viewer_did: Option<String>,
}

impl GetThreadParams {
    fn depth(&self) -> u32 {
        self.depth.unwrap_or(DEFAULT_DEPTH).min(MAX_DEPTH)
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(MIN_LIMIT, MAX_LIMIT)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ViewerVoteView {
    pub direction: Direction,
    pub vote_uri: String,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub viewer: Option<ViewerVoteView>,
}

#[derive(Debug, Serialize)]
pub struct ThreadView {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<ThreadView>,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<UserView>,
    pub community: Option<Community>,
}

#[derive(Debug, Serialize)]
pub struct ThreadPage {
    pub post: PostView,
    pub comments: Vec<ThreadView>,
    pub cursor: Option<String>,
}

/// Assembles a threaded comment view: top-level page under the requested
/// ranking, then level-by-level batched reply expansion down to `depth`,
/// viewer-vote and author/community hydration, and deleted-comment
/// placeholders left in place so thread structure survives moderation.
pub async fn get_thread(
    pool: &PgPool,
    cursor_secret: &str,
    params: GetThreadParams,
) -> Result<ThreadPage, AppError> {
    tokio::time::timeout(THREAD_TIMEOUT, get_thread_inner(pool, cursor_secret, params))
        .await
        .map_err(|_| AppError::Transient("thread assembly timed out".to_string()))?
}

async fn get_thread_inner(
    pool: &PgPool,
    cursor_secret: &str,
    params: GetThreadParams,
) -> Result<ThreadPage, AppError> {
    let depth = params.depth();
    let limit = params.limit();

    let mut tx = pool.begin().await?;
    let post = post::find_post_by_uri(&mut tx, &params.post_uri)
        .await?
        .ok_or_else(|| AppError::not_found("post"))?;
    tx.commit().await?;

    let after = params
        .cursor
        .as_deref()
        .and_then(|c| cursor::decode(cursor_secret, c))
        .and_then(|payload| payload.sort_key.parse::<f64>().ok().map(|k| (k, payload.uri)));

    // Fetch one extra row to learn whether a next page exists without a
    // separate COUNT query.
    let top_rows = comment::find_top_level_comments(
        pool,
        &params.post_uri,
        params.sort,
        params.timeframe,
        limit + 1,
        after.as_ref().map(|(k, u)| (*k, u.as_str())),
    )
    .await?;

    let has_next_page = top_rows.len() as i64 > limit;
    let mut page = top_rows;
    page.truncate(limit as usize);

    let next_cursor = if has_next_page {
        page.last().map(|(c, key)| {
            cursor::encode(
                cursor_secret,
                &CursorPayload {
                    sort_key: key.to_string(),
                    uri: c.uri.clone(),
                },
            )
        })
    } else {
        None
    };

    let top_level: Vec<Comment> = page.into_iter().map(|(c, _)| c).collect();

    let mut levels: Vec<Vec<Comment>> = vec![top_level];
    let mut remaining_depth = depth;
    while remaining_depth > 0 {
        let current = levels.last().expect("levels always has at least one entry");
        let parents_with_replies: Vec<String> = current
            .iter()
            .filter(|c| c.reply_count > 0)
            .map(|c| c.uri.clone())
            .collect();
        if parents_with_replies.is_empty() {
            break;
        }
        let replies =
            comment::find_replies_batch(pool, &parents_with_replies, DEFAULT_REPLIES_PER_PARENT).await?;
        if replies.is_empty() {
            break;
        }
        levels.push(replies);
        remaining_depth -= 1;
    }

    let mut viewer_votes_by_uri: HashMap<String, (Direction, String)> = HashMap::new();
    if let Some(viewer_did) = params.viewer_did.as_deref() {
        for level in &levels {
            if level.is_empty() {
                continue;
            }
            let uris: Vec<String> = level.iter().map(|c| c.uri.clone()).collect();
            let batch = hydrate::viewer_votes(pool, viewer_did, &uris).await?;
            viewer_votes_by_uri.extend(batch);
        }
    }

    // Fold levels from the deepest back up to the top, attaching each
    // comment's already-built children by parent URI.
    let mut children_by_parent: HashMap<String, Vec<ThreadView>> = HashMap::new();
    for level in levels.into_iter().rev() {
        let mut next_children_by_parent: HashMap<String, Vec<ThreadView>> = HashMap::new();
        for c in level {
            let replies = children_by_parent.remove(&c.uri).unwrap_or_default();
            let has_more = c.reply_count > replies.len() as i32;
            let viewer = viewer_votes_by_uri
                .get(&c.uri)
                .map(|(direction, vote_uri)| ViewerVoteView { direction: *direction, vote_uri: vote_uri.clone() });
            let parent_uri = c.parent_uri.clone();
            let node = ThreadView {
                comment: CommentView { comment: c, viewer },
                replies,
                has_more,
            };
            next_children_by_parent.entry(parent_uri).or_default().push(node);
        }
        children_by_parent = next_children_by_parent;
    }
    let comments = children_by_parent.remove(&params.post_uri).unwrap_or_default();

    let author = hydrate::users_by_did(pool, std::slice::from_ref(&post.author_did))
        .await?
        .remove(&post.author_did);
    let community = hydrate::communities_by_did(pool, std::slice::from_ref(&post.community_did))
        .await?
        .remove(&post.community_did);

    Ok(ThreadPage {
        post: PostView { post, author, community },
        comments,
        cursor: next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_clamps_to_maximum() {
        let params = GetThreadParams {
            post_uri: "at://did:plc:community/community.post/p1".to_string(),
            sort: SortMode::Hot,
            timeframe: Timeframe::All,
            depth: Some(500),
            limit: None,
            cursor: None,
            viewer_did: None,
        };
        assert_eq!(params.depth(), MAX_DEPTH);
        assert_eq!(params.limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn limit_clamps_to_range() {
        let params = GetThreadParams {
            post_uri: "at://did:plc:community/community.post/p1".to_string(),
            sort: SortMode::New,
            timeframe: Timeframe::All,
            depth: None,
            limit: Some(1000),
            cursor: None,
            viewer_did: None,
        };
        assert_eq!(params.limit(), MAX_LIMIT);
    }
}
