use sqlx::PgPool;

use crate::app_error::AppError;
use crate::models::comment::{SortMode, Timeframe};
use crate::models::community::Community;
use crate::models::post::{self, Post};
use crate::models::subscription;
use crate::reads::cursor::{self, CursorPayload};
use crate::reads::hydrate::{self, UserView};

const MIN_LIMIT: i64 = 1;
const MAX_LIMIT: i64 = 100;
const DEFAULT_LIMIT: i64 = 50;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(MIN_LIMIT, MAX_LIMIT)
}

pub struct FeedItem {
    pub post: Post,
    pub author: Option<UserView>,
    pub community: Option<Community>,
}

pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub cursor: Option<String>,
}

async fn paginate(
    pool: &PgPool,
    community_dids: Option<&[String]>,
    sort: SortMode,
    timeframe: Timeframe,
    limit: Option<i64>,
    cursor: Option<&str>,
    cursor_secret: &str,
) -> Result<FeedPage, AppError> {
    let limit = clamp_limit(limit);
    let after = cursor
        .and_then(|c| crate::reads::cursor::decode(cursor_secret, c))
        .and_then(|payload| payload.sort_key.parse::<f64>().ok().map(|k| (k, payload.uri)));

    let rows = post::find_feed_posts(
        pool,
        community_dids,
        sort,
        timeframe,
        limit + 1,
        after.as_ref().map(|(k, u)| (*k, u.as_str())),
    )
    .await?;

    let has_next_page = rows.len() as i64 > limit;
    let mut page = rows;
    page.truncate(limit as usize);

    let next_cursor = if has_next_page {
        page.last().map(|(p, key)| {
            cursor::encode(
                cursor_secret,
                &CursorPayload { sort_key: key.to_string(), uri: p.uri.clone() },
            )
        })
    } else {
        None
    };

    let posts: Vec<Post> = page.into_iter().map(|(p, _)| p).collect();
    let author_dids: Vec<String> = posts.iter().map(|p| p.author_did.clone()).collect();
    let community_dids_hydrate: Vec<String> = posts.iter().map(|p| p.community_did.clone()).collect();

    let mut authors = hydrate::users_by_did(pool, &author_dids).await?;
    let mut communities = hydrate::communities_by_did(pool, &community_dids_hydrate).await?;

    let items = posts
        .into_iter()
        .map(|p| {
            let author = authors.remove(&p.author_did);
            let community = communities.remove(&p.community_did);
            FeedItem { post: p, author, community }
        })
        .collect();

    Ok(FeedPage { items, cursor: next_cursor })
}

/// Posts from the communities `user_did` subscribes to, newest/hottest
/// first. An unsubscribed user sees an empty timeline, not an error.
pub async fn timeline(
    pool: &PgPool,
    cursor_secret: &str,
    user_did: &str,
    sort: SortMode,
    timeframe: Timeframe,
    limit: Option<i64>,
    cursor: Option<&str>,
) -> Result<FeedPage, AppError> {
    let mut tx = pool.begin().await?;
    let community_dids = subscription::find_subscribed_community_dids(&mut tx, user_did).await?;
    tx.commit().await?;

    if community_dids.is_empty() {
        return Ok(FeedPage { items: Vec::new(), cursor: None });
    }

    paginate(pool, Some(&community_dids), sort, timeframe, limit, cursor, cursor_secret).await
}

/// Global feed across every indexed community.
pub async fn discover(
    pool: &PgPool,
    cursor_secret: &str,
    sort: SortMode,
    timeframe: Timeframe,
    limit: Option<i64>,
    cursor: Option<&str>,
) -> Result<FeedPage, AppError> {
    paginate(pool, None, sort, timeframe, limit, cursor, cursor_secret).await
}

/// Feed of a single community's posts.
pub async fn community_feed(
    pool: &PgPool,
    cursor_secret: &str,
    community_did: &str,
    sort: SortMode,
    timeframe: Timeframe,
    limit: Option<i64>,
    cursor: Option<&str>,
) -> Result<FeedPage, AppError> {
    let dids = [community_did.to_string()];
    paginate(pool, Some(&dids), sort, timeframe, limit, cursor, cursor_secret).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_limit_applies_default_and_bounds() {
        assert_eq!(clamp_limit(None), DEFAULT_LIMIT);
        assert_eq!(clamp_limit(Some(0)), MIN_LIMIT);
        assert_eq!(clamp_limit(Some(500)), MAX_LIMIT);
    }
}
