use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{query, query_as, PgPool, Postgres, Transaction};

use crate::models::comment::{SortMode, Timeframe};

#[derive(Clone, Debug, Serialize)]
pub struct Post {
    pub uri: String,
    pub cid: String,
    pub rkey: String,
    pub author_did: String,
    pub community_did: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub facets: Value,
    pub embed: Value,
    pub labels: Value,
    pub created_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub upvote_count: i32,
    pub downvote_count: i32,
    pub score: i32,
    pub comment_count: i32,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub struct PostRecord {
    pub uri: String,
    pub cid: String,
    pub rkey: String,
    pub author_did: String,
    pub community_did: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub facets: Value,
    pub embed: Value,
    pub labels: Value,
    pub created_at: DateTime<Utc>,
}

pub async fn find_post_by_uri(
    tx: &mut Transaction<'_, Postgres>,
    uri: &str,
) -> Result<Option<Post>> {
    let post = query_as!(Post, "SELECT * FROM posts WHERE uri = $1", uri)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(post)
}

/// Inserts a post with `ON CONFLICT DO NOTHING`, returning the row only when
/// the insert actually happened, so the caller reconciles `comment_count`
/// only on a genuine insert and not a replayed duplicate.
pub async fn insert_post(
    tx: &mut Transaction<'_, Postgres>,
    record: PostRecord,
) -> Result<Option<Post>> {
    let post = query_as!(
        Post,
        r#"
        INSERT INTO posts (
            uri, cid, rkey, author_did, community_did, title, content,
            facets, embed, labels, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (uri) DO NOTHING
        RETURNING *
        "#,
        record.uri,
        record.cid,
        record.rkey,
        record.author_did,
        record.community_did,
        record.title,
        record.content,
        record.facets,
        record.embed,
        record.labels,
        record.created_at,
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(post)
}

/// Recomputes `comment_count` from the comments table rather than trusting
/// prior increments, absorbing any comments that arrived and were counted
/// before their parent post existed.
pub async fn reconcile_comment_count(
    tx: &mut Transaction<'_, Postgres>,
    post_uri: &str,
) -> Result<()> {
    query!(
        r#"
        UPDATE posts
        SET comment_count = (
            SELECT COUNT(*) FROM comments
            WHERE parent_uri = $1 AND deleted_at IS NULL
        )
        WHERE uri = $1
        "#,
        post_uri,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn adjust_comment_count(
    tx: &mut Transaction<'_, Postgres>,
    post_uri: &str,
    delta: i32,
) -> Result<u64> {
    let result = query!(
        r#"
        UPDATE posts
        SET comment_count = GREATEST(0, comment_count + $2)
        WHERE uri = $1
        "#,
        post_uri,
        delta,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// `upvote_count`/`downvote_count += delta`, with `score` recomputed in the
/// same statement.
pub async fn adjust_vote_count(
    tx: &mut Transaction<'_, Postgres>,
    post_uri: &str,
    upvote_delta: i32,
    downvote_delta: i32,
) -> Result<u64> {
    let result = query!(
        r#"
        UPDATE posts
        SET
            upvote_count = GREATEST(0, upvote_count + $2),
            downvote_count = GREATEST(0, downvote_count + $3),
            score = GREATEST(0, upvote_count + $2) - GREATEST(0, downvote_count + $3)
        WHERE uri = $1
        "#,
        post_uri,
        upvote_delta,
        downvote_delta,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Restores a soft-deleted post to life.
pub async fn resurrect_post(
    tx: &mut Transaction<'_, Postgres>,
    record: PostRecord,
) -> Result<Post> {
    let post = query_as!(
        Post,
        r#"
        UPDATE posts
        SET
            cid = $2, rkey = $3, author_did = $4, community_did = $5,
            title = $6, content = $7, facets = $8, embed = $9, labels = $10,
            created_at = $11, deleted_at = NULL, indexed_at = now()
        WHERE uri = $1
        RETURNING *
        "#,
        record.uri,
        record.cid,
        record.rkey,
        record.author_did,
        record.community_did,
        record.title,
        record.content,
        record.facets,
        record.embed,
        record.labels,
        record.created_at,
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(post)
}

pub async fn soft_delete_post(tx: &mut Transaction<'_, Postgres>, uri: &str) -> Result<()> {
    query!(
        "UPDATE posts SET deleted_at = now() WHERE uri = $1 AND deleted_at IS NULL",
        uri,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Updates the mutable content fields of a live post. Author, community, and
/// `created_at` are fixed at creation and not touched here.
pub async fn update_post_fields(
    tx: &mut Transaction<'_, Postgres>,
    uri: &str,
    title: Option<String>,
    content: Option<String>,
    facets: Value,
    embed: Value,
    labels: Value,
) -> Result<u64> {
    let result = query!(
        r#"
        UPDATE posts
        SET title = $2, content = $3, facets = $4, embed = $5, labels = $6
        WHERE uri = $1 AND deleted_at IS NULL
        "#,
        uri,
        title,
        content,
        facets,
        embed,
        labels,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

const POST_COLUMNS: &str = r#"uri, cid, rkey, author_did, community_did, title, content,
    facets, embed, labels, created_at, indexed_at, upvote_count, downvote_count,
    score, comment_count, deleted_at"#;

fn feed_sort_key_expr(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Hot => {
            "(sign(score)::float8 * log(greatest(abs(score), 1)::float8) \
              - extract(epoch from created_at) / 45000.0)"
        }
        SortMode::Top => "score::float8",
        SortMode::New => "extract(epoch from created_at)::float8",
    }
}

fn timeframe_duration(timeframe: Timeframe) -> chrono::Duration {
    match timeframe {
        Timeframe::Hour => chrono::Duration::hours(1),
        Timeframe::Day => chrono::Duration::days(1),
        Timeframe::Week => chrono::Duration::days(7),
        Timeframe::Month => chrono::Duration::days(30),
        Timeframe::Year => chrono::Duration::days(365),
        Timeframe::All => chrono::Duration::zero(),
    }
}

/// Fetches one page of posts ranked by `sort`, optionally restricted to a
/// set of community DIDs (the timeline and per-community feeds; `None`
/// filters nothing, serving the discover feed), keyset-paginated off the
/// same `(sort_key, uri)` cursor shape comments use.
pub async fn find_feed_posts(
    pool: &PgPool,
    community_dids: Option<&[String]>,
    sort: SortMode,
    timeframe: Timeframe,
    limit: i64,
    after: Option<(f64, &str)>,
) -> Result<Vec<(Post, f64)>> {
    let sort_key = feed_sort_key_expr(sort);
    let has_community_filter = community_dids.is_some();
    let dids = community_dids.unwrap_or(&[]);
    let has_timeframe = timeframe.interval().is_some();
    let cutoff = Utc::now() - timeframe_duration(timeframe);
    let has_cursor = after.is_some();
    let (cursor_key, cursor_uri) = after.unwrap_or((0.0, ""));

    let sql = format!(
        r#"SELECT {POST_COLUMNS}, {sort_key} AS sort_key
        FROM posts
        WHERE deleted_at IS NULL
          AND ($1 = false OR community_did = ANY($2))
          AND ($3 = false OR created_at >= $4)
          AND ($5 = false OR {sort_key} < $6 OR ({sort_key} = $6 AND uri > $7))
        ORDER BY {sort_key} DESC, uri ASC
        LIMIT $8"#
    );

    let rows: Vec<PostRow> = sqlx::query_as(&sql)
        .bind(has_community_filter)
        .bind(dids)
        .bind(has_timeframe)
        .bind(cutoff)
        .bind(has_cursor)
        .bind(cursor_key)
        .bind(cursor_uri)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(PostRow::into_pair).collect())
}

#[derive(sqlx::FromRow)]
struct PostRow {
    uri: String,
    cid: String,
    rkey: String,
    author_did: String,
    community_did: String,
    title: Option<String>,
    content: Option<String>,
    facets: Value,
    embed: Value,
    labels: Value,
    created_at: DateTime<Utc>,
    indexed_at: DateTime<Utc>,
    upvote_count: i32,
    downvote_count: i32,
    score: i32,
    comment_count: i32,
    deleted_at: Option<DateTime<Utc>>,
    sort_key: f64,
}

impl PostRow {
    fn into_pair(self) -> (Post, f64) {
        let sort_key = self.sort_key;
        (
            Post {
                uri: self.uri,
                cid: self.cid,
                rkey: self.rkey,
                author_did: self.author_did,
                community_did: self.community_did,
                title: self.title,
                content: self.content,
                facets: self.facets,
                embed: self.embed,
                labels: self.labels,
                created_at: self.created_at,
                indexed_at: self.indexed_at,
                upvote_count: self.upvote_count,
                downvote_count: self.downvote_count,
                score: self.score,
                comment_count: self.comment_count,
                deleted_at: self.deleted_at,
            },
            sort_key,
        )
    }
}
