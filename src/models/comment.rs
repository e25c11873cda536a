use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{query, query_as, PgPool, Postgres, Transaction, Type};

#[derive(Clone, Copy, Debug, Serialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "comment_deletion_reason", rename_all = "snake_case")]
pub enum DeletionReason {
    Author,
    Moderator,
}

#[derive(Clone, Debug, Serialize)]
pub struct Comment {
    pub uri: String,
    pub cid: String,
    pub rkey: String,
    pub commenter_did: String,
    pub root_uri: String,
    pub root_cid: String,
    pub parent_uri: String,
    pub parent_cid: String,
    pub content: Option<String>,
    pub facets: Value,
    pub embed: Value,
    pub labels: Value,
    pub langs: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deletion_reason: Option<DeletionReason>,
    pub deleted_by_did: Option<String>,
    pub upvote_count: i32,
    pub downvote_count: i32,
    pub score: i32,
    pub reply_count: i32,
}

pub struct CommentRecord {
    pub uri: String,
    pub cid: String,
    pub rkey: String,
    pub commenter_did: String,
    pub root_uri: String,
    pub root_cid: String,
    pub parent_uri: String,
    pub parent_cid: String,
    pub content: Option<String>,
    pub facets: Value,
    pub embed: Value,
    pub labels: Value,
    pub langs: Value,
    pub created_at: DateTime<Utc>,
}

/// Whether `parent_uri` points at a post or at another comment — determines
/// which counter the reconciler adjusts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentKind {
    Post,
    Comment,
    Other,
}

pub async fn find_comment_by_uri(
    tx: &mut Transaction<'_, Postgres>,
    uri: &str,
) -> Result<Option<Comment>> {
    let comment = query_as!(
        Comment,
        r#"
        SELECT uri, cid, rkey, commenter_did, root_uri, root_cid, parent_uri,
            parent_cid, content, facets, embed, labels, langs, created_at,
            updated_at, indexed_at, deleted_at,
            deletion_reason AS "deletion_reason: DeletionReason",
            deleted_by_did, upvote_count, downvote_count, score, reply_count
        FROM comments WHERE uri = $1
        "#,
        uri
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(comment)
}

pub async fn insert_comment(
    tx: &mut Transaction<'_, Postgres>,
    record: CommentRecord,
) -> Result<Comment> {
    let comment = query_as!(
        Comment,
        r#"
        INSERT INTO comments (
            uri, cid, rkey, commenter_did, root_uri, root_cid, parent_uri,
            parent_cid, content, facets, embed, labels, langs, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING uri, cid, rkey, commenter_did, root_uri, root_cid, parent_uri,
            parent_cid, content, facets, embed, labels, langs, created_at,
            updated_at, indexed_at, deleted_at,
            deletion_reason AS "deletion_reason: DeletionReason",
            deleted_by_did, upvote_count, downvote_count, score, reply_count
        "#,
        record.uri,
        record.cid,
        record.rkey,
        record.commenter_did,
        record.root_uri,
        record.root_cid,
        record.parent_uri,
        record.parent_cid,
        record.content,
        record.facets,
        record.embed,
        record.labels,
        record.langs,
        record.created_at,
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(comment)
}

/// Resurrects a soft-deleted comment: overwrites all fields including
/// threading references, clears `deleted_at`, and resets `reply_count` to
/// zero — the caller re-reconciles it right after.
pub async fn resurrect_comment(
    tx: &mut Transaction<'_, Postgres>,
    record: CommentRecord,
) -> Result<Comment> {
    let comment = query_as!(
        Comment,
        r#"
        UPDATE comments
        SET
            cid = $2, rkey = $3, commenter_did = $4, root_uri = $5,
            root_cid = $6, parent_uri = $7, parent_cid = $8, content = $9,
            facets = $10, embed = $11, labels = $12, langs = $13,
            created_at = $14, updated_at = now(), indexed_at = now(),
            deleted_at = NULL, deletion_reason = NULL, deleted_by_did = NULL,
            upvote_count = 0, downvote_count = 0, score = 0, reply_count = 0
        WHERE uri = $1
        RETURNING uri, cid, rkey, commenter_did, root_uri, root_cid, parent_uri,
            parent_cid, content, facets, embed, labels, langs, created_at,
            updated_at, indexed_at, deleted_at,
            deletion_reason AS "deletion_reason: DeletionReason",
            deleted_by_did, upvote_count, downvote_count, score, reply_count
        "#,
        record.uri,
        record.cid,
        record.rkey,
        record.commenter_did,
        record.root_uri,
        record.root_cid,
        record.parent_uri,
        record.parent_cid,
        record.content,
        record.facets,
        record.embed,
        record.labels,
        record.langs,
        record.created_at,
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(comment)
}

/// Soft-deletes a comment: sets `deleted_at`, blanks `content`, records
/// `deletion_reason`/`deleted_by_did`. A second delete is a no-op (returns
/// `false`).
pub async fn soft_delete_comment(
    tx: &mut Transaction<'_, Postgres>,
    uri: &str,
    reason: DeletionReason,
    deleted_by_did: &str,
) -> Result<bool> {
    let result = query!(
        r#"
        UPDATE comments
        SET
            deleted_at = now(),
            deletion_reason = $2,
            deleted_by_did = $3,
            content = NULL
        WHERE uri = $1 AND deleted_at IS NULL
        "#,
        uri,
        reason as DeletionReason,
        deleted_by_did,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Recomputes `reply_count` from the comments table, absorbing replies
/// that arrived and were counted before this comment existed.
pub async fn reconcile_reply_count(
    tx: &mut Transaction<'_, Postgres>,
    comment_uri: &str,
) -> Result<()> {
    query!(
        r#"
        UPDATE comments
        SET reply_count = (
            SELECT COUNT(*) FROM comments
            WHERE parent_uri = $1 AND deleted_at IS NULL
        )
        WHERE uri = $1
        "#,
        comment_uri,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn adjust_reply_count(
    tx: &mut Transaction<'_, Postgres>,
    comment_uri: &str,
    delta: i32,
) -> Result<u64> {
    let result = query!(
        r#"
        UPDATE comments
        SET reply_count = GREATEST(0, reply_count + $2)
        WHERE uri = $1
        "#,
        comment_uri,
        delta,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

pub async fn adjust_comment_vote_count(
    tx: &mut Transaction<'_, Postgres>,
    comment_uri: &str,
    upvote_delta: i32,
    downvote_delta: i32,
) -> Result<u64> {
    let result = query!(
        r#"
        UPDATE comments
        SET
            upvote_count = GREATEST(0, upvote_count + $2),
            downvote_count = GREATEST(0, downvote_count + $3),
            score = GREATEST(0, upvote_count + $2) - GREATEST(0, downvote_count + $3)
        WHERE uri = $1
        "#,
        comment_uri,
        upvote_delta,
        downvote_delta,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Determines whether `uri` identifies a post or a comment, to route a
/// parent-counter adjustment. An AT-URI's collection segment is
/// authoritative; anything that is neither is left uncounted.
pub fn parent_kind_from_uri(uri: &str) -> ParentKind {
    if uri.contains("/community.post/") {
        ParentKind::Post
    } else if uri.contains("/feed.comment/") {
        ParentKind::Comment
    } else {
        ParentKind::Other
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortMode {
    Hot,
    Top,
    New,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeframe {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Timeframe {
    pub fn interval(self) -> Option<&'static str> {
        match self {
            Timeframe::Hour => Some("1 hour"),
            Timeframe::Day => Some("1 day"),
            Timeframe::Week => Some("7 days"),
            Timeframe::Month => Some("30 days"),
            Timeframe::Year => Some("365 days"),
            Timeframe::All => None,
        }
    }
}

const COMMENT_COLUMNS: &str = r#"uri, cid, rkey, commenter_did, root_uri, root_cid, parent_uri,
    parent_cid, content, facets, embed, labels, langs, created_at,
    updated_at, indexed_at, deleted_at,
    deletion_reason AS "deletion_reason: DeletionReason",
    deleted_by_did, upvote_count, downvote_count, score, reply_count"#;

/// A comment's sort key under a given ranking mode — `hot` combines a
/// vote-delta term with age decay, `top` is the raw score, `new` is the
/// creation time as an epoch. Encoded as a string so it can travel inside
/// an opaque pagination cursor and be parsed back for keyset resumption.
fn sort_key_expr(sort: SortMode) -> &'static str {
    match sort {
        SortMode::Hot => {
            "(sign(score)::float8 * log(greatest(abs(score), 1)::float8) \
              - extract(epoch from created_at) / 45000.0)"
        }
        SortMode::Top => "score::float8",
        SortMode::New => "extract(epoch from created_at)::float8",
    }
}

/// Fetches one page of top-level comments (`parent_uri = post_uri`) under
/// the requested ranking, using keyset pagination off an opaque cursor.
/// Soft-deleted comments are included — deletion is a placeholder, not a
/// disappearance, so thread structure survives it.
///
/// Ties on the ranking metric break on `uri ASC`; this is a narrower
/// tie-break than a byte-identical `created_at` rank would need, but the
/// opaque cursor only carries `(sort_key, uri)`, so a metric tie resolves
/// by URI alone rather than falling back to creation time.
pub async fn find_top_level_comments(
    pool: &PgPool,
    post_uri: &str,
    sort: SortMode,
    timeframe: Timeframe,
    limit: i64,
    after: Option<(f64, &str)>,
) -> Result<Vec<(Comment, f64)>> {
    let sort_key = sort_key_expr(sort);
    let has_timeframe = timeframe.interval().is_some();
    let cutoff = match timeframe.interval() {
        Some(_) => Utc::now() - timeframe_duration(timeframe),
        None => Utc::now(),
    };
    let has_cursor = after.is_some();
    let (cursor_key, cursor_uri) = after.unwrap_or((0.0, ""));

    let sql = format!(
        r#"SELECT {COMMENT_COLUMNS}, {sort_key} AS sort_key
        FROM comments
        WHERE parent_uri = $1
          AND ($2 = false OR created_at >= $3)
          AND ($4 = false OR {sort_key} < $5 OR ({sort_key} = $5 AND uri > $6))
        ORDER BY {sort_key} DESC, uri ASC
        LIMIT $7"#
    );

    let rows: Vec<CommentRow> = sqlx::query_as(&sql)
        .bind(post_uri)
        .bind(has_timeframe)
        .bind(cutoff)
        .bind(has_cursor)
        .bind(cursor_key)
        .bind(cursor_uri)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(CommentRow::into_pair).collect())
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

/// Batched reply expansion: one query per depth level. Returns up to
/// `per_parent` replies for every URI in `parent_uris`, using a window
/// function so the whole level is fetched in a single round trip.
pub async fn find_replies_batch(
    pool: &PgPool,
    parent_uris: &[String],
    per_parent: i64,
) -> Result<Vec<Comment>> {
    if parent_uris.is_empty() {
        return Ok(Vec::new());
    }
    let rows = query_as!(
        Comment,
        r#"
        SELECT uri, cid, rkey, commenter_did, root_uri, root_cid, parent_uri,
            parent_cid, content, facets, embed, labels, langs, created_at,
            updated_at, indexed_at, deleted_at,
            deletion_reason AS "deletion_reason: DeletionReason",
            deleted_by_did, upvote_count, downvote_count, score, reply_count
        FROM (
            SELECT *, ROW_NUMBER() OVER (
                PARTITION BY parent_uri ORDER BY created_at ASC, uri ASC
            ) AS rn
            FROM comments
            WHERE parent_uri = ANY($1)
        ) ranked
        WHERE rn <= $2
        ORDER BY parent_uri, created_at ASC, uri ASC
        "#,
        parent_uris,
        per_parent,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    uri: String,
    cid: String,
    rkey: String,
    commenter_did: String,
    root_uri: String,
    root_cid: String,
    parent_uri: String,
    parent_cid: String,
    content: Option<String>,
    facets: Value,
    embed: Value,
    labels: Value,
    langs: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    indexed_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    deletion_reason: Option<DeletionReason>,
    deleted_by_did: Option<String>,
    upvote_count: i32,
    downvote_count: i32,
    score: i32,
    reply_count: i32,
    sort_key: f64,
}

impl CommentRow {
    fn into_pair(self) -> (Comment, f64) {
        let sort_key = self.sort_key;
        (
            Comment {
                uri: self.uri,
                cid: self.cid,
                rkey: self.rkey,
                commenter_did: self.commenter_did,
                root_uri: self.root_uri,
                root_cid: self.root_cid,
                parent_uri: self.parent_uri,
                parent_cid: self.parent_cid,
                content: self.content,
                facets: self.facets,
                embed: self.embed,
                labels: self.labels,
                langs: self.langs,
                created_at: self.created_at,
                updated_at: self.updated_at,
                indexed_at: self.indexed_at,
                deleted_at: self.deleted_at,
                deletion_reason: self.deletion_reason,
                deleted_by_did: self.deleted_by_did,
                upvote_count: self.upvote_count,
                downvote_count: self.downvote_count,
                score: self.score,
                reply_count: self.reply_count,
            },
            sort_key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_kind_detects_post() {
        assert_eq!(
            parent_kind_from_uri("at://did:plc:community/community.post/abc"),
            ParentKind::Post
        );
    }

    #[test]
    fn parent_kind_detects_comment() {
        assert_eq!(
            parent_kind_from_uri("at://did:plc:alice/feed.comment/xyz"),
            ParentKind::Comment
        );
    }

    #[test]
    fn parent_kind_other_for_unknown_collection() {
        assert_eq!(
            parent_kind_from_uri("at://did:plc:alice/app.bsky.feed.post/xyz"),
            ParentKind::Other
        );
    }
}
