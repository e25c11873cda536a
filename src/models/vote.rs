use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{query, query_as, Postgres, Transaction, Type};

#[derive(Clone, Copy, Debug, Serialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "vote_direction", rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Clone, Debug, Serialize)]
pub struct Vote {
    pub uri: String,
    pub voter_did: String,
    pub subject_uri: String,
    pub subject_cid: String,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub async fn find_vote_by_uri(tx: &mut Transaction<'_, Postgres>, uri: &str) -> Result<Option<Vote>> {
    let vote = query_as!(
        Vote,
        r#"
        SELECT uri, voter_did, subject_uri, subject_cid,
            direction AS "direction: Direction",
            created_at, updated_at, deleted_at
        FROM votes WHERE uri = $1
        "#,
        uri
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(vote)
}

/// Finds a caller's vote on a subject, for viewer-state hydration.
pub async fn find_vote_by_voter_and_subject(
    tx: &mut Transaction<'_, Postgres>,
    voter_did: &str,
    subject_uri: &str,
) -> Result<Option<Vote>> {
    let vote = query_as!(
        Vote,
        r#"
        SELECT uri, voter_did, subject_uri, subject_cid,
            direction AS "direction: Direction",
            created_at, updated_at, deleted_at
        FROM votes
        WHERE voter_did = $1 AND subject_uri = $2 AND deleted_at IS NULL
        "#,
        voter_did,
        subject_uri,
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(vote)
}

/// Batch viewer-vote hydration: one query per level of the comment tree
/// expansion, keyed by subject URI.
pub async fn find_votes_by_voter_and_subjects(
    tx: &mut Transaction<'_, Postgres>,
    voter_did: &str,
    subject_uris: &[String],
) -> Result<Vec<Vote>> {
    if subject_uris.is_empty() {
        return Ok(Vec::new());
    }
    let votes = query_as!(
        Vote,
        r#"
        SELECT uri, voter_did, subject_uri, subject_cid,
            direction AS "direction: Direction",
            created_at, updated_at, deleted_at
        FROM votes
        WHERE voter_did = $1 AND subject_uri = ANY($2) AND deleted_at IS NULL
        "#,
        voter_did,
        subject_uris,
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(votes)
}

/// Inserts a vote with `ON CONFLICT DO NOTHING`. Returns `Some` only on a
/// genuine new insert — callers use this to decide whether to adjust the
/// subject's vote counters, so a replayed duplicate is a no-op.
pub async fn insert_vote(
    tx: &mut Transaction<'_, Postgres>,
    uri: &str,
    voter_did: &str,
    subject_uri: &str,
    subject_cid: &str,
    direction: Direction,
) -> Result<Option<Vote>> {
    let vote = query_as!(
        Vote,
        r#"
        INSERT INTO votes (uri, voter_did, subject_uri, subject_cid, direction)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (uri) DO NOTHING
        RETURNING uri, voter_did, subject_uri, subject_cid,
            direction AS "direction: Direction",
            created_at, updated_at, deleted_at
        "#,
        uri,
        voter_did,
        subject_uri,
        subject_cid,
        direction as Direction,
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(vote)
}

/// Soft-deletes the vote. Returns the direction that was active so the
/// caller can decrement the matching subject counter, or `None` if the vote
/// was already deleted (idempotent).
pub async fn soft_delete_vote(
    tx: &mut Transaction<'_, Postgres>,
    uri: &str,
) -> Result<Option<Direction>> {
    let row = query!(
        r#"
        UPDATE votes
        SET deleted_at = now()
        WHERE uri = $1 AND deleted_at IS NULL
        RETURNING direction AS "direction: Direction"
        "#,
        uri,
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(|r| r.direction))
}
