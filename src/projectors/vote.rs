use serde::Deserialize;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::firehose::envelope::{Commit, Operation};
use crate::models::comment::{self, ParentKind};
use crate::models::post;
use crate::models::vote::{self, Direction};

use super::require_record;

#[derive(Deserialize)]
struct StrongRef {
    uri: String,
    cid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VotePayload {
    subject: StrongRef,
    direction: PayloadDirection,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum PayloadDirection {
    Up,
    Down,
}

impl From<PayloadDirection> for Direction {
    fn from(value: PayloadDirection) -> Self {
        match value {
            PayloadDirection::Up => Direction::Up,
            PayloadDirection::Down => Direction::Down,
        }
    }
}

/// Projects `feed.vote` records. The repository owner is trusted as the
/// voter — a vote record always lives in the voter's own repo.
pub async fn project(pool: &PgPool, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    let uri = format!("at://{}/feed.vote/{}", event_did, commit.rkey);

    if commit.operation == Operation::Delete {
        let mut tx = pool.begin().await?;
        if let Some(prior_direction) = vote::soft_delete_vote(&mut tx, &uri).await? {
            let subject_uri = find_subject_uri(&mut tx, &uri).await?;
            if let Some(subject_uri) = subject_uri {
                adjust_subject(&mut tx, &subject_uri, prior_direction, -1).await?;
            }
        }
        tx.commit().await?;
        return Ok(());
    }

    let record = require_record(commit)?;
    let payload: VotePayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed feed.vote record: {e}")))?;
    let direction: Direction = payload.direction.into();

    let mut tx = pool.begin().await?;
    let inserted = vote::insert_vote(
        &mut tx,
        &uri,
        event_did,
        &payload.subject.uri,
        &payload.subject.cid,
        direction,
    )
    .await?;
    if inserted.is_some() {
        adjust_subject(&mut tx, &payload.subject.uri, direction, 1).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn find_subject_uri(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    vote_uri: &str,
) -> Result<Option<String>, AppError> {
    let row = sqlx::query!("SELECT subject_uri FROM votes WHERE uri = $1", vote_uri)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.map(|r| r.subject_uri))
}

/// Adjusts the vote counters on whichever row `subject_uri` names. If the
/// subject isn't indexed yet the vote is still recorded — counters catch up
/// when the subject's own projector reconciles it.
async fn adjust_subject(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_uri: &str,
    direction: Direction,
    sign: i32,
) -> Result<(), AppError> {
    let (up_delta, down_delta) = match direction {
        Direction::Up => (sign, 0),
        Direction::Down => (0, sign),
    };
    match comment::parent_kind_from_uri(subject_uri) {
        ParentKind::Post => {
            post::adjust_vote_count(tx, subject_uri, up_delta, down_delta).await?;
        }
        ParentKind::Comment => {
            comment::adjust_comment_vote_count(tx, subject_uri, up_delta, down_delta).await?;
        }
        ParentKind::Other => {
            tracing::debug!(subject = subject_uri, "vote subject is neither a post nor a comment, no counter to adjust");
        }
    }
    Ok(())
}
