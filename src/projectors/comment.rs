use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};

use crate::app_error::AppError;
use crate::firehose::envelope::{Commit, Operation};
use crate::models::comment::{self, CommentRecord, DeletionReason, ParentKind};
use crate::models::post;

use super::require_record;

const MAX_CONTENT_BYTES: usize = 30_000;

#[derive(Deserialize)]
struct StrongRef {
    uri: String,
    cid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentPayload {
    root: StrongRef,
    parent: StrongRef,
    content: String,
    #[serde(default)]
    facets: Value,
    #[serde(default)]
    embed: Value,
    #[serde(default)]
    labels: Value,
    #[serde(default)]
    langs: Value,
    created_at: DateTime<Utc>,
}

fn validate(payload: &CommentPayload) -> Result<(), AppError> {
    if payload.content.is_empty() {
        return Err(AppError::validation("comment content must not be empty"));
    }
    if payload.content.len() > MAX_CONTENT_BYTES {
        return Err(AppError::validation(format!(
            "comment content exceeds {MAX_CONTENT_BYTES} bytes"
        )));
    }
    if !payload.root.uri.starts_with("at://") || !payload.parent.uri.starts_with("at://") {
        return Err(AppError::validation("root/parent must be well-formed AT-URIs"));
    }
    Ok(())
}

/// Projects `feed.comment` records. The repository owner is trusted as the
/// commenter — a comment record always lives in the commenter's own repo.
pub async fn project(pool: &PgPool, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    if !event_did.starts_with("did:") {
        return Err(AppError::validation(format!(
            "commenter did {event_did} is not a well-formed DID"
        )));
    }

    let uri = format!("at://{}/feed.comment/{}", event_did, commit.rkey);

    if commit.operation == Operation::Delete {
        return project_delete(pool, &uri, event_did).await;
    }

    let record = require_record(commit)?;
    let payload: CommentPayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed feed.comment record: {e}")))?;
    validate(&payload)?;

    let cid = commit
        .cid
        .clone()
        .ok_or_else(|| AppError::validation("feed.comment commit is missing a cid"))?;

    let mut tx = pool.begin().await?;
    let existing = comment::find_comment_by_uri(&mut tx, &uri).await?;

    if commit.operation == Operation::Update {
        let Some(existing) = existing else {
            tx.rollback().await.ok();
            tracing::debug!(%uri, "update for unindexed comment, will retry on replay");
            return Ok(());
        };
        if existing.root_uri != payload.root.uri
            || existing.root_cid != payload.root.cid
            || existing.parent_uri != payload.parent.uri
            || existing.parent_cid != payload.parent.cid
        {
            return Err(AppError::validation(format!(
                "update to comment {uri} attempted to change its threading references; rejected"
            )));
        }
        sqlx::query!(
            r#"
            UPDATE comments
            SET cid = $2, content = $3, facets = $4, embed = $5, labels = $6,
                langs = $7, updated_at = now()
            WHERE uri = $1 AND deleted_at IS NULL
            "#,
            uri,
            cid,
            payload.content,
            payload.facets,
            payload.embed,
            payload.labels,
            payload.langs,
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        return Ok(());
    }

    let record = CommentRecord {
        uri: uri.clone(),
        cid,
        rkey: commit.rkey.clone(),
        commenter_did: event_did.to_string(),
        root_uri: payload.root.uri,
        root_cid: payload.root.cid,
        parent_uri: payload.parent.uri.clone(),
        parent_cid: payload.parent.cid,
        content: Some(payload.content),
        facets: payload.facets,
        embed: payload.embed,
        labels: payload.labels,
        langs: payload.langs,
        created_at: payload.created_at,
    };

    match existing {
        Some(row) if row.deleted_at.is_none() => {
            // Idempotent replay of a create we already have.
            tx.commit().await?;
        }
        Some(_) => {
            let parent_uri = payload.parent.uri;
            comment::resurrect_comment(&mut tx, record).await?;
            comment::reconcile_reply_count(&mut tx, &uri).await?;
            adjust_parent_counter(&mut tx, &parent_uri, 1).await?;
            tx.commit().await?;
        }
        None => {
            let parent_uri = payload.parent.uri;
            comment::insert_comment(&mut tx, record).await?;
            comment::reconcile_reply_count(&mut tx, &uri).await?;
            adjust_parent_counter(&mut tx, &parent_uri, 1).await?;
            tx.commit().await?;
        }
    }
    Ok(())
}

async fn project_delete(pool: &PgPool, uri: &str, deleted_by_did: &str) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let Some(existing) = comment::find_comment_by_uri(&mut tx, uri).await? else {
        return Ok(());
    };
    if existing.deleted_at.is_some() {
        return Ok(());
    }
    let parent_uri = existing.parent_uri.clone();
    let deleted = comment::soft_delete_comment(&mut tx, uri, DeletionReason::Author, deleted_by_did).await?;
    if deleted {
        adjust_parent_counter(&mut tx, &parent_uri, -1).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Routes a `reply_count`/`comment_count` adjustment to whichever row
/// `parent_uri` names. If the parent isn't indexed yet, the adjustment is
/// dropped — the parent's own projector reconciles by `COUNT(*)` on arrival.
async fn adjust_parent_counter(
    tx: &mut Transaction<'_, Postgres>,
    parent_uri: &str,
    delta: i32,
) -> Result<(), AppError> {
    match comment::parent_kind_from_uri(parent_uri) {
        ParentKind::Post => {
            post::adjust_comment_count(tx, parent_uri, delta).await?;
        }
        ParentKind::Comment => {
            comment::adjust_reply_count(tx, parent_uri, delta).await?;
        }
        ParentKind::Other => {
            tracing::debug!(parent_uri, "comment parent is neither a post nor a comment, no counter to adjust");
        }
    }
    Ok(())
}
