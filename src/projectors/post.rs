use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::firehose::envelope::{Commit, Operation};
use crate::models::community;
use crate::models::post::{self, PostRecord};
use crate::models::user;

use super::require_record;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostPayload {
    community: String,
    author_did: String,
    title: Option<String>,
    content: Option<String>,
    #[serde(default)]
    facets: Value,
    #[serde(default)]
    embed: Value,
    #[serde(default)]
    labels: Value,
    created_at: DateTime<Utc>,
}

/// Projects `community.post` records. Posts live in community repositories —
/// the repo owner must equal the record's own `community` field — so a
/// mismatch is treated as a spoof attempt rather than a validation error.
pub async fn project(pool: &PgPool, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    let uri = format!("at://{}/community.post/{}", event_did, commit.rkey);

    if commit.operation == Operation::Delete {
        let mut tx = pool.begin().await?;
        post::soft_delete_post(&mut tx, &uri).await?;
        tx.commit().await?;
        return Ok(());
    }

    let record = require_record(commit)?;
    let payload: PostPayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed community.post record: {e}")))?;

    if payload.community != event_did {
        return Err(AppError::unauthorized(format!(
            "post {uri} claims community={} but its repository owner is {event_did}",
            payload.community
        )));
    }

    let cid = commit
        .cid
        .clone()
        .ok_or_else(|| AppError::validation("community.post commit is missing a cid"))?;

    let mut tx = pool.begin().await?;

    if community::find_community_by_did(&mut tx, &payload.community)
        .await?
        .is_none()
    {
        tx.rollback().await.ok();
        tracing::debug!(community = %payload.community, "post references unindexed community, will retry on replay");
        return Ok(());
    }
    if user::find_user_by_did(&mut tx, &payload.author_did).await?.is_none() {
        tx.rollback().await.ok();
        tracing::debug!(author = %payload.author_did, "post references unindexed author, will retry on replay");
        return Ok(());
    }

    if commit.operation == Operation::Update {
        post::update_post_fields(
            &mut tx,
            &uri,
            payload.title,
            payload.content,
            payload.facets,
            payload.embed,
            payload.labels,
        )
        .await?;
        tx.commit().await?;
        return Ok(());
    }

    let existing = post::find_post_by_uri(&mut tx, &uri).await?;
    match existing {
        Some(row) if row.deleted_at.is_none() => {
            // Idempotent replay of a create we already have.
        }
        Some(_) => {
            post::resurrect_post(
                &mut tx,
                PostRecord {
                    uri: uri.clone(),
                    cid,
                    rkey: commit.rkey.clone(),
                    author_did: payload.author_did,
                    community_did: payload.community,
                    title: payload.title,
                    content: payload.content,
                    facets: payload.facets,
                    embed: payload.embed,
                    labels: payload.labels,
                    created_at: payload.created_at,
                },
            )
            .await?;
            post::reconcile_comment_count(&mut tx, &uri).await?;
        }
        None => {
            let inserted = post::insert_post(
                &mut tx,
                PostRecord {
                    uri: uri.clone(),
                    cid,
                    rkey: commit.rkey.clone(),
                    author_did: payload.author_did,
                    community_did: payload.community,
                    title: payload.title,
                    content: payload.content,
                    facets: payload.facets,
                    embed: payload.embed,
                    labels: payload.labels,
                    created_at: payload.created_at,
                },
            )
            .await?;
            if inserted.is_some() {
                post::reconcile_comment_count(&mut tx, &uri).await?;
            }
        }
    }

    tx.commit().await?;
    Ok(())
}
