use serde::Deserialize;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::firehose::envelope::Commit;
use crate::models::{community, subscription};

use super::{is_delete, require_record};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPayload {
    community: String,
}

/// Projects `community.subscription` records, keyed on
/// `(user_did = event.did, community_did = record.community)`.
pub async fn project(pool: &PgPool, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    let record_uri = format!("at://{}/community.subscription/{}", event_did, commit.rkey);

    if is_delete(commit) {
        let community_did = find_community_did_for(pool, event_did, &commit.rkey).await?;
        let Some(community_did) = community_did else {
            return Ok(());
        };
        let mut tx = pool.begin().await?;
        let deleted = subscription::delete_subscription(&mut tx, event_did, &community_did).await?;
        if deleted {
            community::adjust_subscriber_count(&mut tx, &community_did, -1).await?;
        }
        tx.commit().await?;
        return Ok(());
    }

    let record = require_record(commit)?;
    let payload: SubscriptionPayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed community.subscription record: {e}")))?;
    let record_cid = commit
        .cid
        .clone()
        .ok_or_else(|| AppError::validation("community.subscription commit is missing a cid"))?;

    let mut tx = pool.begin().await?;

    if community::find_community_by_did(&mut tx, &payload.community)
        .await?
        .is_none()
    {
        tx.rollback().await.ok();
        tracing::debug!(community = %payload.community, "subscription references unknown community, will retry on replay");
        return Ok(());
    }

    let newly_active = subscription::create_subscription(
        &mut tx,
        event_did,
        &payload.community,
        &record_uri,
        &record_cid,
    )
    .await?;
    if newly_active {
        community::adjust_subscriber_count(&mut tx, &payload.community, 1).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Deletes don't carry a record body, so the community a subscription
/// pointed at must be recovered from the matching `record_uri`.
async fn find_community_did_for(
    pool: &PgPool,
    user_did: &str,
    rkey: &str,
) -> Result<Option<String>, AppError> {
    let record_uri = format!("at://{}/community.subscription/{}", user_did, rkey);
    let row = sqlx::query!(
        "SELECT community_did FROM subscriptions WHERE user_did = $1 AND record_uri = $2",
        user_did,
        record_uri,
    )
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| r.community_did))
}
