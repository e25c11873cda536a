use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{query, query_as, Postgres, Transaction};

#[derive(Clone, Debug, Serialize)]
pub struct Subscription {
    pub user_did: String,
    pub community_did: String,
    pub record_uri: String,
    pub record_cid: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

pub async fn find_subscription(
    tx: &mut Transaction<'_, Postgres>,
    user_did: &str,
    community_did: &str,
) -> Result<Option<Subscription>> {
    let sub = query_as!(
        Subscription,
        r#"
        SELECT user_did, community_did, record_uri, record_cid, created_at, deleted_at
        FROM subscriptions
        WHERE user_did = $1 AND community_did = $2
        "#,
        user_did,
        community_did,
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(sub)
}

/// Creates the subscription row, or resurrects a soft-deleted one. Returns
/// `true` if the pair is newly (re)active — the caller should then bump
/// `communities.subscriber_count`; `false` if it was already active, so a
/// replayed duplicate is a no-op.
pub async fn create_subscription(
    tx: &mut Transaction<'_, Postgres>,
    user_did: &str,
    community_did: &str,
    record_uri: &str,
    record_cid: &str,
) -> Result<bool> {
    let row = query!(
        r#"
        INSERT INTO subscriptions (user_did, community_did, record_uri, record_cid)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_did, community_did) DO UPDATE SET
            record_uri = excluded.record_uri,
            record_cid = excluded.record_cid,
            deleted_at = NULL
        WHERE subscriptions.deleted_at IS NOT NULL
        RETURNING user_did AS "marker!"
        "#,
        user_did,
        community_did,
        record_uri,
        record_cid,
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.is_some())
}

/// Soft-deletes the subscription. Returns `true` if a previously-live row
/// was deleted (caller should decrement `subscriber_count`); `false` if it
/// was already gone.
pub async fn delete_subscription(
    tx: &mut Transaction<'_, Postgres>,
    user_did: &str,
    community_did: &str,
) -> Result<bool> {
    let result = query!(
        r#"
        UPDATE subscriptions
        SET deleted_at = now()
        WHERE user_did = $1 AND community_did = $2 AND deleted_at IS NULL
        "#,
        user_did,
        community_did,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_subscribed_community_dids(
    tx: &mut Transaction<'_, Postgres>,
    user_did: &str,
) -> Result<Vec<String>> {
    let rows = query!(
        r#"
        SELECT community_did
        FROM subscriptions
        WHERE user_did = $1 AND deleted_at IS NULL
        "#,
        user_did,
    )
    .fetch_all(&mut **tx)
    .await?;
    Ok(rows.into_iter().map(|r| r.community_did).collect())
}
