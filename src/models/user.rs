use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{query, query_as, PgPool, Postgres, Transaction};

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub did: String,
    pub handle: String,
    pub pds_url: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_cid: Option<String>,
    pub banner_cid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn find_user_by_did(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
) -> Result<Option<User>> {
    let user = query_as!(User, "SELECT * FROM users WHERE did = $1", did)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(user)
}

/// Batched lookup for read-model hydration: one query per level of tree
/// expansion instead of one query per row.
pub async fn find_users_by_dids(pool: &PgPool, dids: &[String]) -> Result<Vec<User>> {
    if dids.is_empty() {
        return Ok(Vec::new());
    }
    let users = query_as!(User, "SELECT * FROM users WHERE did = ANY($1)", dids)
        .fetch_all(pool)
        .await?;
    Ok(users)
}

pub async fn find_user_by_handle(
    tx: &mut Transaction<'_, Postgres>,
    handle: &str,
) -> Result<Option<User>> {
    let user = query_as!(
        User,
        "SELECT * FROM users WHERE handle = $1",
        handle.to_lowercase()
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(user)
}

/// Inserts a brand-new user row with a placeholder PDS URL, used when a
/// `kind=identity` firehose frame is the first time a DID is seen.
pub async fn insert_user_placeholder(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
    handle: &str,
) -> Result<User> {
    let user = query_as!(
        User,
        r#"
        INSERT INTO users (did, handle, pds_url)
        VALUES ($1, $2, '')
        ON CONFLICT (did) DO NOTHING
        RETURNING *
        "#,
        did,
        handle.to_lowercase(),
    )
    .fetch_optional(&mut **tx)
    .await?;

    match user {
        Some(user) => Ok(user),
        None => find_user_by_did(tx, did)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {did} vanished after insert race")),
    }
}

/// Changes `users.handle`. Caller is responsible for purging the identity
/// cache AFTER this commits: write the new handle first, purge second.
pub async fn update_handle(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
    new_handle: &str,
) -> Result<()> {
    query!(
        "UPDATE users SET handle = $2, updated_at = now() WHERE did = $1",
        did,
        new_handle.to_lowercase(),
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_pds_url(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
    pds_url: &str,
) -> Result<()> {
    query!(
        "UPDATE users SET pds_url = $2, updated_at = now() WHERE did = $1",
        did,
        pds_url,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_cid: Option<String>,
    pub banner_cid: Option<String>,
}

/// Applies a user-profile record. Fields that failed to parse (see
/// `models::blob::extract_blob_cid`) arrive as `None` here and are left
/// untouched rather than overwriting existing values with NULL.
pub async fn apply_profile_update(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
    update: ProfileUpdate,
) -> Result<()> {
    query!(
        r#"
        UPDATE users
        SET
            display_name = COALESCE($2, display_name),
            bio = COALESCE($3, bio),
            avatar_cid = COALESCE($4, avatar_cid),
            banner_cid = COALESCE($5, banner_cid),
            updated_at = now()
        WHERE did = $1
        "#,
        did,
        update.display_name,
        update.bio,
        update.avatar_cid,
        update.banner_cid,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}
