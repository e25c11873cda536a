use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{query, query_as, PgPool, Postgres, Transaction, Type};

#[derive(Clone, Debug, Serialize, Type, PartialEq)]
#[sqlx(type_name = "community_visibility", rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
    Restricted,
}

#[derive(Clone, Debug, Serialize)]
pub struct Community {
    pub did: String,
    pub handle: String,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub owner_did: String,
    pub created_by_did: String,
    pub hosted_by_did: String,
    pub visibility: Visibility,
    pub moderation_type: String,
    pub content_warnings: Value,
    pub member_count: i32,
    pub subscriber_count: i32,
    pub record_uri: String,
    pub record_cid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct CommunityProfileRecord {
    pub did: String,
    pub handle: String,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub owner_did: String,
    pub created_by_did: String,
    pub hosted_by_did: String,
    pub visibility: Visibility,
    pub moderation_type: String,
    pub content_warnings: Value,
    pub record_uri: String,
    pub record_cid: String,
}

pub async fn find_community_by_did(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
) -> Result<Option<Community>> {
    let community = query_as!(
        Community,
        r#"
        SELECT
            did, handle, name, display_name, description, owner_did,
            created_by_did, hosted_by_did,
            visibility AS "visibility: Visibility",
            moderation_type, content_warnings, member_count, subscriber_count,
            record_uri, record_cid, created_at, updated_at
        FROM communities
        WHERE did = $1
        "#,
        did
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(community)
}

/// Batched lookup for read-model hydration.
pub async fn find_communities_by_dids(pool: &PgPool, dids: &[String]) -> Result<Vec<Community>> {
    if dids.is_empty() {
        return Ok(Vec::new());
    }
    let communities = query_as!(
        Community,
        r#"
        SELECT
            did, handle, name, display_name, description, owner_did,
            created_by_did, hosted_by_did,
            visibility AS "visibility: Visibility",
            moderation_type, content_warnings, member_count, subscriber_count,
            record_uri, record_cid, created_at, updated_at
        FROM communities
        WHERE did = ANY($1)
        "#,
        dids
    )
    .fetch_all(pool)
    .await?;
    Ok(communities)
}

/// Inserts a community from a `community.profile` CREATE, or — following
/// the update-before-create rule — upgrades an UPDATE for an unknown
/// community into a create.
pub async fn upsert_community_profile(
    tx: &mut Transaction<'_, Postgres>,
    record: CommunityProfileRecord,
) -> Result<Community> {
    let community = query_as!(
        Community,
        r#"
        INSERT INTO communities (
            did, handle, name, display_name, description, owner_did,
            created_by_did, hosted_by_did, visibility, moderation_type,
            content_warnings, record_uri, record_cid
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (did) DO UPDATE SET
            handle = excluded.handle,
            name = excluded.name,
            display_name = excluded.display_name,
            description = excluded.description,
            hosted_by_did = excluded.hosted_by_did,
            visibility = excluded.visibility,
            moderation_type = excluded.moderation_type,
            content_warnings = excluded.content_warnings,
            record_uri = excluded.record_uri,
            record_cid = excluded.record_cid,
            updated_at = now()
        RETURNING
            did, handle, name, display_name, description, owner_did,
            created_by_did, hosted_by_did,
            visibility AS "visibility: Visibility",
            moderation_type, content_warnings, member_count, subscriber_count,
            record_uri, record_cid, created_at, updated_at
        "#,
        record.did,
        record.handle,
        record.name,
        record.display_name,
        record.description,
        record.owner_did,
        record.created_by_did,
        record.hosted_by_did,
        record.visibility as Visibility,
        record.moderation_type,
        record.content_warnings,
        record.record_uri,
        record.record_cid,
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(community)
}

/// `community.subscriber_count += delta` with a zero floor.
pub async fn adjust_subscriber_count(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
    delta: i32,
) -> Result<()> {
    query!(
        r#"
        UPDATE communities
        SET subscriber_count = GREATEST(0, subscriber_count + $2), updated_at = now()
        WHERE did = $1
        "#,
        did,
        delta,
    )
    .execute(&mut **tx)
    .await?;
    Ok(())
}
