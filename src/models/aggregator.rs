use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{query_as, Postgres, Transaction};

#[derive(Clone, Debug, Serialize)]
pub struct Aggregator {
    pub did: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub maintainer_did: String,
    pub source_url: Option<String>,
    pub config_schema: Value,
    pub record_uri: String,
    pub record_cid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct AggregatorRecord {
    pub did: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub maintainer_did: String,
    pub source_url: Option<String>,
    pub config_schema: Value,
    pub record_uri: String,
    pub record_cid: String,
}

/// Service declarations live at `rkey=self` in the aggregator's own repo;
/// callers must reject any other rkey before calling this.
pub async fn upsert_aggregator(
    tx: &mut Transaction<'_, Postgres>,
    record: AggregatorRecord,
) -> Result<Aggregator> {
    let aggregator = query_as!(
        Aggregator,
        r#"
        INSERT INTO aggregators (
            did, display_name, description, maintainer_did, source_url,
            config_schema, record_uri, record_cid
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (did) DO UPDATE SET
            display_name = excluded.display_name,
            description = excluded.description,
            maintainer_did = excluded.maintainer_did,
            source_url = excluded.source_url,
            config_schema = excluded.config_schema,
            record_uri = excluded.record_uri,
            record_cid = excluded.record_cid,
            updated_at = now()
        RETURNING *
        "#,
        record.did,
        record.display_name,
        record.description,
        record.maintainer_did,
        record.source_url,
        record.config_schema,
        record.record_uri,
        record.record_cid,
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(aggregator)
}

pub async fn find_aggregator_by_did(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
) -> Result<Option<Aggregator>> {
    let aggregator = query_as!(Aggregator, "SELECT * FROM aggregators WHERE did = $1", did)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(aggregator)
}

#[derive(Clone, Debug, Serialize)]
pub struct Authorization {
    pub aggregator_did: String,
    pub community_did: String,
    pub enabled: bool,
    pub created_by: String,
    pub disabled_by: Option<String>,
    pub disabled_at: Option<DateTime<Utc>>,
    pub config: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct AuthorizationRecord {
    pub aggregator_did: String,
    pub community_did: String,
    pub enabled: bool,
    pub created_by: String,
    pub config: Value,
}

/// Authorizations live in the community's own repo; their `communityDid`
/// field must equal the repository owner — callers enforce that before
/// calling this.
pub async fn upsert_authorization(
    tx: &mut Transaction<'_, Postgres>,
    record: AuthorizationRecord,
) -> Result<Authorization> {
    let authorization = query_as!(
        Authorization,
        r#"
        INSERT INTO authorizations (
            aggregator_did, community_did, enabled, created_by, config
        )
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (aggregator_did, community_did) DO UPDATE SET
            enabled = excluded.enabled,
            config = excluded.config,
            disabled_by = NULL,
            disabled_at = NULL,
            updated_at = now()
        RETURNING *
        "#,
        record.aggregator_did,
        record.community_did,
        record.enabled,
        record.created_by,
        record.config,
    )
    .fetch_one(&mut **tx)
    .await?;
    Ok(authorization)
}
