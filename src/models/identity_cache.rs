use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{query, query_as, Postgres, Transaction, Type};

#[derive(Clone, Copy, Debug, Serialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "identity_resolution_method", rename_all = "snake_case")]
pub enum Method {
    Cache,
    Upstream,
}

/// A single cache row, keyed by either a handle (lowercased) or a DID
/// (case-sensitive) — the same `(did, handle)` pair is stored under both
/// keys so either can be looked up directly.
#[derive(Clone, Debug, Serialize)]
pub struct IdentityCacheRow {
    pub cache_key: String,
    pub did: String,
    pub handle: String,
    pub pds_url: String,
    pub resolved_at: DateTime<Utc>,
    pub method: Method,
    pub expires_at: DateTime<Utc>,
}

pub async fn find_by_key(
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
) -> Result<Option<IdentityCacheRow>> {
    let row = query_as!(
        IdentityCacheRow,
        r#"
        SELECT cache_key, did, handle, pds_url, resolved_at,
            method AS "method: Method", expires_at
        FROM identity_cache
        WHERE cache_key = $1
        "#,
        key
    )
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// Writes both the handle-keyed and DID-keyed rows for a resolved identity
/// in one transaction.
pub async fn upsert_pair(
    tx: &mut Transaction<'_, Postgres>,
    did: &str,
    handle: &str,
    pds_url: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let handle = handle.to_lowercase();
    for key in [did.to_string(), handle.clone()] {
        query!(
            r#"
            INSERT INTO identity_cache (cache_key, did, handle, pds_url, method, expires_at)
            VALUES ($1, $2, $3, $4, 'upstream', $5)
            ON CONFLICT (cache_key) DO UPDATE SET
                did = excluded.did,
                handle = excluded.handle,
                pds_url = excluded.pds_url,
                resolved_at = now(),
                method = 'upstream',
                expires_at = excluded.expires_at
            "#,
            key,
            did,
            handle,
            pds_url,
            expires_at,
        )
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Removes every cache row whose key equals `identifier`, OR whose `did`/
/// `handle` matches a row found by that identifier — a single statement so
/// the handle-keyed and DID-keyed rows disappear atomically.
pub async fn purge(tx: &mut Transaction<'_, Postgres>, identifier: &str) -> Result<u64> {
    let identifier_lc = identifier.to_lowercase();
    let result = query!(
        r#"
        DELETE FROM identity_cache
        WHERE cache_key = $1
           OR cache_key = $2
           OR did IN (SELECT did FROM identity_cache WHERE cache_key IN ($1, $2))
           OR handle IN (SELECT handle FROM identity_cache WHERE cache_key IN ($1, $2))
        "#,
        identifier,
        identifier_lc,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}
