use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use sqlx::PgPool;
use thiserror::Error;

use crate::identity::document::DidDocument;
use crate::models::identity_cache::{self, Method};
use crate::models::user;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identifier not found: {0}")]
    NotFound(String),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("identity resolution failed: {0}")]
    ResolutionFailed(String),
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub did: String,
    pub handle: String,
    pub pds_url: String,
    pub resolved_at: DateTime<Utc>,
    pub method: Method,
}

fn is_did(identifier: &str) -> bool {
    identifier.starts_with("did:")
}

/// Resolves and caches DID/handle identity. Exposes `resolve`, `resolve_handle`,
/// `resolve_did`, and `purge`, all backed by the `identity_cache` table so
/// that every projector task and read request shares the same cache state
/// instead of each holding its own in-memory copy.
pub struct IdentityResolver {
    pool: PgPool,
    http: Client,
    directory_url: String,
    ttl: std::time::Duration,
}

impl IdentityResolver {
    pub fn new(pool: PgPool, directory_url: String, ttl: std::time::Duration) -> Self {
        Self {
            pool,
            http: Client::new(),
            directory_url,
            ttl,
        }
    }

    /// Resolves an identifier (DID or handle) to a full `Identity`. On a
    /// cache hit with `expires_at > now`, returns the cached row marked
    /// `method = cache`. On a miss, calls the upstream identity directory,
    /// caches both keyed rows, then returns `method = upstream`.
    pub async fn resolve(&self, identifier: &str) -> Result<Identity, IdentityError> {
        if identifier.is_empty() {
            return Err(IdentityError::InvalidIdentifier(identifier.to_string()));
        }
        let key = if is_did(identifier) {
            identifier.to_string()
        } else {
            identifier.to_lowercase()
        };

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        if let Some(row) = identity_cache::find_by_key(&mut tx, &key).await.map_err(db_err)? {
            if row.expires_at > Utc::now() {
                tx.commit().await.map_err(db_err)?;
                return Ok(Identity {
                    did: row.did,
                    handle: row.handle,
                    pds_url: row.pds_url,
                    resolved_at: row.resolved_at,
                    method: Method::Cache,
                });
            }
        }
        tx.commit().await.map_err(db_err)?;

        let doc = self.fetch_upstream(identifier).await?;
        let did = doc.id.clone();
        let handle = doc
            .handle()
            .ok_or_else(|| IdentityError::ResolutionFailed("document has no handle".to_string()))?
            .to_string();
        let pds_url = doc
            .pds_url()
            .ok_or_else(|| IdentityError::ResolutionFailed("document has no PDS endpoint".to_string()))?
            .to_string();

        let expires_at = Utc::now()
            + ChronoDuration::from_std(self.ttl)
                .unwrap_or_else(|_| ChronoDuration::hours(24));

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        identity_cache::upsert_pair(&mut tx, &did, &handle, &pds_url, expires_at)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        Ok(Identity {
            did,
            handle,
            pds_url,
            resolved_at: Utc::now(),
            method: Method::Upstream,
        })
    }

    pub async fn resolve_handle(&self, handle: &str) -> Result<(String, String), IdentityError> {
        let identity = self.resolve(handle).await?;
        Ok((identity.did, identity.pds_url))
    }

    pub async fn resolve_did(&self, did: &str) -> Result<DidDocument, IdentityError> {
        if !is_did(did) {
            return Err(IdentityError::InvalidIdentifier(did.to_string()));
        }
        self.fetch_upstream(did).await
    }

    /// Removes every cache row for `identifier` (and the paired DID/handle),
    /// as a single atomic SQL statement. Called by the user-identity
    /// projector after the new handle has been committed: write the new
    /// handle first, purge the cache second, so a concurrent reader never
    /// observes a purged cache paired with a stale handle.
    pub async fn purge(&self, identifier: &str) -> Result<(), IdentityError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        identity_cache::purge(&mut tx, identifier).await.map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn fetch_upstream(&self, identifier: &str) -> Result<DidDocument, IdentityError> {
        let url = format!(
            "{}/{}",
            self.directory_url.trim_end_matches('/'),
            urlencoding::encode(identifier)
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| IdentityError::ResolutionFailed(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(IdentityError::NotFound(identifier.to_string()));
        }
        if !response.status().is_success() {
            return Err(IdentityError::ResolutionFailed(format!(
                "directory returned {}",
                response.status()
            )));
        }

        response
            .json::<DidDocument>()
            .await
            .map_err(|e| IdentityError::ResolutionFailed(e.to_string()))
    }
}

fn db_err(err: sqlx::Error) -> IdentityError {
    IdentityError::ResolutionFailed(err.to_string())
}

/// Backfills a placeholder user's PDS URL once an identity resolves, keeping
/// `users.pds_url` from going stale. Not part of the resolver's core
/// contract, but every projector that touches a new DID calls it.
pub async fn backfill_user_pds_url(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    did: &str,
    pds_url: &str,
) -> anyhow::Result<()> {
    user::update_pds_url(tx, did, pds_url).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_did_detects_prefix() {
        assert!(is_did("did:plc:abc123"));
        assert!(!is_did("alice.example"));
    }
}
