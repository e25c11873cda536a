use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::models::blob;
use crate::models::community::{self, Community};
use crate::models::user::{self, User};
use crate::models::vote::{self, Direction};

/// An author as served to clients: blob CIDs resolved to fetchable URLs
/// against the author's own PDS, per the `getBlob` convention, rather than
/// leaving the client to construct those URLs itself.
#[derive(Clone, Debug, Serialize)]
pub struct UserView {
    pub did: String,
    pub handle: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        let avatar_url = user
            .avatar_cid
            .as_deref()
            .map(|cid| blob::blob_url(&user.pds_url, &user.did, cid));
        let banner_url = user
            .banner_cid
            .as_deref()
            .map(|cid| blob::blob_url(&user.pds_url, &user.did, cid));
        Self {
            did: user.did,
            handle: user.handle,
            display_name: user.display_name,
            bio: user.bio,
            avatar_url,
            banner_url,
            created_at: user.created_at,
        }
    }
}

/// Batched author lookup, keyed by DID, for hydrating a page of rows in one
/// round trip rather than one query per row.
pub async fn users_by_did(pool: &PgPool, dids: &[String]) -> Result<HashMap<String, UserView>, AppError> {
    let rows = user::find_users_by_dids(pool, dids).await?;
    Ok(rows.into_iter().map(|u| (u.did.clone(), u.into())).collect())
}

pub async fn communities_by_did(
    pool: &PgPool,
    dids: &[String],
) -> Result<HashMap<String, Community>, AppError> {
    let rows = community::find_communities_by_dids(pool, dids).await?;
    Ok(rows.into_iter().map(|c| (c.did.clone(), c)).collect())
}

/// Batched viewer-vote hydration over a set of subject URIs, one query per
/// tree-expansion level rather than one per subject.
pub async fn viewer_votes(
    pool: &PgPool,
    voter_did: &str,
    subject_uris: &[String],
) -> Result<HashMap<String, (Direction, String)>, AppError> {
    if subject_uris.is_empty() {
        return Ok(HashMap::new());
    }
    let mut tx = pool.begin().await?;
    let votes = vote::find_votes_by_voter_and_subjects(&mut tx, voter_did, subject_uris).await?;
    tx.commit().await?;
    Ok(votes
        .into_iter()
        .map(|v| (v.subject_uri.clone(), (v.direction, v.uri)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_view_hydrates_blob_urls() {
        let user = User {
            did: "did:plc:alice".to_string(),
            handle: "alice.example".to_string(),
            pds_url: "https://pds.example".to_string(),
            display_name: None,
            bio: None,
            avatar_cid: Some("bafyavatar".to_string()),
            banner_cid: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let view: UserView = user.into();
        assert_eq!(
            view.avatar_url.as_deref(),
            Some("https://pds.example/xrpc/com.atproto.sync.getBlob?did=did%3Aplc%3Aalice&cid=bafyavatar")
        );
        assert_eq!(view.banner_url, None);
    }
}
