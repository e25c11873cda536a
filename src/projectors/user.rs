use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::firehose::envelope::{Commit, IdentityFrame, Operation};
use crate::identity::IdentityResolver;
use crate::models::blob;
use crate::models::user::{self, ProfileUpdate};

use super::require_record;

/// Projects `kind=identity` firehose frames. If the DID is new, the user is
/// inserted with a placeholder PDS URL; if its handle changed, the new
/// handle is written first and the identity cache purged second so a
/// concurrent reader never sees a purged cache paired with a stale handle.
pub async fn project_identity(
    pool: &PgPool,
    identity: &IdentityResolver,
    frame: &IdentityFrame,
) -> Result<(), AppError> {
    let Some(handle) = frame.handle.as_deref() else {
        tracing::debug!(did = %frame.did, "identity frame without a handle, nothing to project");
        return Ok(());
    };

    let mut tx = pool.begin().await?;
    let existing = user::find_user_by_did(&mut tx, &frame.did).await?;

    match existing {
        None => {
            user::insert_user_placeholder(&mut tx, &frame.did, handle).await?;
            tx.commit().await?;
        }
        Some(row) if row.handle != handle.to_lowercase() => {
            user::update_handle(&mut tx, &frame.did, handle).await?;
            tx.commit().await?;
            identity
                .purge(&row.handle)
                .await
                .map_err(|e| AppError::Transient(e.to_string()))?;
            identity
                .purge(&frame.did)
                .await
                .map_err(|e| AppError::Transient(e.to_string()))?;
        }
        Some(_) => {
            tx.commit().await?;
        }
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfilePayload {
    display_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    avatar: Option<Value>,
    #[serde(default)]
    banner: Option<Value>,
}

/// Projects user-profile records, pulling `displayName`/`description` and
/// unpacking blob-ref CIDs for avatar/banner. Invalid blob structures
/// degrade to "field not updated" rather than erroring.
pub async fn project_profile(pool: &PgPool, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    if commit.operation == Operation::Delete {
        tracing::debug!(did = event_did, "user-profile deletions are not projected");
        return Ok(());
    }

    let record = require_record(commit)?;
    let payload: ProfilePayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed user-profile record: {e}")))?;

    let mut tx = pool.begin().await?;
    if user::find_user_by_did(&mut tx, event_did).await?.is_none() {
        tx.rollback().await.ok();
        tracing::debug!(did = event_did, "profile for unindexed user, will retry on replay");
        return Ok(());
    }

    user::apply_profile_update(
        &mut tx,
        event_did,
        ProfileUpdate {
            display_name: payload.display_name,
            bio: payload.description,
            avatar_cid: blob::extract_blob_cid(payload.avatar.as_ref()),
            banner_cid: blob::extract_blob_cid(payload.banner.as_ref()),
        },
    )
    .await?;
    tx.commit().await?;
    Ok(())
}
