use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::firehose::envelope::{Commit, Operation};
use crate::models::aggregator::{self, AggregatorRecord, AuthorizationRecord};

use super::require_record;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServicePayload {
    display_name: Option<String>,
    description: Option<String>,
    maintainer_did: String,
    source_url: Option<String>,
    #[serde(default)]
    config_schema: Value,
}

/// Projects `aggregator.service` records. Declarations live at `rkey=self`
/// in the aggregator's own repo; any other rkey is a malformed record.
pub async fn project_service(pool: &PgPool, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    if commit.rkey != "self" {
        return Err(AppError::validation(format!(
            "aggregator.service record must use rkey=self, got {}",
            commit.rkey
        )));
    }
    if commit.operation == Operation::Delete {
        tracing::debug!(did = event_did, "aggregator.service deletions are not projected");
        return Ok(());
    }

    let record = require_record(commit)?;
    let payload: ServicePayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed aggregator.service record: {e}")))?;
    let record_uri = format!("at://{}/aggregator.service/self", event_did);
    let record_cid = commit
        .cid
        .clone()
        .ok_or_else(|| AppError::validation("aggregator.service commit is missing a cid"))?;

    let mut tx = pool.begin().await?;
    aggregator::upsert_aggregator(
        &mut tx,
        AggregatorRecord {
            did: event_did.to_string(),
            display_name: payload.display_name,
            description: payload.description,
            maintainer_did: payload.maintainer_did,
            source_url: payload.source_url,
            config_schema: payload.config_schema,
            record_uri,
            record_cid,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationPayload {
    aggregator_did: String,
    community_did: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    created_by: String,
    #[serde(default)]
    config: Value,
}

fn default_enabled() -> bool {
    true
}

/// Projects `aggregator.authorization` records. Authorizations live in the
/// community's own repo; their `communityDid` field must equal the
/// repository owner, or this is a spoof attempt.
pub async fn project_authorization(pool: &PgPool, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    if commit.operation == Operation::Delete {
        // Delete commits carry no record body, and the authorization table
        // has no rkey column to resolve which aggregator this rkey named.
        // Disabling it requires the aggregatorDid, which tombstone commits
        // don't provide; nothing to do until the authoring client also
        // issues a record-bearing update.
        tracing::debug!(
            community_did = event_did,
            rkey = %commit.rkey,
            "aggregator.authorization delete has no record body, cannot resolve aggregator to disable"
        );
        return Ok(());
    }

    let record = require_record(commit)?;
    let payload: AuthorizationPayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed aggregator.authorization record: {e}")))?;

    if payload.community_did != event_did {
        return Err(AppError::unauthorized(format!(
            "aggregator.authorization claims communityDid={} but its repository owner is {event_did}",
            payload.community_did
        )));
    }

    let mut tx = pool.begin().await?;
    aggregator::upsert_authorization(
        &mut tx,
        AuthorizationRecord {
            aggregator_did: payload.aggregator_did,
            community_did: payload.community_did,
            enabled: payload.enabled,
            created_by: payload.created_by,
            config: payload.config,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(())
}
