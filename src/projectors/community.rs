use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::config::AppConfig;
use crate::firehose::envelope::Commit;
use crate::models::community::{self, CommunityProfileRecord, Visibility};

use super::{is_delete, require_record};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommunityProfilePayload {
    did: String,
    handle: String,
    name: String,
    display_name: Option<String>,
    description: Option<String>,
    owner_did: String,
    created_by_did: String,
    hosted_by: String,
    #[serde(default)]
    visibility: PayloadVisibility,
    #[serde(default = "default_moderation_type")]
    moderation_type: String,
    #[serde(default)]
    content_warnings: Value,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum PayloadVisibility {
    #[default]
    Public,
    Private,
    Restricted,
}

fn default_moderation_type() -> String {
    "standard".to_string()
}

impl From<PayloadVisibility> for Visibility {
    fn from(value: PayloadVisibility) -> Self {
        match value {
            PayloadVisibility::Public => Visibility::Public,
            PayloadVisibility::Private => Visibility::Private,
            PayloadVisibility::Restricted => Visibility::Restricted,
        }
    }
}

/// Checks the `hostedBy` claim against the host segment of a `did:web`
/// community DID. Non-`did:web` DIDs (e.g. `did:plc:...`) have no host to
/// verify and always pass.
fn verify_hosted_by(community_did: &str, hosted_by: &str) -> bool {
    match community_did.strip_prefix("did:web:") {
        Some(host) => host == hosted_by,
        None => true,
    }
}

/// Checks the `hostedBy` claim against this instance's own domain. Distinct
/// from `verify_hosted_by`: that checks the claim is *self-consistent* with
/// the community's did:web host, this checks the claim actually names the
/// instance doing the indexing. Instances that aren't themselves `did:web`
/// have no domain to compare against and always pass.
fn verify_instance_domain(config: &AppConfig, hosted_by: &str) -> bool {
    match config.instance_domain() {
        Some(domain) => domain == hosted_by,
        None => true,
    }
}

/// Projects `community.profile` records. The community's identity comes from
/// the `did` field inside the record, not the repository that hosts it — a
/// community's profile may be published from its own repo or from an
/// aggregator acting on its behalf, so the repo owner (`event_did`) is not
/// trusted for keying.
pub async fn project(pool: &PgPool, config: &AppConfig, event_did: &str, commit: &Commit) -> Result<(), AppError> {
    if is_delete(commit) {
        tracing::debug!(did = event_did, "community.profile deletions are not projected");
        return Ok(());
    }

    let record = require_record(commit)?;
    let payload: CommunityProfilePayload = serde_json::from_value(record.clone())
        .map_err(|e| AppError::validation(format!("malformed community.profile record: {e}")))?;

    if config.did_web_verification_enabled
        && !config.trust_external_hosts
        && !verify_hosted_by(&payload.did, &payload.hosted_by)
    {
        return Err(AppError::unauthorized(format!(
            "community {} claims hostedBy={} which does not match its did:web host",
            payload.did, payload.hosted_by
        )));
    }

    if !config.trust_external_hosts && !verify_instance_domain(config, &payload.hosted_by) {
        return Err(AppError::unauthorized(format!(
            "community {} claims hostedBy={} but this instance only accepts hostedBy={}",
            payload.did,
            payload.hosted_by,
            config.instance_domain().unwrap_or_default()
        )));
    }

    let record_uri = format!("at://{}/community.profile/{}", event_did, commit.rkey);
    let record_cid = commit
        .cid
        .clone()
        .ok_or_else(|| AppError::validation("community.profile commit is missing a cid"))?;

    let mut tx = pool.begin().await?;
    community::upsert_community_profile(
        &mut tx,
        CommunityProfileRecord {
            did: payload.did,
            handle: payload.handle,
            name: payload.name,
            display_name: payload.display_name,
            description: payload.description,
            owner_did: payload.owner_did,
            created_by_did: payload.created_by_did,
            hosted_by_did: payload.hosted_by,
            visibility: payload.visibility.into(),
            moderation_type: payload.moderation_type,
            content_warnings: payload.content_warnings,
            record_uri,
            record_cid,
        },
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_hosted_by_matches_did_web_host() {
        assert!(verify_hosted_by("did:web:coves.example", "coves.example"));
        assert!(!verify_hosted_by("did:web:coves.example", "other.example"));
    }

    #[test]
    fn verify_hosted_by_passes_non_web_dids() {
        assert!(verify_hosted_by("did:plc:abc123", "anything"));
    }

    fn test_config(instance_did: &str) -> AppConfig {
        AppConfig {
            db_url: "postgres://localhost/coves".into(),
            db_max_connections: 5,
            db_acquire_timeout: std::time::Duration::from_secs(5),
            firehose_urls: Default::default(),
            identity_directory_url: "https://plc.example".into(),
            identity_cache_ttl: std::time::Duration::from_secs(3600),
            instance_did: instance_did.into(),
            trust_external_hosts: false,
            did_web_verification_enabled: true,
            cursor_hmac_secret: "secret".into(),
            rate_limits: Default::default(),
        }
    }

    #[test]
    fn verify_instance_domain_rejects_foreign_domain() {
        let cfg = test_config("did:web:coves.example");
        assert!(verify_instance_domain(&cfg, "coves.example"));
        assert!(!verify_instance_domain(&cfg, "other-instance.example"));
    }

    #[test]
    fn verify_instance_domain_passes_when_instance_has_no_web_did() {
        let cfg = test_config("did:plc:instance123");
        assert!(verify_instance_domain(&cfg, "anything.example"));
    }
}
