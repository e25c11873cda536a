mod aggregator;
mod comment;
mod community;
mod post;
mod subscription;
mod user;
mod vote;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::app_error::AppError;
use crate::counters::Counters;
use crate::firehose::envelope::{Envelope, Operation};
use crate::identity::IdentityResolver;

/// Routes a decoded firehose envelope to the handler registered for its
/// collection. One instance is shared by every firehose consumer task.
pub struct ProjectorRegistry {
    pool: PgPool,
    identity: Arc<IdentityResolver>,
    config: Arc<crate::config::AppConfig>,
}

impl ProjectorRegistry {
    pub fn new(pool: PgPool, identity: Arc<IdentityResolver>, config: Arc<crate::config::AppConfig>) -> Self {
        Self { pool, identity, config }
    }
}

#[async_trait]
impl crate::firehose::transport::EventDispatcher for ProjectorRegistry {
    async fn dispatch(&self, envelope: Envelope) -> Result<(), AppError> {
        if let Some(identity) = &envelope.identity {
            return user::project_identity(&self.pool, &self.identity, identity).await;
        }
        if let Some(account) = &envelope.account {
            tracing::debug!(did = %account.did, active = account.active, "account frame observed, no handle to project yet");
            return Ok(());
        }

        let Some(commit) = &envelope.commit else {
            return Ok(());
        };

        match commit.collection.as_str() {
            "community.profile" => {
                community::project(&self.pool, &self.config, &envelope.did, commit).await
            }
            "community.subscription" => {
                subscription::project(&self.pool, &envelope.did, commit).await
            }
            "community.post" => post::project(&self.pool, &envelope.did, commit).await,
            "feed.vote" => vote::project(&self.pool, &envelope.did, commit).await,
            "feed.comment" => comment::project(&self.pool, &envelope.did, commit).await,
            "aggregator.service" => aggregator::project_service(&self.pool, &envelope.did, commit).await,
            "aggregator.authorization" => {
                aggregator::project_authorization(&self.pool, &envelope.did, commit).await
            }
            "user.profile" => user::project_profile(&self.pool, &envelope.did, commit).await,
            other => {
                tracing::debug!(collection = other, "ignoring unrecognized collection");
                Ok(())
            }
        }
    }
}

/// Shared helper: only CREATE/UPDATE carry a record payload worth parsing.
pub(crate) fn require_record(
    commit: &crate::firehose::envelope::Commit,
) -> Result<&serde_json::Value, AppError> {
    commit
        .record
        .as_ref()
        .ok_or_else(|| AppError::validation("commit is missing its record payload"))
}

pub(crate) fn is_delete(commit: &crate::firehose::envelope::Commit) -> bool {
    commit.operation == Operation::Delete
}
