use std::sync::Arc;

use sqlx::PgPool;

use crate::counters::Counters;
use crate::identity::IdentityResolver;
use crate::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub identity: Arc<IdentityResolver>,
    pub counters: Arc<Counters>,
}
