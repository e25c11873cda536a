use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use sqlx::PgPool;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::counters::Counters;
use crate::firehose::{EventDispatcher, FirehoseConsumer};
use crate::identity::IdentityResolver;
use crate::projectors::ProjectorRegistry;
use crate::web::handlers::{comments, feeds};
use crate::web::state::AppState;
use crate::AppConfig;

pub struct App {
    state: AppState,
    pool: PgPool,
}

impl App {
    pub async fn new(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = config.connect_database().await?;
        sqlx::migrate!().run(&pool).await?;

        let identity = Arc::new(IdentityResolver::new(
            pool.clone(),
            config.identity_directory_url.clone(),
            config.identity_cache_ttl,
        ));
        let counters = Arc::new(Counters::new());

        let state = AppState {
            pool: pool.clone(),
            config: Arc::new(config),
            identity,
            counters,
        };

        Ok(Self { state, pool })
    }

    /// Spawns one firehose-consumer task per configured collection family,
    /// then serves the read-model RPC surface until shutdown.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatcher: Arc<dyn EventDispatcher> = Arc::new(ProjectorRegistry::new(
            self.pool.clone(),
            self.state.identity.clone(),
            self.state.config.clone(),
        ));

        let mut consumer_tasks = Vec::new();
        for (collection, url) in self.state.config.firehose_urls.clone() {
            let consumer = FirehoseConsumer::new(url, self.state.counters.clone());
            let dispatcher = dispatcher.clone();
            let rx = shutdown_rx.clone();
            consumer_tasks.push(tokio::spawn(async move {
                tracing::info!(collection = %collection, "starting firehose consumer");
                consumer.run(dispatcher, rx).await;
            }));
        }

        let app = Router::new()
            .route("/xrpc/social.coves.comment.getThread", get(comments::get_thread))
            .route("/xrpc/social.coves.feed.getTimeline", get(feeds::get_timeline))
            .route("/xrpc/social.coves.feed.getDiscover", get(feeds::get_discover))
            .route(
                "/xrpc/social.coves.feed.getCommunityFeed/:community_did",
                get(feeds::get_community_feed),
            )
            .route("/healthz", get(healthz))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "listening");

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await?;

        for task in consumer_tasks {
            task.await?;
        }

        Ok(())
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
}
