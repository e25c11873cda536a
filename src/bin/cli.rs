use std::process::exit;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use coves_appview::identity::IdentityResolver;
use coves_appview::models::{comment, post};
use coves_appview::AppConfig;

#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[arg(short, long)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a handle or DID against the identity directory, bypassing
    /// nothing — this always hits the cache-then-upstream path a firehose
    /// projector would.
    Resolve { identifier: String },
    /// Force-purge an identifier's identity-cache rows.
    PurgeIdentity { identifier: String },
    /// Recompute a post's comment_count from its live children.
    ReconcilePost { uri: String },
    /// Recompute a comment's reply_count from its live children.
    ReconcileComment { uri: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = AppConfig::new_from_file_and_env(&cli.config).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        exit(1);
    });
    let pool = cfg.connect_database().await?;

    match cli.command {
        Commands::Resolve { identifier } => {
            let identity = IdentityResolver::new(pool, cfg.identity_directory_url, cfg.identity_cache_ttl);
            let resolved = identity.resolve(&identifier).await?;
            println!("did:        {}", resolved.did);
            println!("handle:     {}", resolved.handle);
            println!("pds_url:    {}", resolved.pds_url);
            println!("method:     {:?}", resolved.method);
        }
        Commands::PurgeIdentity { identifier } => {
            let identity = Arc::new(IdentityResolver::new(
                pool,
                cfg.identity_directory_url,
                cfg.identity_cache_ttl,
            ));
            identity.purge(&identifier).await?;
            println!("purged cache rows for {identifier}");
        }
        Commands::ReconcilePost { uri } => {
            let mut tx = pool.begin().await?;
            post::reconcile_comment_count(&mut tx, &uri).await?;
            tx.commit().await?;
            println!("reconciled comment_count for {uri}");
        }
        Commands::ReconcileComment { uri } => {
            let mut tx = pool.begin().await?;
            comment::reconcile_reply_count(&mut tx, &uri).await?;
            tx.commit().await?;
            println!("reconciled reply_count for {uri}");
        }
    }

    Ok(())
}
