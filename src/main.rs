use std::env::args;
use std::process::exit;

use coves_appview::web::app::App;
use coves_appview::AppConfig;
use tracing_subscriber::EnvFilter;

fn main() {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            let args: Vec<String> = args().collect();
            if args.len() < 2 {
                println!("usage: {} CFG", args.first().unwrap_or(&"coves-appview".to_string()));
                exit(1);
            }

            let cfg: AppConfig = AppConfig::new_from_file_and_env(args[1].as_ref()).unwrap_or_else(|e| {
                eprintln!("error: {e}");
                exit(1);
            });

            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .init();

            tracing::info!(instance_did = %cfg.instance_did, "starting coves appview");

            let app = App::new(cfg).await.unwrap_or_else(|e| {
                eprintln!("fatal: {e}");
                exit(1);
            });
            app.serve().await.unwrap_or_else(|e| {
                eprintln!("fatal: {e}");
                exit(1);
            });
        });
}
