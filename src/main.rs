mod api;
mod chain;
mod config;
mod db;
mod enricher;
mod error;
mod extractor;
mod scheduler;
mod sink;
mod types;

use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::chain::TzktClient;
use crate::config::Config;
use crate::db::SqliteSubscriptionStore;
use crate::enricher::FxhashEnricher;
use crate::error::Result;
use crate::scheduler::FeedScheduler;
use crate::sink::{sink_from_config, LogNotifier};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Collaborators ---
    let chain = Arc::new(TzktClient::new(&cfg)?);
    let enricher = Arc::new(FxhashEnricher::new(&cfg)?);
    let store = SqliteSubscriptionStore::new(pool);
    let sink = sink_from_config(&cfg)?;
    if cfg.delivery_webhook_url.is_none() {
        info!("DELIVERY_WEBHOOK_URL not set — sales will be logged, not delivered");
    }
    let notifier = Arc::new(LogNotifier);

    // --- Feed scheduler task ---
    let (scheduler, handle) = FeedScheduler::new(
        Arc::clone(&chain) as Arc<dyn chain::ChainApi>,
        cfg.marketplace_contract.clone(),
        enricher,
        Arc::new(store.clone()),
        sink,
        notifier,
    );
    tokio::spawn(async move { scheduler.run().await });
    info!(
        "Feed scheduler ready (marketplace {}); POST /feed/start to begin scanning",
        cfg.marketplace_contract
    );

    // --- HTTP control surface ---
    let api_state = ApiState {
        handle,
        store,
        chain,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
