use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sync_engine::db::{establish_connection_pool, PgStore};
use sync_engine::providers::{build_http_client, GoogleCalendarProvider, HttpBotDeployer};
use sync_engine::scheduler::Scheduler;
use sync_engine::status::{self, EngineStatus};
use sync_engine::{SyncConfig, SyncEngine};

#[derive(Parser)]
#[command(name = "meeting-sync")]
#[command(about = "Sync connected calendars and send recording bots to upcoming meetings")]
struct Cli {
    /// Run a single tick, print its report and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meeting_sync=info,sync_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = SyncConfig::from_env()?;

    let pool = establish_connection_pool(&config.database_url)?;
    let store = Arc::new(PgStore::new(pool));
    tracing::info!("Database connection pool initialized");

    let http = build_http_client(config.http_timeout)?;
    let calendar = Arc::new(GoogleCalendarProvider::from_config(http.clone(), &config));
    let bots = Arc::new(HttpBotDeployer::new(
        http,
        config.bot_api_url.clone(),
        config.bot_api_key.clone(),
    ));

    let engine = Arc::new(SyncEngine::new(store, calendar, bots, &config.engine));

    if cli.once {
        let report = engine.run_tick().await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize tick report")?
        );
        return Ok(());
    }

    let shared_status = EngineStatus::shared();

    let listener = tokio::net::TcpListener::bind(config.status_addr)
        .await
        .with_context(|| format!("Failed to bind status server on {}", config.status_addr))?;
    tracing::info!("Status server listening on {}", config.status_addr);

    let app = status::router(shared_status.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Status server error: {:?}", e);
        }
    });

    let scheduler = Scheduler::new(engine, config.sync_interval, shared_status);
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    tracing::info!("Meeting sync running. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping...");

    scheduler_handle.abort();
    server_handle.abort();

    tracing::info!("Meeting sync stopped");
    Ok(())
}
