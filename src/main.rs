//! calwatch - restaurant availability calendar watcher
//!
//! Polls reservation calendars for each configured watch, records what
//! changed since the last look, and posts the changes to a webhook.

mod calendar;
mod config;
mod db;
mod diff;
mod notify;
mod scheduler;
#[cfg(test)]
mod testutil;
mod watches;
mod web;

use calendar::TabelogClient;
use config::ServerConfig;
use db::Store;
use notify::DiscordNotifier;
use scheduler::{Scheduler, SystemClock};
use web::Server;

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("calwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting calwatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let calendar = Arc::new(TabelogClient::new(&cfg)?);
    let notifier = Arc::new(DiscordNotifier::new(cfg.request_timeout())?);
    let clock = Arc::new(SystemClock);

    // Start scheduler
    let scheduler = Scheduler::new(
        store.clone(),
        calendar.clone(),
        calendar.clone(),
        notifier,
        clock.clone(),
        cfg.tick_interval(),
        cfg.request_timeout(),
    );
    let (stop_tx, stop_rx) = broadcast::channel(1);
    let scheduler_task = tokio::spawn(scheduler.run(stop_rx));

    // Start web server
    let server = Server::new(cfg, store, calendar, clock);
    let served = server.start(shutdown_signal()).await;

    let _ = stop_tx.send(());
    if let Err(e) = scheduler_task.await {
        tracing::error!("Scheduler task ended abnormally: {}", e);
    }

    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
