use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};
use visit_alerts::config::AppConfig;
use visit_alerts::db::{self, PgStore};
use visit_alerts::models::AlertType;
use visit_alerts::processor::{MessageSweep, Monitor, VisitSweep};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    info!("Starting visit alert monitors...");

    // Init DB
    let pool = db::init_pool(&config.database_url, config.db_max_connections).await?;
    let store = Arc::new(PgStore::new(pool).await?);
    info!("Connected to database");

    let timeout = config.store_timeout();
    let mut monitors = Vec::new();

    if config.late_visits.enabled {
        let sweep = VisitSweep::new(
            store.clone(),
            store.clone(),
            config.late_visits.clone(),
            timeout,
        )
        .raising(&[AlertType::LateArrival]);
        monitors.push(Monitor::new(
            "late-visits",
            config.late_visits.poll_interval(),
            Arc::new(sweep),
        ));
    }

    if config.visit_sync.enabled {
        let sweep = VisitSweep::new(
            store.clone(),
            store.clone(),
            config.visit_sync.clone(),
            timeout,
        );
        monitors.push(Monitor::new(
            "visit-alerts-sync",
            config.visit_sync.poll_interval(),
            Arc::new(sweep),
        ));
    }

    if config.messages.enabled {
        let sweep = MessageSweep::new(
            store.clone(),
            store.clone(),
            config.messages.clone(),
            timeout,
        );
        monitors.push(Monitor::new(
            "representative-messages",
            config.messages.poll_interval(),
            Arc::new(sweep),
        ));
    }

    for monitor in monitors.iter_mut() {
        if !monitor.start() {
            warn!(monitor = %monitor.name(), "Monitor was already running");
        }
    }
    info!(count = monitors.len(), "Monitors running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for in-flight runs");

    join_all(monitors.iter_mut().map(|m| m.stop())).await;
    for monitor in &monitors {
        let status = monitor.status();
        info!(monitor = %status.name, runs = status.runs, "Monitor shut down");
    }

    Ok(())
}
