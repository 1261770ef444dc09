use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use routeplane::config::Config;
use routeplane::snapshot::SnapshotHealth;
use routeplane::Engine;

// ========================================
// MAIN ENTRY POINT
// ========================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::global();
    init_tracing(&config.server.log_level);

    tracing::info!("[Server] Routeplane v{} starting", env!("CARGO_PKG_VERSION"));
    let engine = Engine::from_config(config)?;

    let failures = engine.reprovision();
    if !failures.is_empty() {
        tracing::warn!("[Server] {} topic(s) could not be re-provisioned", failures.len());
    }

    spawn_health_monitor(engine.clone(), config.snapshot.health_interval_secs);
    if config.snapshot.export_interval_secs > 0 {
        spawn_auto_export(engine.clone(), config.snapshot.export_interval_secs);
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("[Server] Shutdown requested");

    if config.snapshot.export_on_shutdown {
        let snapshots = Arc::clone(&engine.snapshots);
        match tokio::task::spawn_blocking(move || snapshots.export(Some("shutdown".to_string()))).await? {
            Ok(snapshot) => tracing::info!("[Server] Final snapshot '{}' written", snapshot.id()),
            Err(e) => tracing::error!("[Server] Final snapshot failed: {}", e),
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn spawn_health_monitor(engine: Engine, every_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every_secs.max(1)));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let health = Arc::clone(&engine.health);
            match tokio::task::spawn_blocking(move || health.check()).await {
                Ok(SnapshotHealth::Healthy { lag_ms }) => {
                    tracing::debug!("[Health] Snapshot current (lag {} ms)", lag_ms)
                }
                Ok(unhealthy) => tracing::warn!("[Health] Snapshot {}", unhealthy),
                Err(e) => tracing::error!("[Health] Check aborted: {}", e),
            }
        }
    });
}

fn spawn_auto_export(engine: Engine, every_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(every_secs));
        interval.tick().await;
        loop {
            interval.tick().await;
            // Nothing changed since the last export.
            if engine.registry.last_modified() <= engine.snapshots.last_persisted() {
                continue;
            }
            let snapshots = Arc::clone(&engine.snapshots);
            match tokio::task::spawn_blocking(move || snapshots.export(Some("periodic".to_string()))).await {
                Ok(Ok(snapshot)) => tracing::info!("[Server] Periodic snapshot '{}' written", snapshot.id()),
                Ok(Err(e)) => tracing::error!("[Server] Periodic snapshot failed: {}", e),
                Err(e) => tracing::error!("[Server] Periodic snapshot aborted: {}", e),
            }
        }
    });
}
