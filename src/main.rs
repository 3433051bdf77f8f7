use anyhow::Result;
use std::sync::Arc;
use task_dispatch_core::api::{spawn_background_loops, spawn_presence_watchdog, ApiServer};
use task_dispatch_core::bus::EventBus;
use task_dispatch_core::config::Config;
use task_dispatch_core::store::TaskStore;
use tokio::time::{interval, Duration};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    info!("Starting Task Dispatch & SLA Enforcement Core");

    let config = Config::load()?;

    let store = Arc::new(TaskStore::new(config.dispatch.clone()));
    let bus = Arc::new(EventBus::new());

    let (assigner_handle, monitor_handle) =
        spawn_background_loops(store.clone(), bus.clone(), &config.dispatch);

    let watchdog_handle = spawn_presence_watchdog(
        store.clone(),
        bus.clone(),
        Duration::from_secs(config.dispatch.presence_ttl_secs),
    );

    let api_server = ApiServer::new(config, store.clone(), bus)?;

    let cleanup_store = store.clone();
    let cleanup_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(
            task_dispatch_core::constants::CLEANUP_INTERVAL_SECS,
        ));
        loop {
            ticker.tick().await;
            cleanup_store.cleanup().await;
        }
    });

    tokio::select! {
        result = api_server.run() => {
            if let Err(e) = result {
                error!("API server failed: {e}");
            }
        }
        result = assigner_handle => {
            if let Err(e) = result {
                error!("assigner loop panicked: {e}");
            }
        }
        result = monitor_handle => {
            if let Err(e) = result {
                error!("deadline monitor loop panicked: {e}");
            }
        }
        result = cleanup_handle => {
            if let Err(e) = result {
                error!("cleanup loop panicked: {e}");
            }
        }
        result = watchdog_handle => {
            if let Err(e) = result {
                error!("presence watchdog loop panicked: {e}");
            }
        }
    }

    Ok(())
}
