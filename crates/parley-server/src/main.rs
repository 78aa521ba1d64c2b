use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_cache::{Cache, MemoryCache};
use parley_server::api::{self, AppState};
use parley_server::config::ServerConfig;
use parley_server::hub::Hub;
use parley_server::transport;
use parley_shared::IdGenerator;
use parley_store::{Database, MessageStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting parley chat server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let database = Arc::new(Database::open_at(&config.db_path)?);
    let store: Arc<dyn MessageStore> = database;

    let memory_cache = Arc::new(MemoryCache::new());
    if let Some(host) = &config.cache.host {
        info!(
            host = %host,
            "external cache backend configured; this build serves from the in-process cache"
        );
    }
    let cache: Arc<dyn Cache> = memory_cache.clone();

    // Sweep expired conversation lists every minute.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            memory_cache.purge_expired().await;
        }
    });

    let transport = transport::build(&config).await?;

    let (hub, handle) = Hub::new(
        transport.clone(),
        store.clone(),
        cache.clone(),
        IdGenerator::new(),
        config.cache_ttl,
        config.channel_size,
    );
    let hub_task = tokio::spawn(hub.run());

    let http_addr = config.http_addr;
    let state = AppState {
        hub: handle,
        transport: transport.clone(),
        store,
        config: Arc::new(config),
    };

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Closing the transport lets the hub drain its stream and exit.
    transport.shutdown().await;
    let _ = hub_task.await;

    if let Err(e) = cache.clear_all().await {
        tracing::warn!(error = %e, "cache flush failed");
    } else {
        info!("cache flushed");
    }

    info!("server stopped");
    Ok(())
}
