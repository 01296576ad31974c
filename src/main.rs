use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sharetrail::analytics::HmacVisitorIdentity;
use sharetrail::api;
use sharetrail::clock::SystemClock;
use sharetrail::config::{Config, DatabaseBackend};
use sharetrail::storage::{
    CachedShareDirectory, DocumentStore, MemoryStore, ShareDirectory, SqliteStore,
    StoreShareDirectory,
};
use sharetrail::AccessTracker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let store: Arc<dyn DocumentStore> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStore::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage (data is lost on restart)");
            Arc::new(MemoryStore::with_required_indexes())
        }
    };

    info!("Initializing database...");
    store.init().await?;
    info!("Database initialized successfully");

    let directory: Arc<dyn ShareDirectory> = Arc::new(CachedShareDirectory::new(
        Arc::new(StoreShareDirectory::new(Arc::clone(&store))),
        config.cache.owner_cache_max_entries,
        config.cache.owner_cache_ttl_secs,
    ));

    let identity = Arc::new(HmacVisitorIdentity::new(
        config.identity.visitor_id_secret.as_deref(),
        config.identity.app_host.clone(),
    )?);

    let tracker = Arc::new(
        AccessTracker::new(store, directory, identity, Arc::new(SystemClock))
            .with_live_fallback_limit(config.analytics.live_fallback_limit),
    );

    info!(
        "Trusted proxy mode: {:?} ({} trusted networks)",
        config.analytics.trusted_proxy_mode,
        config.analytics.trusted_proxies.len()
    );

    let router = api::create_api_router(tracker, config.analytics.clone());

    let api_addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;
    info!("🚀 API server listening on http://{}", api_addr);
    info!("   - API endpoints available at http://{}/api/...", api_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
