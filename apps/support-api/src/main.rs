use dotenvy::dotenv;
use std::sync::Arc;
use support_api::{AppState, application::middleware::OperatorKeys, create_app};
use support_core::{
    Cache,
    adapters::{
        connection_manager::ConnectionManager, in_memory_cache::InMemoryCache,
        redis_cache::RedisCache,
    },
    catalog::QueryCatalog,
    config::{CacheSettings, Settings},
    domain::LocalClock,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

async fn build_cache(settings: &CacheSettings) -> Arc<dyn Cache> {
    if let Some(url) = &settings.redis_url {
        match RedisCache::new(url, settings.ttl_seconds).await {
            Ok(cache) => return Arc::new(cache),
            Err(e) => warn!("Redis cache unavailable, using in-process cache: {}", e),
        }
    } else {
        info!("REDIS_URL not set, using in-process cache");
    }
    Arc::new(InMemoryCache::new(settings.max_capacity, settings.ttl_seconds))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    // Load environment (.env) if present
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting support API v{}...", env!("CARGO_PKG_VERSION"));

    let settings = match Settings::from_lookup(&env_lookup) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };
    if settings.operator_keys.is_empty() {
        warn!("SUPPORT_API_KEYS not set (every data route will answer 401)");
    }

    let manager = Arc::new(ConnectionManager::new(settings.connect.clone()));
    let connections = Arc::clone(&manager).establish(&env_lookup).await;

    let cache = build_cache(&settings.cache).await;
    let catalog = QueryCatalog::new(
        connections,
        LocalClock::new(settings.display_timezone),
        cache,
        settings.cache.ttl_seconds,
    );
    let app_state = AppState {
        catalog,
        operator_keys: Arc::new(OperatorKeys::from_plain(&settings.operator_keys)),
    };

    let app = create_app(app_state);

    info!("Support API listening on {}", settings.bind_addr);
    let listener = match TcpListener::bind(settings.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to address {}: {}", settings.bind_addr, e);
            manager.close().await;
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server failed to run: {}", e);
    }

    manager.close().await;
    info!("Support API stopped");
}
