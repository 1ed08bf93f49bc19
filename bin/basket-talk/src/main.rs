//! # Basket Talk Binary
//!
//! The entry point that assembles the application based on compile-time
//! features and the loaded configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bt_api::AppState;
use bt_auth_jwt::JwtIdentityProvider;
use bt_cms_wordpress::WordPressSource;
use bt_config::{AppConfig, LogConfig, LogFormat};
use bt_core::traits::CommunityRepo;
use bt_core::Community;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Feature-gated imports
#[cfg(feature = "store-sqlite")]
use bt_store_sqlite::SqliteCommunityRepo;

#[cfg(feature = "store-memory")]
use bt_store_memory::MemoryCommunityRepo;

const MEMORY_STORE_URL: &str = "memory";

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CommunityRepo>> {
    #[cfg(feature = "store-memory")]
    if config.store.url == MEMORY_STORE_URL {
        info!("using the in-process store; data is lost on exit");
        return Ok(Arc::new(MemoryCommunityRepo::new()));
    }

    #[cfg(feature = "store-sqlite")]
    if config.store.url.starts_with("sqlite:") {
        let repo = SqliteCommunityRepo::connect(&config.store.url, config.store.max_connections)
            .await
            .context("failed to open the SQLite store")?;
        return Ok(Arc::new(repo));
    }

    anyhow::bail!(
        "no store compiled in for `{}` (expected `sqlite:...` or `{MEMORY_STORE_URL}`)",
        config.store.url
    )
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("configuration")?;
    init_tracing(&config.log);

    // 1. Storage
    let store = build_store(&config).await?;
    let community = Community::new(store, config.feed_limits());

    // 2. Identity
    let mut identity = JwtIdentityProvider::new(config.auth.jwt_secret.clone());
    if let Some(issuer) = &config.auth.issuer {
        identity = identity.with_issuer(issuer.clone());
    }
    if let Some(audience) = &config.auth.audience {
        identity = identity.with_audience(audience.clone());
    }

    // 3. CMS
    let articles = WordPressSource::new(
        config.cms.base_url.clone(),
        Duration::from_secs(config.cms.list_ttl_secs),
        Duration::from_secs(config.cms.detail_ttl_secs),
    )
    .context("failed to build the CMS client")?;

    // 4. Shared state (dynamic dispatch over the plugins)
    let address = config.bind_address();
    let state = AppState {
        community,
        identity: Arc::new(identity),
        articles: Arc::new(articles),
        config: Arc::new(config),
    };

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, "Basket Talk listening");

    axum::serve(listener, bt_api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}
