use anyhow::{Context, Result};
use rollcall_core::{Mirror, NullMirror, ReconciliationService};
use rollcall_store::SqliteStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod http_interface;
mod sweep;
mod sync;

use config::Config;
use sync::{MirrorClient, SyncForwarder};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        bind = %config.bind,
        mirror = config.mirror_url.as_deref().unwrap_or("none"),
        "rollcalld starting"
    );

    // Fail fast if the store cannot be opened.
    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("opening {}", config.db_path.display()))?,
    );

    let forwarder = match &config.mirror_url {
        Some(url) => {
            let client = MirrorClient::new(url, config.sync_timeout)?;
            Some(Arc::new(SyncForwarder::spawn(client, config.sync_queue_capacity)))
        }
        None => {
            tracing::warn!("ROLLCALL_MIRROR_URL not set; records stay local");
            None
        }
    };

    let mirror: Arc<dyn Mirror> = match &forwarder {
        Some(f) => f.clone() as Arc<dyn Mirror>,
        None => Arc::new(NullMirror),
    };
    let service = Arc::new(ReconciliationService::new(store.clone(), mirror));

    let sweep = match &forwarder {
        Some(f) if config.catchup_enabled => Some(sweep::spawn_daily(
            store.clone(),
            f.client().clone(),
            config.purge_after_sync,
        )),
        _ => None,
    };

    let app = http_interface::router(http_interface::AppState::new(service, forwarder.is_some()));
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "rollcalld ready");

    // In-flight requests finish before serve returns, so local writes complete.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("rollcalld shutting down");

    if let Some(handle) = sweep {
        handle.abort();
    }
    if let Some(f) = forwarder {
        f.shutdown(config.shutdown_grace).await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
