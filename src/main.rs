//! nemflow - NEM market data ingestion and fan-out service.
//!
//! One process hosts both runtimes: the scheduled ingestion loop (5-minute
//! ticks against the public reporting site) and the serving runtime (read
//! API, admin surface, WebSocket hub).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nemflow_backend::{
    api::{build_router, AppState},
    auth::AuthClient,
    cache::{coalesce, TieredCache},
    config::Config,
    hub::LiveHub,
    ingest::orchestrator::{self, Orchestrator},
    storage::{ArchiveStore, KvStore, Store},
    trading::TradingLedger,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("load configuration")?;
    info!(
        base_url = %config.report_base_url,
        db = %config.database_path,
        "nemflow starting"
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.fetch_timeout_secs))
        .pool_max_idle_per_host(10)
        .build()
        .context("build HTTP client")?;

    // Tiered stores.
    let store = Store::new(&config.database_path).context("open relational store")?;
    let archive = Arc::new(
        ArchiveStore::new_local(&config.archive_root).context("open raw archive")?,
    );
    let kv = Arc::new(KvStore::new());
    let cache = Arc::new(TieredCache::new(kv.clone()));
    info!(db = %config.database_path, archive = %config.archive_root, "storage ready");

    // Hub restores its last-known prices before anything can broadcast.
    let hub = LiveHub::spawn(store.clone()).await.context("spawn hub")?;

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        http_client.clone(),
        store.clone(),
        archive,
        kv.clone(),
        hub.clone(),
    ));

    if config.scheduler_enabled {
        orchestrator::spawn_scheduler(orchestrator.clone());
    } else {
        info!("scheduler disabled; only /trigger runs ticks");
    }

    // Periodic KV sweep keeps expired snapshots from accumulating.
    {
        let kv = kv.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            loop {
                ticker.tick().await;
                kv.sweep();
            }
        });
    }

    let auth = Arc::new(AuthClient::new(
        http_client.clone(),
        config.auth_service_url.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        kv,
        cache,
        coalescer: coalesce::global().clone(),
        ledger: TradingLedger::new(store),
        hub,
        orchestrator,
    };

    let app = build_router(state, auth);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nemflow_backend=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
