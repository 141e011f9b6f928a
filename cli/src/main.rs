//! fundindex — runs the campaign, funds-claim and token indexers against a
//! JSON-RPC provider and serves their results over HTTP.
//!
//! Configuration is read from the environment; see [`config::ServiceConfig`].
//!
//! ```bash
//! PROVIDER_URL=https://rpc.example.org \
//! PLATFORM_ADDRESS=0x5fbdb2315678afecb367f032d93f642f64180aa3 \
//! fundindex
//! ```

mod config;
mod http;
mod logging;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use fundindex_core::{CheckpointStore, IndexerInstance, LogSource, Scheduler};
use fundindex_evm::{CampaignPipeline, FundsPipeline, HttpLogSource, QueryFacade, TokenPipeline};
use fundindex_storage::JsonFileStore;

use config::{ServiceConfig, StateBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    logging::init_tracing(&config.log);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = %config.platform_address,
        chunk_size = config.chunk_size,
        start_block = ?config.start_block,
        lookback = config.lookback_blocks,
        "fundindex starting"
    );

    let source: Arc<dyn LogSource> =
        Arc::new(HttpLogSource::new(config.provider_url.clone(), config.request_timeout())?);
    let store = open_store(&config).await?;
    let settings = config.indexer_settings();

    let campaigns = Arc::new(IndexerInstance::new(
        CampaignPipeline::new(&config.platform_address),
        settings.clone(),
        source.clone(),
        store.clone(),
    ));
    let funds = Arc::new(IndexerInstance::new(
        FundsPipeline::new(campaigns.clone())
            .with_batch_size(config.address_batch_size)
            .with_batch_delay(config.batch_delay()),
        settings.clone(),
        source.clone(),
        store.clone(),
    ));
    let tokens = Arc::new(IndexerInstance::new(
        TokenPipeline::new(&config.platform_address),
        settings,
        source,
        store,
    ));

    // The funds indexer scans only the campaigns known when its windows run,
    // so discover campaigns once before it starts.
    if let Err(e) = campaigns.run().await {
        warn!(error = %e, "initial campaign scan failed, continuing");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let period = config.poll_interval();
    let schedulers = vec![
        Scheduler::spawn(campaigns.clone(), period, shutdown_rx.clone()),
        Scheduler::spawn(funds.clone(), period, shutdown_rx.clone()),
        Scheduler::spawn(tokens.clone(), period, shutdown_rx.clone()),
    ];

    let listener = TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("binding {}", config.http_addr))?;
    let facade = QueryFacade::new(campaigns, funds, tokens);
    let server = tokio::spawn(http::serve(listener, facade, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, waiting for in-flight runs");
    let _ = shutdown_tx.send(true);

    for handle in schedulers {
        handle.await?;
    }
    server.await??;
    info!("fundindex stopped");
    Ok(())
}

async fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    match config.state_backend {
        StateBackend::JsonFile => {
            info!(path = %config.state_file.display(), "checkpoints in JSON file");
            Ok(Arc::new(JsonFileStore::new(&config.state_file)))
        }
        StateBackend::Sqlite => open_sqlite(&config.state_file).await,
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(path: &Path) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    info!(path = %path.display(), "checkpoints in SQLite");
    let store = fundindex_storage::SqliteStore::open(&path.to_string_lossy()).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_path: &Path) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    anyhow::bail!("STATE_BACKEND=sqlite needs a build with the `sqlite` feature")
}
