use std::sync::Arc;

use anyhow::Context;
use hv_ledger::builder::{BuilderConfig, TxnBuilder};
use hv_ledger::node::NodeClient;
use hv_ledger::LedgerClient;
use hv_service::cleanup::spawn_cleanup;
use hv_service::config::{NodeSource, ServiceConfig};
use hv_service::db::Db;
use hv_service::memstore::SessionStore;
use hv_service::{api, logging, Service};
use hv_vault::NullifierVault;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid configuration")?;
    logging::init(&config.log_level, config.log_json)?;

    tracing::info!(
        app_id = config.pool.app_id,
        listen = %config.listen_addr,
        db = %config.db_path.display(),
        "hv-server starting"
    );

    let client: Arc<dyn LedgerClient> = match &config.node {
        NodeSource::Url { url, token } => Arc::new(NodeClient::new(url, token)),
        NodeSource::Dir(dir) => Arc::new(
            NodeClient::from_dir(dir)
                .with_context(|| format!("reading node dir {}", dir.display()))?,
        ),
    };

    let vault = NullifierVault::from_file(&config.vault_public_key_path).with_context(|| {
        format!(
            "loading vault public key {}",
            config.vault_public_key_path.display()
        )
    })?;
    let db = Arc::new(Db::open(&config.db_path, Arc::new(vault)).context("opening database")?);
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    let builder = TxnBuilder::new(config.pool_contract()?, BuilderConfig::default());

    let config = Arc::new(config);
    let service = Arc::new(Service::new(
        client,
        db.clone(),
        sessions.clone(),
        config.clone(),
        builder,
    ));

    let cancel = CancellationToken::new();
    let cleanup = spawn_cleanup(
        db,
        sessions,
        config.cleanup_interval,
        config.session_sweep_interval,
        config.unconfirmed_retention,
        cancel.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutting down");
    cancel.cancel();
    if tokio::time::timeout(config.shutdown_grace, cleanup).await.is_err() {
        tracing::warn!(grace = ?config.shutdown_grace, "cleanup task did not stop in time");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
