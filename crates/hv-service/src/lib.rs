//! HermesVault pool service.
//!
//! Prepares and confirms deposits and withdrawals against the pool
//! application, keeps the sealed note ledger in sqlite, and serves the
//! flows over a small JSON API.
//!
//! ```no_run
//! # async fn run(service: std::sync::Arc<hv_service::flows::Service>) -> anyhow::Result<()> {
//! let app = hv_service::api::router(service);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:5555").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod error;
pub mod flows;
pub mod logging;
pub mod memstore;
pub mod tree;

pub use config::ServiceConfig;
pub use error::ServiceError;
pub use flows::Service;
