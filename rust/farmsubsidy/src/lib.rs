pub mod aggregations;
pub mod auth;
pub mod cache;
pub mod config;
pub mod dialect;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fields;
pub mod import;
pub mod lookup;
pub mod models;
pub mod output;
pub mod pagination;
pub mod params;
pub mod query;
pub mod schema;
pub mod search;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod views;
pub mod window;

use crate::{config::AppConfig, server::Server};

/// Connects to the configured backend and serves the API until shutdown.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    Server::new(config).await?.run().await
}
