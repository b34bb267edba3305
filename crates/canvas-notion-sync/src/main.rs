mod classify;
mod config;
mod error;
mod model;
mod reader;
mod run_guard;
mod server;
mod summary;
mod sync;
#[cfg(test)]
mod test_support;
mod writer;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use sync_common::canvas::{CanvasClient, CanvasClientConfig};
use sync_common::notion::{NotionClient, NotionClientConfig};

use config::Config;
use reader::CourseReader;
use server::AppState;
use sync::SyncEngine;
use writer::NotionWriter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting canvas-notion-sync");

    // 1. Load config from environment
    let config = Config::from_env()?;
    info!(
        canvas = %config.canvas_base_url,
        database = %config.sync.notion_database_id,
        only_dated = config.sync.only_dated,
        notion_rps = config.notion_rps,
        max_retries = config.retry.max_retries,
        "configuration loaded"
    );

    // 2. Build the Canvas and Notion clients (shared retry policy, Notion pacing)
    let canvas = CanvasClient::new(
        CanvasClientConfig {
            base_url: config.canvas_base_url.clone(),
            token: config.canvas_token.clone(),
        },
        config.retry.clone(),
    )?;
    let notion = NotionClient::new(
        NotionClientConfig {
            token: config.notion_token.clone(),
            version: config.notion_version.clone(),
            requests_per_second: config.notion_rps,
        },
        config.retry.clone(),
    )?;

    // 3. Wire the sync engine and the HTTP router
    let engine = SyncEngine::new(
        CourseReader::new(Arc::new(canvas)),
        NotionWriter::new(Arc::new(notion), config.sync.clone()),
        config.sync.only_dated,
    );
    let app = server::router(AppState::new(engine, &config.sync_secret));

    // 4. Serve until ctrl-c
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;
    info!("server shut down");
    Ok(())
}
