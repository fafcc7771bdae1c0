//! Server lifecycle — wires storage, the extraction client, and the
//! orchestrator together and serves the API.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::sqlite::open_database;
use crate::pipeline::batch::{BatchOrchestrator, PipelineContext};
use crate::pipeline::extract::HttpExtractionService;
use crate::pipeline::mapping::ReferenceCache;

use super::router::api_router;
use super::types::ApiContext;

/// Start the HTTP server and block until shutdown.
pub async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Open once at startup: runs migrations and loads the shared
    // read-only reference cache.
    let conn = open_database(&config.db_path)?;
    let refs = Arc::new(ReferenceCache::load(&conn)?);
    drop(conn);

    let service = Arc::new(HttpExtractionService::new(
        &config.extraction_url,
        config.pipeline.extraction_timeout,
    ));

    let orchestrator = BatchOrchestrator::new(PipelineContext {
        db_path: config.db_path.clone(),
        storage_dir: config.storage_dir.clone(),
        service,
        refs,
        config: config.pipeline.clone(),
    });

    let router = api_router(ApiContext::new(orchestrator));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = config.bind_addr, "Chartfill API listening");

    axum::serve(listener, router).await?;
    Ok(())
}
