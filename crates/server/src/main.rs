mod bootstrap;
mod health;
mod pdf;
mod routes;

use std::sync::Arc;

use anyhow::Result;
use fakturo_agent::{OpenAiChatClient, ToolDispatcher};
use fakturo_core::catalog::SchemaCatalog;
use fakturo_core::config::{AppConfig, LoadOptions};
use fakturo_db::{SqlInvoiceStore, SqlQueryExecutor};

fn init_logging(config: &AppConfig) {
    use fakturo_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let llm = OpenAiChatClient::from_config(&app.config.llm)?;
    let dispatcher = ToolDispatcher::new(
        Arc::new(SqlInvoiceStore::new(app.db_pool.clone())),
        Arc::new(SqlQueryExecutor::new(app.db_pool.clone(), SchemaCatalog::default())),
    );
    let state = routes::AppState {
        llm: Arc::new(llm),
        dispatcher,
        upload_dir: app.config.ingest.upload_dir.clone(),
    };
    let router =
        routes::router(state, app.db_pool.clone(), app.config.ingest.max_upload_bytes);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        model = %app.config.llm.model,
        "fakturo-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "fakturo-server stopping");
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
