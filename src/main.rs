use tracing::{error, info};

use semantic_sql_proxy::config::Config;
use semantic_sql_proxy::services::datafusion::{sample, DataFusionSessionManager, SessionConfig};
use semantic_sql_proxy::SemanticServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    let server = SemanticServer::new(config.clone());

    if config.demo.enabled {
        let sessions =
            DataFusionSessionManager::new(SessionConfig::default().with_batch_size(config.engine.batch_size));
        let ctx = sessions.create_session();

        for (name, table) in sample::flights_and_sales(&ctx).map_err(|e| {
            error!("Failed to build sample tables: {}", e);
            e
        })? {
            server.register_semantic_table(name, table);
        }
    }

    info!("Starting semantic SQL proxy on {}", config.server_address());

    server.serve().await
}
