// Semantic Server
//
// Composition root: owns the catalog, binds the protocol listener and the
// optional admin router, and runs both until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::routes::create_router;
use crate::config::Config;
use crate::models::SemanticTable;
use crate::protocol::{self, ProtocolContext};
use crate::services::{Catalog, HandlerContext};

pub struct SemanticServer {
    config: Config,
    catalog: Arc<Catalog>,
}

impl SemanticServer {
    pub fn new(config: Config) -> Self {
        Self::with_catalog(config, Arc::new(Catalog::new()))
    }

    /// Serve an existing catalog, e.g. one shared with other components
    pub fn with_catalog(config: Config, catalog: Arc<Catalog>) -> Self {
        Self { config, catalog }
    }

    /// Register (or replace) a table; visible to connections immediately
    pub fn register_semantic_table(&self, name: impl Into<String>, table: Arc<dyn SemanticTable>) {
        let name = name.into();
        info!(table = %name, "Registering semantic table");
        self.catalog.register(name, table);
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn protocol_context(&self) -> ProtocolContext {
        ProtocolContext {
            handler: HandlerContext::new(self.catalog.clone(), self.config.credentials()),
            max_auth_attempts: self.config.auth.max_attempts,
        }
    }

    /// Bind all listeners and serve until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let address = self.config.server_address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind protocol listener on {}", address))?;

        info!(
            %address,
            tables = self.catalog.len(),
            "Semantic SQL proxy started"
        );

        if self.config.admin.enabled {
            let admin_address = self.config.admin_address();
            let admin_listener = TcpListener::bind(&admin_address)
                .await
                .with_context(|| format!("Failed to bind admin listener on {}", admin_address))?;
            let app = create_router(self.catalog.clone());

            info!(address = %admin_address, "Admin API listening");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, app).await {
                    error!(error = %e, "Admin API stopped");
                }
            });
        }

        let ctx = self.protocol_context();
        tokio::select! {
            _ = protocol::run(listener, ctx) => {}
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Shutdown signal received");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::test_support::flights;

    #[test]
    fn test_registration_is_shared_with_catalog() {
        let config = Config::load(None).unwrap();
        let catalog = Arc::new(Catalog::new());
        let server = SemanticServer::with_catalog(config, catalog.clone());

        server.register_semantic_table("flights", flights());

        assert!(catalog.lookup("flights").is_some());
        assert_eq!(server.catalog().names(), vec!["flights".to_string()]);
    }

    #[test]
    fn test_protocol_context_uses_config() {
        let mut config = Config::load(None).unwrap();
        config.auth.max_attempts = 7;
        config.auth.username = "analyst".to_string();
        config.auth.password = "pw".to_string();

        let server = SemanticServer::new(config);
        let ctx = server.protocol_context();

        assert_eq!(ctx.max_auth_attempts, 7);
        assert!(ctx.handler.credentials.verify("analyst", "pw"));
        assert!(!ctx.handler.credentials.verify("postgres", "postgres"));
    }
}
