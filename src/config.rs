use serde::Deserialize;
use std::env;

use crate::models::Credentials;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    /// Failed startup attempts before the protocol engine drops the client
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DemoConfig {
    /// Register the sample flights/sales tables at startup
    pub enabled: bool,
}

impl Config {
    /// Load configuration from defaults, the optional file named by
    /// `SEMANTIC_PROXY_CONFIG`, and environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let file = env::var("SEMANTIC_PROXY_CONFIG").ok();
        Self::load(file.as_deref())
    }

    /// Load configuration with an explicit config file path
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("server.host", "localhost")?
            .set_default("server.port", 5432)?
            .set_default("auth.username", "postgres")?
            .set_default("auth.password", "postgres")?
            .set_default("auth.max_attempts", 3)?
            .set_default("admin.enabled", true)?
            .set_default("admin.host", "127.0.0.1")?
            .set_default("admin.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("engine.batch_size", 8192)?
            .set_default("demo.enabled", true)?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // Load from environment variables
        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(5432))?;
        }

        if let Ok(user) = env::var("PROXY_USER") {
            builder = builder.set_override("auth.username", user)?;
        }

        if let Ok(password) = env::var("PROXY_PASSWORD") {
            builder = builder.set_override("auth.password", password)?;
        }

        if let Ok(port) = env::var("ADMIN_PORT") {
            builder = builder.set_override("admin.port", port.parse::<u16>().unwrap_or(8080))?;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            builder = builder.set_override("logging.level", log_level)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn admin_address(&self) -> String {
        format!("{}:{}", self.admin.host, self.admin.port)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.auth.username.clone(), self.auth.password.clone())
    }
}
