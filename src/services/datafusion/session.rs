// DataFusion SessionManager
//
// Creates the SessionContext instances semantic tables execute against.

use datafusion::prelude::{SessionConfig as DataFusionConfig, SessionContext};

/// Configuration for DataFusion sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Batch size for query execution
    pub batch_size: usize,
    /// Number of partitions for parallel execution
    pub target_partitions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            batch_size: 8192,
            target_partitions: num_cpus::get(),
        }
    }
}

impl SessionConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Manages DataFusion SessionContext creation
///
/// # Example
/// ```rust,ignore
/// let manager = DataFusionSessionManager::new(SessionConfig::default());
/// let ctx = manager.create_session();
/// ctx.register_batch("flights_data", batch)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DataFusionSessionManager {
    config: SessionConfig,
}

impl DataFusionSessionManager {
    /// Create a new SessionManager with the given configuration
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Create a new DataFusion SessionContext
    pub fn create_session(&self) -> SessionContext {
        let config = DataFusionConfig::new()
            .with_batch_size(self.config.batch_size)
            .with_target_partitions(self.config.target_partitions.max(1));

        SessionContext::new_with_config(config)
    }

    /// Get the current configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
