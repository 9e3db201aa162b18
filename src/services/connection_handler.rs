// Connection Handler
//
// Per-connection lifecycle: authenticate, then serve queries one at a time
// until the client disconnects. The wire-protocol engine drives it through the
// four `on_*` entry points.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use super::catalog::Catalog;
use super::translator::{QueryTranslator, TranslationError};
use crate::models::{
    describe_schema, ConnectionState, Credentials, ExecutionError, QueryResponse,
    UnmappedTypeError,
};

/// Errors delivered through the query channel
///
/// None of these close the connection.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error("Query execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    UnmappedType(#[from] UnmappedTypeError),

    #[error("Connection is not authenticated")]
    NotAuthenticated,

    #[error("Another query is already executing on this connection")]
    Busy,

    #[error("Connection is closed")]
    ConnectionClosed,
}

impl QueryError {
    /// Stable error code reported to clients
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Translation(TranslationError::NoTableSpecified) => "NO_TABLE_SPECIFIED",
            QueryError::Translation(TranslationError::TableNotFound(_)) => "TABLE_NOT_FOUND",
            QueryError::Translation(TranslationError::ColumnNotFound { .. }) => "COLUMN_NOT_FOUND",
            QueryError::Translation(TranslationError::Parse(_)) => "SQL_SYNTAX_ERROR",
            QueryError::Translation(TranslationError::Unsupported(_)) => "UNSUPPORTED_SQL",
            QueryError::Execution(_) => "QUERY_EXECUTION_ERROR",
            QueryError::UnmappedType(_) => "UNMAPPED_TYPE",
            QueryError::NotAuthenticated => "NOT_AUTHENTICATED",
            QueryError::Busy => "QUERY_IN_PROGRESS",
            QueryError::ConnectionClosed => "CONNECTION_CLOSED",
        }
    }
}

/// State shared by every connection of one server
#[derive(Clone)]
pub struct HandlerContext {
    pub catalog: Arc<Catalog>,
    pub translator: Arc<QueryTranslator>,
    pub credentials: Arc<Credentials>,
}

impl HandlerContext {
    pub fn new(catalog: Arc<Catalog>, credentials: Credentials) -> Self {
        Self {
            catalog,
            translator: Arc::new(QueryTranslator::new()),
            credentials: Arc::new(credentials),
        }
    }
}

/// State machine for one client connection
///
/// Methods take `&self` so that a disconnect notification can be delivered
/// while a query is executing; the in-flight query then resolves to
/// [`QueryError::ConnectionClosed`] and its result is dropped.
pub struct ConnectionHandler {
    id: Uuid,
    ctx: HandlerContext,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        let (state, _) = watch::channel(ConnectionState::Unauthenticated);
        Self {
            id: Uuid::new_v4(),
            ctx,
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Decide whether to accept a new client; every client is accepted
    pub fn on_connect(&self, client: SocketAddr) -> bool {
        if self.state().is_terminated() {
            return false;
        }
        tracing::info!(connection_id = %self.id, peer_addr = %client, "Client connected");
        true
    }

    /// Check credentials; success moves the connection to `Idle`
    pub fn on_authenticate(
        &self,
        user: &str,
        password: &str,
        host: &str,
        database: Option<&str>,
    ) -> bool {
        if self.state() != ConnectionState::Unauthenticated {
            tracing::warn!(
                connection_id = %self.id,
                state = self.state().as_str(),
                "Authentication attempted outside of startup"
            );
            return false;
        }

        if !self.ctx.credentials.verify(user, password) {
            tracing::warn!(connection_id = %self.id, user, host, "Authentication failed");
            return false;
        }

        // Only leave Unauthenticated if no disconnect raced with us
        let authenticated = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Unauthenticated {
                *state = ConnectionState::Idle;
                true
            } else {
                false
            }
        });

        if authenticated {
            tracing::info!(
                connection_id = %self.id,
                user,
                host,
                database = database.unwrap_or(""),
                "Client authenticated"
            );
        }
        authenticated
    }

    /// Translate and execute one query
    ///
    /// Failures are returned to the caller and logged; the connection goes
    /// back to `Idle` either way.
    pub async fn on_query(&self, sql: &str) -> Result<QueryResponse, QueryError> {
        self.begin_query()?;

        tracing::info!(connection_id = %self.id, "Handling query: {}", sql);

        let outcome = tokio::select! {
            outcome = self.run_query(sql) => outcome,
            _ = self.terminated() => {
                tracing::info!(connection_id = %self.id, "Query abandoned, client disconnected");
                return Err(QueryError::ConnectionClosed);
            }
        };

        let back_to_idle = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Executing {
                *state = ConnectionState::Idle;
                true
            } else {
                false
            }
        });
        if !back_to_idle {
            return Err(QueryError::ConnectionClosed);
        }

        match &outcome {
            Ok(response) => tracing::info!(
                connection_id = %self.id,
                "Query executed successfully, returning {} rows",
                response.row_count()
            ),
            Err(e) => tracing::warn!(connection_id = %self.id, "Error handling query: {}", e),
        }

        outcome
    }

    /// Enter `Terminated`; no further transitions happen
    pub fn on_disconnect(&self, client: SocketAddr) -> bool {
        let previous = self.state.send_replace(ConnectionState::Terminated);
        if !previous.is_terminated() {
            tracing::info!(
                connection_id = %self.id,
                peer_addr = %client,
                state = previous.as_str(),
                "Client disconnected"
            );
        }
        true
    }

    fn begin_query(&self) -> Result<(), QueryError> {
        let mut rejection = None;
        self.state.send_if_modified(|state| match *state {
            ConnectionState::Idle => {
                *state = ConnectionState::Executing;
                true
            }
            ConnectionState::Unauthenticated => {
                rejection = Some(QueryError::NotAuthenticated);
                false
            }
            ConnectionState::Executing => {
                rejection = Some(QueryError::Busy);
                false
            }
            ConnectionState::Terminated => {
                rejection = Some(QueryError::ConnectionClosed);
                false
            }
        });

        match rejection {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_query(&self, sql: &str) -> Result<QueryResponse, QueryError> {
        let query = self.ctx.translator.translate(sql, &self.ctx.catalog)?;

        tracing::info!(
            connection_id = %self.id,
            "Executing semantic query for table '{}'",
            query.table_name
        );
        tracing::info!(
            connection_id = %self.id,
            "Dimensions: {:?}, Measures: {:?}",
            query.group_by,
            query.selected_measures
        );
        tracing::debug!(connection_id = %self.id, "Semantic query: {:?}", query);

        let batch = query
            .table
            .execute(&query.group_by, &query.selected_measures)
            .await?;

        let columns = describe_schema(&batch.schema)?;

        Ok(QueryResponse { columns, batch })
    }

    async fn terminated(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns on Terminated
        let _ = rx.wait_for(|state| state.is_terminated()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionError, ResultBatch, SemanticTable};
    use crate::services::catalog::test_support::{flights, sales};
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn handler_with(catalog: Catalog) -> ConnectionHandler {
        ConnectionHandler::new(HandlerContext::new(
            Arc::new(catalog),
            Credentials::new("user", "secret"),
        ))
    }

    fn handler() -> ConnectionHandler {
        let catalog = Catalog::new();
        catalog.register("flights", flights());
        catalog.register("sales", sales());
        handler_with(catalog)
    }

    fn authenticated() -> ConnectionHandler {
        let handler = handler();
        assert!(handler.on_connect(peer()));
        assert!(handler.on_authenticate("user", "secret", "127.0.0.1", Some("db")));
        handler
    }

    /// Blocks in `execute` until released
    struct SlowTable {
        started: Arc<Notify>,
        release: Arc<Notify>,
        dimensions: Vec<String>,
        measures: Vec<String>,
    }

    #[async_trait::async_trait]
    impl SemanticTable for SlowTable {
        fn name(&self) -> &str {
            "slow"
        }

        fn dimensions(&self) -> &[String] {
            &self.dimensions
        }

        fn measures(&self) -> &[String] {
            &self.measures
        }

        async fn execute(
            &self,
            _group_by: &[String],
            _measures: &[String],
        ) -> Result<ResultBatch, ExecutionError> {
            self.started.notify_one();
            self.release.notified().await;
            let schema = Arc::new(Schema::new(vec![Field::new("m", DataType::Int64, true)]));
            Ok(ResultBatch::new(schema, vec![]))
        }
    }

    /// Execution always fails or produces unmappable columns
    struct BrokenTable {
        unmapped: bool,
        measures: Vec<String>,
    }

    #[async_trait::async_trait]
    impl SemanticTable for BrokenTable {
        fn name(&self) -> &str {
            "broken"
        }

        fn dimensions(&self) -> &[String] {
            &[]
        }

        fn measures(&self) -> &[String] {
            &self.measures
        }

        async fn execute(
            &self,
            _group_by: &[String],
            _measures: &[String],
        ) -> Result<ResultBatch, ExecutionError> {
            if self.unmapped {
                let schema = Arc::new(Schema::new(vec![Field::new("m", DataType::Binary, true)]));
                Ok(ResultBatch::new(schema, vec![]))
            } else {
                Err(ExecutionError::Backend("backend unavailable".to_string()))
            }
        }
    }

    #[test]
    fn test_authentication() {
        let handler = handler();
        assert_eq!(handler.state(), ConnectionState::Unauthenticated);
        assert!(handler.on_connect(peer()));

        assert!(!handler.on_authenticate("user", "wrong", "127.0.0.1", None));
        assert_eq!(handler.state(), ConnectionState::Unauthenticated);

        assert!(handler.on_authenticate("user", "secret", "127.0.0.1", None));
        assert_eq!(handler.state(), ConnectionState::Idle);

        // A second startup on an authenticated connection is refused
        assert!(!handler.on_authenticate("user", "secret", "127.0.0.1", None));
        assert_eq!(handler.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_query_before_authentication() {
        let handler = handler();
        let err = handler.on_query("SELECT origin FROM flights").await.unwrap_err();
        assert!(matches!(err, QueryError::NotAuthenticated));
        assert_eq!(handler.state(), ConnectionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_successful_query() {
        let handler = authenticated();
        let response = handler
            .on_query("SELECT origin, total_passengers FROM flights")
            .await
            .unwrap();
        assert_eq!(response.row_count(), 0);
        assert_eq!(handler.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_failed_query_keeps_connection_open() {
        let handler = authenticated();

        let err = handler.on_query("SELECT passengers FROM flights").await.unwrap_err();
        assert!(matches!(
            err,
            QueryError::Translation(TranslationError::ColumnNotFound { .. })
        ));
        assert_eq!(err.code(), "COLUMN_NOT_FOUND");
        assert_eq!(handler.state(), ConnectionState::Idle);

        let err = handler.on_query("SELECT origin FROM trains").await.unwrap_err();
        assert_eq!(err.code(), "TABLE_NOT_FOUND");

        assert!(handler
            .on_query("SELECT region, total_units FROM sales GROUP BY region")
            .await
            .is_ok());
        assert_eq!(handler.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_execution_and_type_errors_keep_connection_open() {
        let catalog = Catalog::new();
        catalog.register(
            "broken",
            Arc::new(BrokenTable {
                unmapped: false,
                measures: vec!["m".to_string()],
            }),
        );
        catalog.register(
            "opaque",
            Arc::new(BrokenTable {
                unmapped: true,
                measures: vec!["m".to_string()],
            }),
        );
        let handler = handler_with(catalog);
        assert!(handler.on_authenticate("user", "secret", "127.0.0.1", None));

        let err = handler.on_query("SELECT m FROM broken").await.unwrap_err();
        assert!(matches!(err, QueryError::Execution(ExecutionError::Backend(_))));
        assert_eq!(handler.state(), ConnectionState::Idle);

        let err = handler.on_query("SELECT m FROM opaque").await.unwrap_err();
        assert!(matches!(err, QueryError::UnmappedType(_)));
        assert_eq!(err.code(), "UNMAPPED_TYPE");
        assert_eq!(handler.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_disconnect_while_executing() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let catalog = Catalog::new();
        catalog.register(
            "slow",
            Arc::new(SlowTable {
                started: started.clone(),
                release: release.clone(),
                dimensions: vec![],
                measures: vec!["m".to_string()],
            }),
        );

        let handler = Arc::new(handler_with(catalog));
        assert!(handler.on_authenticate("user", "secret", "127.0.0.1", None));

        let query = {
            let handler = handler.clone();
            tokio::spawn(async move { handler.on_query("SELECT m FROM slow").await })
        };

        started.notified().await;
        assert_eq!(handler.state(), ConnectionState::Executing);

        // A second query on the same connection is refused while one is in flight
        let err = handler.on_query("SELECT m FROM slow").await.unwrap_err();
        assert!(matches!(err, QueryError::Busy));

        assert!(handler.on_disconnect(peer()));
        let result = tokio::time::timeout(Duration::from_secs(5), query)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(QueryError::ConnectionClosed)));
        assert_eq!(handler.state(), ConnectionState::Terminated);

        release.notify_one();
        let err = handler.on_query("SELECT m FROM slow").await.unwrap_err();
        assert!(matches!(err, QueryError::ConnectionClosed));
        assert!(!handler.on_connect(peer()));
        assert!(!handler.on_authenticate("user", "secret", "127.0.0.1", None));
    }

    #[test]
    fn test_disconnect_from_any_state() {
        let handler = handler();
        assert!(handler.on_disconnect(peer()));
        assert_eq!(handler.state(), ConnectionState::Terminated);
        assert!(handler.on_disconnect(peer()));
        assert_eq!(handler.state(), ConnectionState::Terminated);
    }
}
