// Semantic Catalog
//
// Maps SQL table names to semantic tables. Populated before serving starts and
// shared read-mostly by every connection.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{SemanticTable, TableSummary};

/// Registry of semantic tables keyed by SQL table name
///
/// Registration takes the write lock, so tables may also be added while
/// connections are being served.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<HashMap<String, Arc<dyn SemanticTable>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a semantic table under a SQL table name
    ///
    /// Re-registering a name replaces the previous table.
    pub fn register(&self, name: impl Into<String>, table: Arc<dyn SemanticTable>) {
        let name = name.into();
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        if tables.insert(name.clone(), table).is_some() {
            tracing::debug!("Replaced semantic table '{}'", name);
        }
    }

    /// Look up a semantic table by SQL table name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn SemanticTable>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered table names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Summaries of all registered tables, sorted by name
    pub fn summaries(&self) -> Vec<TableSummary> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<TableSummary> = tables
            .iter()
            .map(|(name, table)| TableSummary::from_table(name, table.as_ref()))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{ExecutionError, ResultBatch};
    use datafusion::arrow::datatypes::Schema;

    /// Fixed-shape semantic table whose execution returns an empty batch
    pub struct StaticTable {
        name: String,
        dimensions: Vec<String>,
        measures: Vec<String>,
    }

    impl StaticTable {
        pub fn new(name: &str, dimensions: &[&str], measures: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
                measures: measures.iter().map(|m| m.to_string()).collect(),
            })
        }
    }

    #[async_trait::async_trait]
    impl SemanticTable for StaticTable {
        fn name(&self) -> &str {
            &self.name
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
            Ok(ResultBatch::new(Arc::new(Schema::empty()), vec![]))
        }
    }

    pub fn flights() -> Arc<StaticTable> {
        StaticTable::new(
            "flights",
            &["origin", "destination", "route"],
            &["total_passengers", "avg_delay", "total_distance", "flight_count"],
        )
    }

    pub fn sales() -> Arc<StaticTable> {
        StaticTable::new(
            "sales",
            &["product", "region"],
            &["total_sales", "total_units", "avg_price"],
        )
    }
}
