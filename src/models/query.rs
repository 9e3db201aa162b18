use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::semantic_table::{ResultBatch, SemanticTable};
use super::wire_types::ColumnDescription;

/// One entry of a SELECT list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectColumn {
    /// Identifier or rendered expression
    pub expr: String,
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn named(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: None,
        }
    }

    pub fn aliased(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: Some(alias.into()),
        }
    }

    /// Name used to classify this column: the alias wins over the expression
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.expr)
    }
}

/// Parser-independent view of a single-table SELECT statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedStatement {
    /// Primary table reference, if any
    pub table: Option<String>,
    pub columns: Vec<SelectColumn>,
    /// Explicit GROUP BY identifiers, `None` when the clause is absent
    pub group_by: Option<Vec<String>>,
}

/// A SELECT statement validated and mapped onto a semantic table
#[derive(Clone)]
pub struct TranslatedQuery {
    pub table_name: String,
    pub table: Arc<dyn SemanticTable>,
    pub selected_dimensions: Vec<String>,
    pub selected_measures: Vec<String>,
    pub group_by: Vec<String>,
}

impl fmt::Debug for TranslatedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslatedQuery")
            .field("table", &self.table_name)
            .field("selected_dimensions", &self.selected_dimensions)
            .field("selected_measures", &self.selected_measures)
            .field("group_by", &self.group_by)
            .finish()
    }
}

/// Successful answer to a query: wire column descriptions plus the data
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub columns: Vec<ColumnDescription>,
    pub batch: ResultBatch,
}

impl QueryResponse {
    pub fn row_count(&self) -> usize {
        self.batch.row_count()
    }
}

/// Catalog entry as exposed over the admin API
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub dimensions: Vec<String>,
    pub measures: Vec<String>,
}

impl TableSummary {
    pub fn from_table(name: &str, table: &dyn SemanticTable) -> Self {
        Self {
            name: name.to_string(),
            dimensions: table.dimensions().to_vec(),
            measures: table.measures().to_vec(),
        }
    }
}
