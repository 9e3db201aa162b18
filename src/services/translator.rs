// Semantic Query Translator
//
// Maps a single-table SELECT onto a semantic table's group-by/aggregate call.
// Columns are bound by name only: a selected name must already be a dimension
// or a measure of the target table, so no aggregate grammar is interpreted here.

use std::sync::Arc;

use thiserror::Error;

use super::catalog::Catalog;
use crate::models::{ColumnRole, TranslatedQuery};
use crate::validation::{SqlParserStatementParser, StatementParser};

/// Errors raised while translating SQL text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    #[error("No table specified in query")]
    NoTableSpecified,

    #[error("Table '{0}' not found in semantic catalog")]
    TableNotFound(String),

    #[error("Column '{column}' not found in semantic table '{table}'")]
    ColumnNotFound { table: String, column: String },

    #[error("SQL parsing error: {0}")]
    Parse(String),

    #[error("Unsupported SQL: {0}")]
    Unsupported(String),
}

/// Translates SQL text into [`TranslatedQuery`] values
///
/// # Example
/// ```rust,ignore
/// let translator = QueryTranslator::new();
/// let query = translator.translate("SELECT origin, total_passengers FROM flights", &catalog)?;
/// assert_eq!(query.group_by, vec!["origin"]);
/// ```
#[derive(Clone)]
pub struct QueryTranslator {
    parser: Arc<dyn StatementParser>,
}

impl QueryTranslator {
    /// Create a translator backed by the default `sqlparser` parser
    pub fn new() -> Self {
        Self::with_parser(Arc::new(SqlParserStatementParser::new()))
    }

    /// Create a translator with a custom statement parser
    pub fn with_parser(parser: Arc<dyn StatementParser>) -> Self {
        Self { parser }
    }

    /// Translate SQL text against the catalog
    ///
    /// Translation is all-or-nothing: the first column that is neither a
    /// dimension nor a measure aborts the statement.
    pub fn translate(&self, sql: &str, catalog: &Catalog) -> Result<TranslatedQuery, TranslationError> {
        let statement = self.parser.parse(sql)?;

        let table_name = statement.table.ok_or(TranslationError::NoTableSpecified)?;

        let table = catalog
            .lookup(&table_name)
            .ok_or_else(|| TranslationError::TableNotFound(table_name.clone()))?;

        let mut selected_dimensions = Vec::new();
        let mut selected_measures = Vec::new();

        for column in &statement.columns {
            let name = column.effective_name();
            match table.classify(name) {
                Some(ColumnRole::Dimension) => selected_dimensions.push(name.to_string()),
                Some(ColumnRole::Measure) => selected_measures.push(name.to_string()),
                None => {
                    return Err(TranslationError::ColumnNotFound {
                        table: table_name,
                        column: name.to_string(),
                    })
                }
            }
        }

        // Explicit GROUP BY wins; otherwise group by the selected dimensions
        let group_by = match statement.group_by {
            Some(explicit) => explicit,
            None => selected_dimensions.clone(),
        };

        tracing::debug!(
            "Translated query on '{}': dimensions={:?}, measures={:?}, group_by={:?}",
            table_name,
            selected_dimensions,
            selected_measures,
            group_by
        );

        Ok(TranslatedQuery {
            table_name,
            table,
            selected_dimensions,
            selected_measures,
            group_by,
        })
    }
}

impl Default for QueryTranslator {
    fn default() -> Self {
        Self::new()
    }
}
