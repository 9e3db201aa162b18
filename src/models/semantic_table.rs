// Semantic Table Model
//
// A semantic table is a named set of dimension and measure columns backed by
// its own compute engine. The proxy only ever sees it through this trait.

use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::error::DataFusionError;
use thiserror::Error;

/// Role a column plays within a semantic table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Usable for grouping
    Dimension,
    /// Pre-defined aggregate
    Measure,
}

/// Errors raised by a semantic table's compute backend
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] DataFusionError),

    #[error("'{column}' is not a dimension of semantic table '{table}'")]
    UnknownDimension { table: String, column: String },

    #[error("'{column}' is not a measure of semantic table '{table}'")]
    UnknownMeasure { table: String, column: String },

    #[error("Semantic table '{0}' was asked for neither dimensions nor measures")]
    EmptySelection(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result of executing a semantic query
#[derive(Debug, Clone)]
pub struct ResultBatch {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl ResultBatch {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }

    pub fn row_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.num_rows()).sum()
    }
}

/// Queryable shape and execution capability of one semantic table
///
/// Dimensions and measures are disjoint. A column in neither list cannot be
/// queried.
#[async_trait::async_trait]
pub trait SemanticTable: Send + Sync {
    /// Name of the semantic table
    fn name(&self) -> &str;

    /// Dimension column names
    fn dimensions(&self) -> &[String];

    /// Measure column names
    fn measures(&self) -> &[String];

    /// Classify a column name against this table
    fn classify(&self, column: &str) -> Option<ColumnRole> {
        if self.dimensions().iter().any(|d| d == column) {
            Some(ColumnRole::Dimension)
        } else if self.measures().iter().any(|m| m == column) {
            Some(ColumnRole::Measure)
        } else {
            None
        }
    }

    /// Group by the given dimensions and aggregate the given measures
    async fn execute(
        &self,
        group_by: &[String],
        measures: &[String],
    ) -> Result<ResultBatch, ExecutionError>;
}
