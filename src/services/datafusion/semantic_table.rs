// DataFusion Semantic Table
//
// A semantic table whose dimensions and measures are DataFusion expressions
// over a source table registered in a SessionContext. Executing it runs a
// single group-by/aggregate over the source.

use std::collections::HashMap;

use datafusion::logical_expr::Expr;
use datafusion::prelude::SessionContext;
use thiserror::Error;

use crate::models::{ExecutionError, ResultBatch, SemanticTable};

/// Errors raised while defining a semantic table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticTableError {
    #[error("Column '{column}' is defined more than once in semantic table '{table}'")]
    DuplicateColumn { table: String, column: String },
}

/// Builder for [`DataFusionSemanticTable`]
///
/// # Example
/// ```rust,ignore
/// let flights = SemanticTableBuilder::new("flights", ctx, "flights_data")
///     .with_dimension("origin", col("origin"))
///     .with_measure("total_passengers", sum(col("passengers")))
///     .build()?;
/// ```
pub struct SemanticTableBuilder {
    name: String,
    ctx: SessionContext,
    source: String,
    dimensions: Vec<(String, Expr)>,
    measures: Vec<(String, Expr)>,
}

impl SemanticTableBuilder {
    /// Start a semantic table over `source`, a table registered in `ctx`
    pub fn new(name: impl Into<String>, ctx: SessionContext, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ctx,
            source: source.into(),
            dimensions: Vec::new(),
            measures: Vec::new(),
        }
    }

    /// Add a grouping column computed by `expr`
    pub fn with_dimension(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.dimensions.push((name.into(), expr));
        self
    }

    /// Add an aggregate column; `expr` must be an aggregate expression
    pub fn with_measure(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.measures.push((name.into(), expr));
        self
    }

    /// Validate that every column name is unique across dimensions and measures
    pub fn build(self) -> Result<DataFusionSemanticTable, SemanticTableError> {
        let mut dimension_exprs = HashMap::new();
        let mut measure_exprs = HashMap::new();
        let mut dimensions = Vec::with_capacity(self.dimensions.len());
        let mut measures = Vec::with_capacity(self.measures.len());

        for (name, expr) in self.dimensions {
            if dimension_exprs.insert(name.clone(), expr).is_some() {
                return Err(SemanticTableError::DuplicateColumn {
                    table: self.name,
                    column: name,
                });
            }
            dimensions.push(name);
        }

        for (name, expr) in self.measures {
            if dimension_exprs.contains_key(&name)
                || measure_exprs.insert(name.clone(), expr).is_some()
            {
                return Err(SemanticTableError::DuplicateColumn {
                    table: self.name,
                    column: name,
                });
            }
            measures.push(name);
        }

        Ok(DataFusionSemanticTable {
            name: self.name,
            ctx: self.ctx,
            source: self.source,
            dimensions,
            measures,
            dimension_exprs,
            measure_exprs,
        })
    }
}

/// Semantic table executed by DataFusion
pub struct DataFusionSemanticTable {
    name: String,
    ctx: SessionContext,
    source: String,
    dimensions: Vec<String>,
    measures: Vec<String>,
    dimension_exprs: HashMap<String, Expr>,
    measure_exprs: HashMap<String, Expr>,
}

impl DataFusionSemanticTable {
    /// Name of the source table in the session context
    pub fn source(&self) -> &str {
        &self.source
    }

    fn group_exprs(&self, group_by: &[String]) -> Result<Vec<Expr>, ExecutionError> {
        group_by
            .iter()
            .map(|name| {
                self.dimension_exprs
                    .get(name)
                    .map(|expr| expr.clone().alias(name))
                    .ok_or_else(|| ExecutionError::UnknownDimension {
                        table: self.name.clone(),
                        column: name.clone(),
                    })
            })
            .collect()
    }

    fn aggregate_exprs(&self, measures: &[String]) -> Result<Vec<Expr>, ExecutionError> {
        measures
            .iter()
            .map(|name| {
                self.measure_exprs
                    .get(name)
                    .map(|expr| expr.clone().alias(name))
                    .ok_or_else(|| ExecutionError::UnknownMeasure {
                        table: self.name.clone(),
                        column: name.clone(),
                    })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl SemanticTable for DataFusionSemanticTable {
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
        group_by: &[String],
        measures: &[String],
    ) -> Result<ResultBatch, ExecutionError> {
        if group_by.is_empty() && measures.is_empty() {
            return Err(ExecutionError::EmptySelection(self.name.clone()));
        }

        let group_exprs = self.group_exprs(group_by)?;
        let aggregate_exprs = self.aggregate_exprs(measures)?;

        let df = self
            .ctx
            .table(self.source.as_str())
            .await?
            .aggregate(group_exprs, aggregate_exprs)?;

        let schema = df.schema().inner().clone();
        let batches = df.collect().await?;

        tracing::debug!(
            "Semantic table '{}' produced {} batches",
            self.name,
            batches.len()
        );

        Ok(ResultBatch::new(schema, batches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::datafusion::converter::DataFusionResultConverter;
    use crate::services::datafusion::sample;
    use datafusion::functions_aggregate::expr_fn::sum;
    use datafusion::logical_expr::col;
    use serde_json::json;

    #[test]
    fn test_duplicate_columns_rejected() {
        let ctx = SessionContext::new();

        let result = SemanticTableBuilder::new("t", ctx.clone(), "src")
            .with_dimension("a", col("a"))
            .with_measure("a", sum(col("b")))
            .build();
        assert!(matches!(result, Err(SemanticTableError::DuplicateColumn { .. })));

        let result = SemanticTableBuilder::new("t", ctx, "src")
            .with_dimension("a", col("a"))
            .with_dimension("a", col("b"))
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_group_by_and_aggregate() {
        let tables = sample::flights_and_sales(&SessionContext::new()).unwrap();
        let (_, sales) = tables.iter().find(|(name, _)| name == "sales").unwrap();

        let batch = sales
            .execute(&["region".to_string()], &["total_units".to_string()])
            .await
            .unwrap();

        assert_eq!(batch.schema.field(0).name(), "region");
        assert_eq!(batch.schema.field(1).name(), "total_units");
        assert_eq!(batch.row_count(), 4);

        let mut rows = DataFusionResultConverter::batch_rows(&batch).unwrap();
        rows.sort_by(|a, b| a[0].as_str().cmp(&b[0].as_str()));
        assert_eq!(rows[0], vec![json!("East"), json!(75)]);
        assert_eq!(rows[2], vec![json!("South"), json!(1)]);
        assert_eq!(rows[3], vec![json!("West"), json!(90)]);
    }

    #[tokio::test]
    async fn test_measures_without_grouping() {
        let tables = sample::flights_and_sales(&SessionContext::new()).unwrap();
        let (_, flights) = tables.iter().find(|(name, _)| name == "flights").unwrap();

        let batch = flights
            .execute(&[], &["total_passengers".to_string(), "flight_count".to_string()])
            .await
            .unwrap();

        let rows = DataFusionResultConverter::batch_rows(&batch).unwrap();
        assert_eq!(rows, vec![vec![json!(840), json!(5)]]);
    }

    #[tokio::test]
    async fn test_computed_dimension() {
        let tables = sample::flights_and_sales(&SessionContext::new()).unwrap();
        let (_, flights) = tables.iter().find(|(name, _)| name == "flights").unwrap();

        let batch = flights
            .execute(&["route".to_string()], &["total_distance".to_string()])
            .await
            .unwrap();

        let rows = DataFusionResultConverter::batch_rows(&batch).unwrap();
        assert!(rows.contains(&vec![json!("SFO-JFK"), json!(2586)]));
    }

    #[tokio::test]
    async fn test_unknown_columns_fail() {
        let tables = sample::flights_and_sales(&SessionContext::new()).unwrap();
        let (_, flights) = tables.iter().find(|(name, _)| name == "flights").unwrap();

        let err = flights
            .execute(&["total_passengers".to_string()], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownDimension { .. }));

        let err = flights
            .execute(&[], &["origin".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::UnknownMeasure { .. }));

        let err = flights.execute(&[], &[]).await.unwrap_err();
        assert!(matches!(err, ExecutionError::EmptySelection(_)));
    }
}
