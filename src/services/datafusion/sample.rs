// Sample Semantic Tables
//
// Small in-memory flights and sales datasets exposed as semantic tables, used
// by the demo server configuration and by tests.

use std::sync::Arc;

use anyhow::{Context, Result};
use datafusion::arrow::array::{ArrayRef, Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::functions::expr_fn::concat;
use datafusion::functions_aggregate::expr_fn::{avg, count, sum};
use datafusion::logical_expr::{cast, col, lit};
use datafusion::prelude::SessionContext;

use super::semantic_table::SemanticTableBuilder;
use crate::models::SemanticTable;

/// Register the sample source data in `ctx` and build the `flights` and
/// `sales` semantic tables over it
pub fn flights_and_sales(ctx: &SessionContext) -> Result<Vec<(String, Arc<dyn SemanticTable>)>> {
    register_flights_data(ctx)?;
    register_sales_data(ctx)?;

    let flights = SemanticTableBuilder::new("flights", ctx.clone(), "flights_data")
        .with_dimension("origin", col("origin"))
        .with_dimension("destination", col("destination"))
        .with_dimension(
            "route",
            concat(vec![col("origin"), lit("-"), col("destination")]),
        )
        .with_measure("total_passengers", sum(col("passengers")))
        .with_measure("avg_delay", avg(col("delay")))
        .with_measure("total_distance", sum(col("distance")))
        .with_measure("flight_count", count(col("origin")))
        .build()?;

    let sales = SemanticTableBuilder::new("sales", ctx.clone(), "sales_data")
        .with_dimension("product", col("product"))
        .with_dimension("region", col("region"))
        .with_measure("total_sales", sum(col("sales")))
        .with_measure("total_units", sum(col("units")))
        .with_measure(
            "avg_price",
            avg(cast(col("sales"), DataType::Float64) / cast(col("units"), DataType::Float64)),
        )
        .build()?;

    Ok(vec![
        ("flights".to_string(), Arc::new(flights) as Arc<dyn SemanticTable>),
        ("sales".to_string(), Arc::new(sales) as Arc<dyn SemanticTable>),
    ])
}

fn register_flights_data(ctx: &SessionContext) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("origin", DataType::Utf8, false),
        Field::new("destination", DataType::Utf8, false),
        Field::new("distance", DataType::Int64, false),
        Field::new("passengers", DataType::Int64, false),
        Field::new("delay", DataType::Int64, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec!["SFO", "SFO", "LAX", "JFK", "ORD"])),
        Arc::new(StringArray::from(vec!["LAX", "JFK", "SFO", "ORD", "SFO"])),
        Arc::new(Int64Array::from(vec![337, 2586, 337, 740, 1846])),
        Arc::new(Int64Array::from(vec![150, 200, 120, 180, 190])),
        Arc::new(Int64Array::from(vec![15, 30, 10, 25, 20])),
    ];

    let batch = RecordBatch::try_new(schema, columns).context("Failed to build flights data")?;
    ctx.register_batch("flights_data", batch)
        .context("Failed to register flights data")?;
    Ok(())
}

fn register_sales_data(ctx: &SessionContext) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("product", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, false),
        Field::new("sales", DataType::Int64, false),
        Field::new("units", DataType::Int64, false),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(vec!["A", "A", "B", "B", "C"])),
        Arc::new(StringArray::from(vec!["West", "East", "West", "North", "South"])),
        Arc::new(Int64Array::from(vec![1000, 1500, 800, 1200, 900])),
        Arc::new(Int64Array::from(vec![50, 75, 40, 60, 1])),
    ];

    let batch = RecordBatch::try_new(schema, columns).context("Failed to build sales data")?;
    ctx.register_batch("sales_data", batch)
        .context("Failed to register sales data")?;
    Ok(())
}
