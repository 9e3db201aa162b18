// DataFusion Semantic Tables
//
// Compute backend for semantic tables: dimensions and measures are DataFusion
// expressions evaluated over source tables held in a SessionContext.

pub mod converter; // Arrow -> JSON rows
pub mod sample; // flights/sales sample tables
pub mod semantic_table; // DataFusionSemanticTable + builder
pub mod session; // DataFusionSessionManager

pub use converter::DataFusionResultConverter;
pub use semantic_table::{DataFusionSemanticTable, SemanticTableBuilder, SemanticTableError};
pub use session::{DataFusionSessionManager, SessionConfig};
