pub mod connection;
pub mod query;
pub mod semantic_table;
pub mod wire_types;

pub use connection::*;
pub use query::*;
pub use semantic_table::*;
pub use wire_types::*;
