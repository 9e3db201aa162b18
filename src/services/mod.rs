pub mod catalog;
pub mod connection_handler;
pub mod datafusion; // DataFusion-backed semantic tables
pub mod translator;

pub use catalog::*;
pub use connection_handler::*;
pub use translator::*;
