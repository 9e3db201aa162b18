pub mod api;
pub mod config;
pub mod models;
pub mod protocol;
pub mod server;
pub mod services;
pub mod validation;

pub use models::*;
pub use server::SemanticServer;
pub use services::*;
pub use validation::*;
