// Wire Messages
//
// Newline-delimited JSON frames exchanged with clients. Each line carries one
// message tagged by its "type" field.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::ColumnDescription;
use crate::services::QueryError;

/// Client -> server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Startup {
        user: String,
        password: String,
        #[serde(default)]
        database: Option<String>,
    },
    Query {
        sql: String,
    },
    Terminate,
}

/// Server -> client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthOk,
    AuthFailed {
        attempts_left: u32,
    },
    Result {
        columns: Vec<WireColumn>,
        rows: Vec<Vec<JsonValue>>,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Column header inside a result message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireColumn {
    pub name: String,
    pub type_oid: u32,
    pub type_name: String,
}

impl From<&ColumnDescription> for WireColumn {
    fn from(column: &ColumnDescription) -> Self {
        Self {
            name: column.name.clone(),
            type_oid: column.oid,
            type_name: column.type_name.to_string(),
        }
    }
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&QueryError> for ServerMessage {
    fn from(err: &QueryError) -> Self {
        ServerMessage::error(err.code(), err.to_string())
    }
}
