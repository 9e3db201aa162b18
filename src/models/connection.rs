use serde::{Deserialize, Serialize};

/// Lifecycle state of one client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Unauthenticated,
    Idle,
    Executing,
    Terminated,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Unauthenticated => "unauthenticated",
            ConnectionState::Idle => "idle",
            ConnectionState::Executing => "executing",
            ConnectionState::Terminated => "terminated",
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, ConnectionState::Terminated)
    }
}

/// Username/password pair accepted by the server
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}
