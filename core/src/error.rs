use serde::Serialize;

/// Error taxonomy for the core. Serializes as `{"type": ..., "details": ...}` so it
/// can ride directly inside an IPC error envelope (see `ipc::message`).
#[derive(Debug, thiserror::Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable wire code this error maps to in an IPC error envelope.
    pub fn ipc_code(&self) -> crate::ipc::message::IpcErrorCode {
        use crate::ipc::message::IpcErrorCode;
        match self {
            Self::NotFound { .. } => IpcErrorCode::NotFound,
            Self::InvalidRequest(_) => IpcErrorCode::InvalidRequest,
            Self::InvalidParams(_) => IpcErrorCode::InvalidParams,
            Self::ServiceUnavailable(_) => IpcErrorCode::ServiceUnavailable,
            Self::Timeout(_) => IpcErrorCode::Timeout,
            Self::Database(_) | Self::Io(_) | Self::Config(_) | Self::Migration(_) | Self::Internal(_) => {
                IpcErrorCode::InternalError
            }
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(value: sqlx::Error) -> Self {
        match &value {
            sqlx::Error::PoolTimedOut => {
                Self::Timeout(format!("database connection pool timed out: {value}"))
            }
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row".to_string(),
                id: "unknown".to_string(),
            },
            _ => Self::Database(value.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CoreError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(value.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidParams(value.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
