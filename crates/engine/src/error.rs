use erpbridge_core::CoreError;
use erpbridge_remote::{RemoteError, ServerVersion};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("could not find model with name '{0}'")]
    ModelNotFound(String),

    #[error("could not find signal with name '{signal}' for model '{model}'")]
    SignalNotFound { model: String, signal: String },

    #[error("import rejected at row {row}: {message}")]
    ImportRejected { message: String, row: i64 },

    #[error("load rejected: {0}")]
    LoadRejected(String),

    #[error("row of model '{0}' has no database id")]
    MissingId(String),

    #[error("row of model '{0}' has no fields to write")]
    NoValuesToWrite(String),

    #[error("could not find {relation} with id {id}")]
    RelationNotFound { relation: String, id: i64 },

    #[error("server version {version} is not supported: {reason}")]
    UnsupportedServer { version: ServerVersion, reason: String },

    #[error("function '{function}' on model '{model}' failed: {source}")]
    FunctionFailed {
        model: String,
        function: String,
        #[source]
        source: RemoteError,
    },

    #[error("invalid session config: {0}")]
    Config(#[from] serde_json::Error),
}
