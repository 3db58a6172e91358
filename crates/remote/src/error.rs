use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("unknown function '{function}' on model '{model}'")]
    UnknownFunction { model: String, function: String },

    #[error("record {id} of model '{model}' not found")]
    RecordNotFound { model: String, id: i64 },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
