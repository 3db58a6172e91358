use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("field '{0}' was not found")]
    UnknownField(String),

    #[error("cannot search on computed field '{0}'")]
    ComputedFieldFilter(String),

    #[error("unknown boolean '{0}'")]
    UnknownBoolean(String),

    #[error("malformed filter: {0}")]
    MalformedFilter(String),

    #[error("invalid number '{value}' for field '{field}'")]
    InvalidNumber { field: String, value: String },

    #[error("invalid integer '{value}' for field '{field}'")]
    InvalidInteger { field: String, value: String },

    #[error("no valid value for selection field '{field}' with value '{value}'")]
    SelectionMismatch { field: String, value: String },

    #[error("field '{0}' is not a many2many field")]
    NotMany2Many(String),
}
