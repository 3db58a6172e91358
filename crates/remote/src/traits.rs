use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RemoteError;

/// One record or attribute map as it travels over the wire.
pub type WireRecord = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    /// Sort clause such as `"name desc"`.
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for ServerVersion {
    type Err = RemoteError;

    /// Accepts `"8.0"`, `"saas~11.3"`, `"16.0+e"` and similar.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let start = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| RemoteError::UnexpectedResponse(format!("server version '{s}'")))?;
        let mut parts = s[start..]
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .map(str::parse::<u32>);
        let major = parts
            .next()
            .and_then(Result::ok)
            .ok_or_else(|| RemoteError::UnexpectedResponse(format!("server version '{s}'")))?;
        let minor = parts.next().and_then(Result::ok).unwrap_or(0);
        Ok(Self { major, minor })
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Result of the legacy bulk import primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyImportOutcome {
    /// Rows committed, `-1` on failure.
    pub committed: i64,
    pub failing_row: i64,
    pub message: String,
}

impl LegacyImportOutcome {
    /// Parses the `[count, row, message, ...]` tuple.
    pub fn from_wire(value: &Value) -> Result<Self, RemoteError> {
        let unexpected = || RemoteError::UnexpectedResponse(format!("legacy import result {value}"));
        let items = value.as_array().ok_or_else(unexpected)?;
        let committed = items.first().and_then(Value::as_i64).ok_or_else(unexpected)?;
        let failing_row = match items.get(1) {
            Some(Value::Number(n)) => n.as_i64().unwrap_or(-1),
            _ => -1,
        };
        let message = match items.get(2) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(false)) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Ok(Self {
            committed,
            failing_row,
            message,
        })
    }
}

/// Result of the newer `load` primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Ids of the loaded records, in input order.
    Loaded(Vec<i64>),
    /// Structured per-row messages.
    Rejected(Vec<WireRecord>),
}

impl LoadOutcome {
    /// Parses `{"ids": [...] | false, "messages": [...]}`.
    pub fn from_wire(value: &Value) -> Result<Self, RemoteError> {
        let unexpected = || RemoteError::UnexpectedResponse(format!("load result {value}"));
        let object = value.as_object().ok_or_else(unexpected)?;
        match object.get("ids") {
            Some(Value::Array(ids)) => ids
                .iter()
                .map(|id| id.as_i64().ok_or_else(unexpected))
                .collect::<Result<Vec<_>, _>>()
                .map(LoadOutcome::Loaded),
            Some(Value::Bool(false)) | Some(Value::Null) | None => {
                let messages = object
                    .get("messages")
                    .and_then(Value::as_array)
                    .map(|messages| {
                        messages
                            .iter()
                            .filter_map(|m| m.as_object().cloned())
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(LoadOutcome::Rejected(messages))
            }
            Some(_) => Err(unexpected()),
        }
    }
}

/// The remote-procedure primitives of a dynamically-schemed object store.
///
/// Implementations own transport, authentication and timeouts. All calls are
/// synchronous and may be issued from several threads at once.
pub trait RemoteStore: Send + Sync {
    fn server_version(&self) -> Result<ServerVersion, RemoteError>;

    fn search_ids(
        &self,
        model: &str,
        domain: &[Value],
        options: &SearchOptions,
    ) -> Result<Vec<i64>, RemoteError>;

    fn search_count(&self, model: &str, domain: &[Value]) -> Result<u64, RemoteError>;

    /// Reads `fields` of each record; an empty list reads every field.
    fn read_fields(
        &self,
        model: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<WireRecord>, RemoteError>;

    /// `name -> attributes` for the model's fields, restricted to `filter_names` when given.
    fn field_schemas(&self, model: &str, filter_names: &[String]) -> Result<WireRecord, RemoteError>;

    fn import_legacy(
        &self,
        model: &str,
        fields: &[String],
        rows: &[Vec<Value>],
    ) -> Result<LegacyImportOutcome, RemoteError>;

    fn load(
        &self,
        model: &str,
        fields: &[String],
        rows: &[Vec<Value>],
    ) -> Result<LoadOutcome, RemoteError>;

    fn create(&self, model: &str, values: &WireRecord) -> Result<i64, RemoteError>;

    fn write(&self, model: &str, id: i64, values: &WireRecord) -> Result<bool, RemoteError>;

    fn unlink(&self, model: &str, ids: &[i64]) -> Result<bool, RemoteError>;

    fn call_function(
        &self,
        model: &str,
        function: &str,
        params: &[Value],
    ) -> Result<Value, RemoteError>;

    fn resolve_display_names(
        &self,
        model: &str,
        ids: &[i64],
    ) -> Result<Vec<(i64, String)>, RemoteError>;

    fn exec_workflow_signal(&self, model: &str, signal: &str, id: i64) -> Result<(), RemoteError>;
}
