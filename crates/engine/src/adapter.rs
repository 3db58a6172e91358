use std::sync::Arc;

use erpbridge_core::{CoreError, Filter, Row, Schema, filter, marshal};
use erpbridge_remote::{RemoteStore, SearchOptions, WireRecord};
use serde_json::Value;

use crate::Session;
use crate::cache::LookupCache;
use crate::error::EngineError;
use crate::import::{ImportCoordinator, ImportProtocol};

/// Caller surface bound to one remote model.
///
/// The model's field schemas are fetched once, when the adapter is opened,
/// and shared by every row the adapter hands out.
pub struct ObjectAdapter {
    model: String,
    remote: Arc<dyn RemoteStore>,
    cache: Arc<LookupCache>,
    import: Arc<dyn ImportProtocol>,
    default_limit: Option<u32>,
    schema: Arc<Schema>,
}

impl ObjectAdapter {
    /// Fails fast with `ModelNotFound` when the model is unknown to the server.
    pub fn new(session: &Session, model: &str) -> Result<Self, EngineError> {
        session.cache.ensure_model(session.remote.as_ref(), model)?;
        let schema = Schema::from_wire(&session.remote.field_schemas(model, &[])?);
        Ok(Self {
            model: model.to_string(),
            remote: Arc::clone(&session.remote),
            cache: Arc::clone(&session.cache),
            import: Arc::clone(&session.import),
            default_limit: session.config.default_limit,
            schema: Arc::new(schema),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Every field of the model, as discovered at construction.
    pub fn fields(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn field_names(&self) -> Vec<String> {
        self.schema.names()
    }

    /// Fresh schemas from the server, restricted to `names` when non-empty.
    pub fn field_schemas(&self, names: &[String]) -> Result<Schema, EngineError> {
        Ok(Schema::from_wire(&self.remote.field_schemas(&self.model, names)?))
    }

    pub fn validate_filter(&self, filter: &Filter) -> Result<Vec<Value>, EngineError> {
        Ok(filter::normalize(filter, &self.schema)?)
    }

    pub fn search_and_read<S: AsRef<str>>(
        &self,
        filter: &Filter,
        fields: &[S],
        options: &SearchOptions,
    ) -> Result<Vec<Row>, EngineError> {
        let domain = self.validate_filter(filter)?;
        let mut options = options.clone();
        if options.limit.is_none() {
            options.limit = self.default_limit;
        }
        let ids = self.remote.search_ids(&self.model, &domain, &options)?;
        self.read(&ids, fields)
    }

    pub fn count(&self, filter: &Filter) -> Result<u64, EngineError> {
        let domain = self.validate_filter(filter)?;
        Ok(self.remote.search_count(&self.model, &domain)?)
    }

    /// Reads `ids` into rows; an empty field list reads every field.
    pub fn read<S: AsRef<str>>(&self, ids: &[i64], fields: &[S]) -> Result<Vec<Row>, EngineError> {
        let schema = self.schema_for(fields)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.remote.read_fields(&self.model, ids, &schema.names())?;
        Ok(records
            .iter()
            .map(|record| marshal::read_row(&schema, record))
            .collect())
    }

    /// Empty row (id 0, every field null) over `fields`, or over all fields.
    pub fn new_row<S: AsRef<str>>(&self, fields: &[S]) -> Result<Row, EngineError> {
        Ok(Row::new(self.schema_for(fields)?))
    }

    /// Bulk create/update through the session's import protocol.
    pub fn import_data(&self, rows: &mut [Row]) -> Result<bool, EngineError> {
        ImportCoordinator::new(self.remote.as_ref(), &self.model, self.import.as_ref()).run(rows)
    }

    /// Writes one existing row. Returns `false` without a remote call when there is nothing to send.
    pub fn write(&self, row: &mut Row, changes_only: bool) -> Result<bool, EngineError> {
        if row.id() <= 0 {
            return Err(EngineError::MissingId(self.model.clone()));
        }
        let values = marshal::collect_values(row, changes_only)?;
        if values.is_empty() {
            return Ok(false);
        }
        let written = self.remote.write(&self.model, row.id(), &values)?;
        if written {
            row.commit();
        }
        Ok(written)
    }

    pub fn write_all(&self, rows: &mut [Row], changes_only: bool) -> Result<Vec<bool>, EngineError> {
        rows.iter_mut()
            .map(|row| self.write(row, changes_only))
            .collect()
    }

    /// Creates the row remotely and stores the new id on it.
    pub fn create(&self, row: &mut Row) -> Result<(), EngineError> {
        let values = marshal::collect_values(row, false)?;
        if values.is_empty() {
            return Err(EngineError::NoValuesToWrite(self.model.clone()));
        }
        let id = self.remote.create(&self.model, &values)?;
        tracing::debug!(model = %self.model, id, "record created");
        row.set_id(id);
        row.commit();
        Ok(())
    }

    pub fn delete(&self, row: &Row) -> Result<bool, EngineError> {
        self.delete_all(std::slice::from_ref(row))
    }

    pub fn delete_all(&self, rows: &[Row]) -> Result<bool, EngineError> {
        let ids: Vec<i64> = rows.iter().map(Row::id).collect();
        Ok(self.remote.unlink(&self.model, &ids)?)
    }

    /// Calls a model function returning records. Without a schema, one is
    /// inferred from the first returned record.
    pub fn call_function(
        &self,
        function: &str,
        params: &[Value],
        schema: Option<&Schema>,
    ) -> Result<Vec<Row>, EngineError> {
        let records = self.call(function, params)?;
        let schema = Arc::new(match schema {
            Some(schema) => schema.clone(),
            None => records.first().map(Schema::infer_from_sample).unwrap_or_default(),
        });
        Ok(records
            .iter()
            .map(|record| marshal::read_row(&schema, record))
            .collect())
    }

    /// Calls a model function whose first returned record describes fields.
    pub fn call_fields_function(&self, function: &str, params: &[Value]) -> Result<Schema, EngineError> {
        let records = self.call(function, params)?;
        Ok(records
            .first()
            .map(Schema::infer_from_sample)
            .unwrap_or_default())
    }

    pub fn execute_workflow(&self, row: &Row, signal: &str) -> Result<(), EngineError> {
        self.cache
            .ensure_signal(self.remote.as_ref(), &self.model, signal)?;
        Ok(self
            .remote
            .exec_workflow_signal(&self.model, signal, row.id())?)
    }

    fn call(&self, function: &str, params: &[Value]) -> Result<Vec<WireRecord>, EngineError> {
        let result = self
            .remote
            .call_function(&self.model, function, params)
            .map_err(|source| EngineError::FunctionFailed {
                model: self.model.clone(),
                function: function.to_string(),
                source,
            })?;
        Ok(match result {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            Value::Object(record) => vec![record],
            _ => Vec::new(),
        })
    }

    /// The full schema, or the subset named by `fields`. `id` is always implied.
    fn schema_for<S: AsRef<str>>(&self, fields: &[S]) -> Result<Arc<Schema>, EngineError> {
        let names: Vec<&str> = fields
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| *name != "id")
            .collect();
        if names.is_empty() {
            return Ok(Arc::clone(&self.schema));
        }
        if let Some(unknown) = names.iter().find(|name| !self.schema.contains(name)) {
            return Err(CoreError::UnknownField(unknown.to_string()).into());
        }
        Ok(Arc::new(self.schema.subset(&names)))
    }
}
