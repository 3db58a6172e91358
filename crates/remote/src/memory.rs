//! In-process object store speaking the `RemoteStore` primitives.
//!
//! Records are kept in wire form: many2one as a bare id, many2many as an id
//! list, selections as codes, and `false` for anything unset. Every call is
//! recorded so callers can assert on the exact remote traffic.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use erpbridge_core::FieldType;
use serde_json::{Map, Value, json};

use crate::error::RemoteError;
use crate::traits::{
    LegacyImportOutcome, LoadOutcome, RemoteStore, SearchOptions, ServerVersion, WireRecord,
};

pub type RemoteFunction = Arc<dyn Fn(&[Value]) -> Result<Value, RemoteError> + Send + Sync>;

/// One primitive invocation, as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub method: &'static str,
    pub model: String,
}

/// Field list and row matrix received by a bulk import primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub method: &'static str,
    pub model: String,
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Default)]
struct ModelData {
    fields: WireRecord,
    records: BTreeMap<i64, WireRecord>,
    next_id: i64,
}

#[derive(Debug, Clone, Default)]
struct State {
    models: BTreeMap<String, ModelData>,
    fired_signals: Vec<(String, String, i64)>,
}

pub struct MemoryRemote {
    version: ServerVersion,
    state: Mutex<State>,
    calls: Mutex<Vec<RemoteCall>>,
    imports: Mutex<Vec<ImportRequest>>,
    faults: Mutex<HashMap<&'static str, String>>,
    functions: Mutex<HashMap<(String, String), RemoteFunction>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryRemote {
    /// Empty store with the model registry and workflow models in place.
    pub fn new(version: ServerVersion) -> Self {
        let remote = Self {
            version,
            state: Mutex::new(State::default()),
            calls: Mutex::new(Vec::new()),
            imports: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            functions: Mutex::new(HashMap::new()),
        };
        remote.define_model(
            "ir.model",
            json!({
                "model": {"type": "char", "string": "Model", "required": true},
                "name": {"type": "char", "string": "Model Description"},
            }),
        );
        remote.define_model(
            "workflow",
            json!({
                "name": {"type": "char", "required": true},
                "osv": {"type": "char", "string": "Resource Object", "required": true},
            }),
        );
        remote.define_model(
            "workflow.transition",
            json!({
                "signal": {"type": "char"},
                "wkf_id": {"type": "many2one", "relation": "workflow", "required": true},
            }),
        );
        remote
    }

    /// Defines (or redefines) a model from a `name -> attributes` object and
    /// registers it in the model registry.
    pub fn define_model(&self, name: &str, fields: Value) {
        let fields = match fields {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        let mut state = lock(&self.state);
        let is_new = !state.models.contains_key(name);
        state.models.entry(name.to_string()).or_default().fields = fields;
        if is_new && let Some(registry) = state.models.get_mut("ir.model") {
            registry.next_id += 1;
            let id = registry.next_id;
            let mut record = Map::new();
            record.insert("model".to_string(), json!(name));
            record.insert("name".to_string(), json!(name));
            registry.records.insert(id, record);
        }
    }

    /// Inserts a record without recording a call.
    pub fn insert(&self, model: &str, values: Value) -> Result<i64, RemoteError> {
        let values = match values {
            Value::Object(values) => values,
            other => {
                return Err(RemoteError::UnexpectedResponse(format!(
                    "record values must be an object, got {other}"
                )));
            }
        };
        lock(&self.state).create(model, &values)
    }

    /// Stored form of one record.
    pub fn record(&self, model: &str, id: i64) -> Option<WireRecord> {
        lock(&self.state)
            .models
            .get(model)
            .and_then(|data| data.records.get(&id).cloned())
    }

    pub fn record_count(&self, model: &str) -> usize {
        lock(&self.state)
            .models
            .get(model)
            .map_or(0, |data| data.records.len())
    }

    /// Makes `signal` a known workflow transition of `model`.
    pub fn add_workflow_signal(&self, model: &str, signal: &str) -> Result<(), RemoteError> {
        let mut state = lock(&self.state);
        let existing = state.model("workflow")?.records.iter().find_map(|(id, record)| {
            (record.get("osv").and_then(Value::as_str) == Some(model)).then_some(*id)
        });
        let workflow_id = match existing {
            Some(id) => id,
            None => {
                let values = json!({"name": format!("{model}.basic"), "osv": model});
                state.create("workflow", values.as_object().unwrap_or(&Map::new()))?
            }
        };
        let values = json!({"signal": signal, "wkf_id": workflow_id});
        state.create("workflow.transition", values.as_object().unwrap_or(&Map::new()))?;
        Ok(())
    }

    /// `(model, signal, record id)` of every executed workflow signal.
    pub fn fired_signals(&self) -> Vec<(String, String, i64)> {
        lock(&self.state).fired_signals.clone()
    }

    pub fn register_function(
        &self,
        model: &str,
        function: &str,
        handler: impl Fn(&[Value]) -> Result<Value, RemoteError> + Send + Sync + 'static,
    ) {
        lock(&self.functions).insert((model.to_string(), function.to_string()), Arc::new(handler));
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, method: &str, model: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.method == method && call.model == model)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
        lock(&self.imports).clear();
    }

    /// Every bulk import request received, in call order.
    pub fn import_requests(&self) -> Vec<ImportRequest> {
        lock(&self.imports).clone()
    }

    /// Makes every later call of `method` fail with a remote fault.
    pub fn inject_fault(&self, method: &'static str, message: impl Into<String>) {
        lock(&self.faults).insert(method, message.into());
    }

    fn enter(&self, method: &'static str, model: &str) -> Result<(), RemoteError> {
        lock(&self.calls).push(RemoteCall {
            method,
            model: model.to_string(),
        });
        match lock(&self.faults).get(method) {
            Some(message) => {
                tracing::debug!(method, model, "injected fault");
                Err(RemoteError::Fault {
                    code: 1,
                    message: message.clone(),
                })
            }
            None => Ok(()),
        }
    }

    /// Applies every row or none of them. Returns the record ids, or the failing
    /// row index and message.
    fn import_rows(
        &self,
        method: &'static str,
        model: &str,
        fields: &[String],
        rows: &[Vec<Value>],
    ) -> Result<Result<Vec<i64>, (usize, String)>, RemoteError> {
        lock(&self.imports).push(ImportRequest {
            method,
            model: model.to_string(),
            fields: fields.to_vec(),
            rows: rows.to_vec(),
        });
        let mut state = lock(&self.state);
        state.model(model)?;
        let mut staged = state.clone();
        let mut ids = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            match staged.import_row(model, fields, row) {
                Ok(id) => ids.push(id),
                Err(err) => {
                    tracing::debug!(model, row = index, error = %err, "import rolled back");
                    return Ok(Err((index, fault_message(err))));
                }
            }
        }
        *state = staged;
        Ok(Ok(ids))
    }
}

fn fault_message(err: RemoteError) -> String {
    match err {
        RemoteError::Fault { message, .. } => message,
        other => other.to_string(),
    }
}

fn fault(message: String) -> RemoteError {
    RemoteError::Fault { code: 2, message }
}

fn field_type(attrs: &Value) -> FieldType {
    attrs
        .get("type")
        .and_then(Value::as_str)
        .map_or(FieldType::Char, FieldType::from_tag)
}

fn is_unset(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(false))
}

impl State {
    fn model(&self, name: &str) -> Result<&ModelData, RemoteError> {
        self.models
            .get(name)
            .ok_or_else(|| RemoteError::UnknownModel(name.to_string()))
    }

    fn model_mut(&mut self, name: &str) -> Result<&mut ModelData, RemoteError> {
        self.models
            .get_mut(name)
            .ok_or_else(|| RemoteError::UnknownModel(name.to_string()))
    }

    fn field_attrs(&self, model: &str, field: &str) -> Result<&Value, RemoteError> {
        self.model(model)?
            .fields
            .get(field)
            .ok_or_else(|| fault(format!("Invalid field '{field}' on model '{model}'")))
    }

    fn display_name(&self, model: &str, id: i64) -> String {
        self.models
            .get(model)
            .and_then(|data| data.records.get(&id))
            .and_then(|record| record.get("name"))
            .and_then(Value::as_str)
            .map_or_else(|| format!("{model},{id}"), str::to_string)
    }

    fn find_by_name(&self, model: &str, name: &str) -> Option<i64> {
        let data = self.models.get(model)?;
        data.records
            .keys()
            .copied()
            .find(|id| self.display_name(model, *id) == name)
    }

    fn exists(&self, model: &str, id: i64) -> bool {
        self.models
            .get(model)
            .is_some_and(|data| data.records.contains_key(&id))
    }

    /// Converts an incoming value into its stored form.
    fn store_value(&self, model: &str, field: &str, value: &Value) -> Result<Value, RemoteError> {
        let attrs = self.field_attrs(model, field)?;
        let relation = attrs.get("relation").and_then(Value::as_str).unwrap_or_default();
        match field_type(attrs) {
            FieldType::Many2One => {
                let id = match value {
                    v if is_unset(v) => return Ok(Value::Bool(false)),
                    Value::Array(pair) => pair.first().and_then(Value::as_i64),
                    other => other.as_i64(),
                }
                .ok_or_else(|| fault(format!("Wrong value for {model}.{field}: {value}")))?;
                if id == 0 {
                    return Ok(Value::Bool(false));
                }
                if !self.exists(relation, id) {
                    return Err(fault(format!("Record {relation},{id} does not exist")));
                }
                Ok(json!(id))
            }
            FieldType::Many2Many | FieldType::One2Many => match value {
                v if is_unset(v) => Ok(json!([])),
                Value::Array(items) => {
                    let mut ids = Vec::new();
                    for item in items {
                        match item {
                            Value::Number(n) => ids.extend(n.as_i64()),
                            Value::Array(command) if command.first().and_then(Value::as_i64) == Some(6) => {
                                ids = command
                                    .get(2)
                                    .and_then(Value::as_array)
                                    .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
                                    .unwrap_or_default();
                            }
                            Value::Null => {}
                            other => {
                                return Err(fault(format!(
                                    "Unsupported relational command for {model}.{field}: {other}"
                                )));
                            }
                        }
                    }
                    Ok(json!(ids))
                }
                Value::Number(n) => Ok(json!([n])),
                other => Err(fault(format!("Wrong value for {model}.{field}: {other}"))),
            },
            FieldType::Selection => {
                if is_unset(value) {
                    return Ok(Value::Bool(false));
                }
                let known = attrs
                    .get("selection")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .any(|option| option.get(0) == Some(value));
                if known {
                    Ok(value.clone())
                } else {
                    Err(fault(format!("Wrong value for {model}.{field}: {value}")))
                }
            }
            _ => Ok(if value.is_null() {
                Value::Bool(false)
            } else {
                value.clone()
            }),
        }
    }

    fn create(&mut self, model: &str, values: &WireRecord) -> Result<i64, RemoteError> {
        let mut record = Map::new();
        for (field, value) in values {
            record.insert(field.clone(), self.store_value(model, field, value)?);
        }
        for (field, attrs) in &self.model(model)?.fields {
            let required = attrs.get("required").and_then(Value::as_bool).unwrap_or(false);
            if required && record.get(field).is_none_or(is_unset) {
                return Err(fault(format!(
                    "Missing required value for the field '{field}' on model '{model}'"
                )));
            }
        }
        let data = self.model_mut(model)?;
        data.next_id += 1;
        let id = data.next_id;
        data.records.insert(id, record);
        Ok(id)
    }

    fn write(&mut self, model: &str, id: i64, values: &WireRecord) -> Result<(), RemoteError> {
        if !self.exists(model, id) {
            self.model(model)?;
            return Err(RemoteError::RecordNotFound {
                model: model.to_string(),
                id,
            });
        }
        let mut stored = Vec::with_capacity(values.len());
        for (field, value) in values {
            stored.push((field.clone(), self.store_value(model, field, value)?));
        }
        if let Some(record) = self.model_mut(model)?.records.get_mut(&id) {
            record.extend(stored);
        }
        Ok(())
    }

    fn read(&self, model: &str, id: i64, fields: &[String]) -> Result<WireRecord, RemoteError> {
        let data = self.model(model)?;
        let record = data.records.get(&id).ok_or_else(|| RemoteError::RecordNotFound {
            model: model.to_string(),
            id,
        })?;
        let names: Vec<&String> = if fields.is_empty() {
            data.fields.keys().collect()
        } else {
            fields.iter().collect()
        };
        let mut out = Map::new();
        out.insert("id".to_string(), json!(id));
        for name in names {
            let attrs = self.field_attrs(model, name)?;
            let stored = record.get(name.as_str()).cloned().unwrap_or(Value::Bool(false));
            let value = match (field_type(attrs), &stored) {
                (FieldType::Many2One, Value::Number(n)) => {
                    let relation = attrs.get("relation").and_then(Value::as_str).unwrap_or_default();
                    let target = n.as_i64().unwrap_or_default();
                    json!([target, self.display_name(relation, target)])
                }
                (FieldType::Many2Many | FieldType::One2Many, Value::Bool(false)) => json!([]),
                _ => stored.clone(),
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }

    /// Resolves one cell of a bulk import row.
    fn import_cell(&self, model: &str, column: &str, cell: &Value) -> Result<(String, Value), RemoteError> {
        if let Some(base) = column.strip_suffix(".id") {
            let attrs = self.field_attrs(model, base)?;
            if field_type(attrs) != FieldType::Many2One {
                return Err(fault(format!("Column '{column}' is not a many2one reference")));
            }
            return Ok((base.to_string(), cell.clone()));
        }
        let attrs = self.field_attrs(model, column)?;
        let relation = attrs.get("relation").and_then(Value::as_str).unwrap_or_default();
        let value = match (field_type(attrs), cell) {
            (_, v) if is_unset(v) => Value::Bool(false),
            (FieldType::Many2One, Value::String(name)) if name.is_empty() => Value::Bool(false),
            (FieldType::Many2One, Value::String(name)) => {
                let id = self
                    .find_by_name(relation, name)
                    .ok_or_else(|| fault(format!("No matching record for {relation} '{name}'")))?;
                json!(id)
            }
            (FieldType::Many2Many, Value::String(names)) => {
                let mut ids = Vec::new();
                for name in names.split(',').filter(|name| !name.is_empty()) {
                    let id = self
                        .find_by_name(relation, name)
                        .ok_or_else(|| fault(format!("No matching record for {relation} '{name}'")))?;
                    ids.push(id);
                }
                json!(ids)
            }
            (FieldType::Selection, Value::String(text)) => attrs
                .get("selection")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .find(|option| {
                    option.get(0).and_then(Value::as_str) == Some(text)
                        || option.get(1).and_then(Value::as_str) == Some(text)
                })
                .and_then(|option| option.get(0).cloned())
                .ok_or_else(|| fault(format!("Value '{text}' not found in selection field '{column}'")))?,
            (FieldType::Boolean, Value::String(text)) => {
                Value::Bool(matches!(text.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            }
            (FieldType::Integer, Value::String(text)) => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| fault(format!("'{text}' is not an integer for field '{column}'")))?,
            (FieldType::Float, Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fault(format!("'{text}' is not a number for field '{column}'")))?,
            (FieldType::One2Many, Value::String(text)) => {
                let ids: Vec<i64> = text
                    .split(',')
                    .filter_map(|id| id.trim().parse().ok())
                    .collect();
                json!(ids)
            }
            (_, other) => other.clone(),
        };
        Ok((column.to_string(), value))
    }

    fn import_row(&mut self, model: &str, fields: &[String], row: &[Value]) -> Result<i64, RemoteError> {
        if row.len() != fields.len() {
            return Err(fault(format!(
                "Row has {} values for {} columns",
                row.len(),
                fields.len()
            )));
        }
        let mut id = 0;
        let mut values = Map::new();
        for (column, cell) in fields.iter().zip(row) {
            if column == ".id" {
                id = cell.as_i64().unwrap_or(0);
                continue;
            }
            let (field, value) = self.import_cell(model, column, cell)?;
            values.insert(field, value);
        }
        if id == 0 {
            self.create(model, &values)
        } else {
            self.write(model, id, &values)?;
            Ok(id)
        }
    }

    fn search(&self, model: &str, domain: &[Value]) -> Result<Vec<i64>, RemoteError> {
        let data = self.model(model)?;
        let mut ids = Vec::new();
        for (id, record) in &data.records {
            if evaluate(domain, *id, record)? {
                ids.push(*id);
            }
        }
        Ok(ids)
    }
}

/// Evaluates a prefix-notation domain; consecutive terms are implicitly and-ed.
fn evaluate(domain: &[Value], id: i64, record: &WireRecord) -> Result<bool, RemoteError> {
    let mut stack: Vec<bool> = Vec::new();
    let malformed = || fault("Malformed domain".to_string());
    for term in domain.iter().rev() {
        match term {
            Value::String(operator) => match operator.as_str() {
                "!" => {
                    let a = stack.pop().ok_or_else(malformed)?;
                    stack.push(!a);
                }
                "|" | "&" => {
                    let a = stack.pop().ok_or_else(malformed)?;
                    let b = stack.pop().ok_or_else(malformed)?;
                    stack.push(if operator == "|" { a || b } else { a && b });
                }
                other => return Err(fault(format!("Unknown domain operator '{other}'"))),
            },
            Value::Array(leaf) => stack.push(evaluate_leaf(leaf, id, record)?),
            other => return Err(fault(format!("Invalid domain term {other}"))),
        }
    }
    Ok(stack.into_iter().all(|matched| matched))
}

fn evaluate_leaf(leaf: &[Value], id: i64, record: &WireRecord) -> Result<bool, RemoteError> {
    let [Value::String(field), Value::String(operator), operand] = leaf else {
        return Err(fault(format!("Invalid domain leaf {leaf:?}")));
    };
    let stored = if field == "id" {
        json!(id)
    } else {
        record.get(field).cloned().unwrap_or(Value::Bool(false))
    };
    let matched = match operator.to_ascii_lowercase().as_str() {
        "=" | "==" => matches_value(&stored, operand),
        "!=" | "<>" => !matches_value(&stored, operand),
        "<" => compare(&stored, operand) == Some(Ordering::Less),
        ">" => compare(&stored, operand) == Some(Ordering::Greater),
        "<=" => matches!(compare(&stored, operand), Some(Ordering::Less | Ordering::Equal)),
        ">=" => matches!(compare(&stored, operand), Some(Ordering::Greater | Ordering::Equal)),
        "in" => operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| matches_value(&stored, item))),
        "not in" => !operand
            .as_array()
            .is_some_and(|items| items.iter().any(|item| matches_value(&stored, item))),
        "like" => contains(&stored, operand, false),
        "ilike" => contains(&stored, operand, true),
        "not like" => !contains(&stored, operand, false),
        "not ilike" => !contains(&stored, operand, true),
        other => return Err(fault(format!("Unsupported comparison '{other}'"))),
    };
    Ok(matched)
}

/// Id lists match when they contain the operand; unset values match `false`.
fn matches_value(stored: &Value, operand: &Value) -> bool {
    match (stored, operand) {
        (Value::Array(items), Value::Bool(false)) => items.is_empty(),
        (Value::Array(items), other) => items.iter().any(|item| matches_value(item, other)),
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

fn compare(stored: &Value, operand: &Value) -> Option<Ordering> {
    match (stored, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(stored: &Value, operand: &Value, ignore_case: bool) -> bool {
    let (Some(haystack), Some(needle)) = (stored.as_str(), operand.as_str()) else {
        return false;
    };
    if ignore_case {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    }
}

impl RemoteStore for MemoryRemote {
    fn server_version(&self) -> Result<ServerVersion, RemoteError> {
        self.enter("server_version", "")?;
        Ok(self.version)
    }

    fn search_ids(
        &self,
        model: &str,
        domain: &[Value],
        options: &SearchOptions,
    ) -> Result<Vec<i64>, RemoteError> {
        self.enter("search_ids", model)?;
        let state = lock(&self.state);
        let mut ids = state.search(model, domain)?;

        if let Some(order) = options.order.as_deref().filter(|order| !order.trim().is_empty()) {
            let mut clause = order.split(',').next().unwrap_or_default().split_whitespace();
            let field = clause.next().unwrap_or("id").to_string();
            let descending = clause.next().is_some_and(|dir| dir.eq_ignore_ascii_case("desc"));
            let data = state.model(model)?;
            let key = |id: &i64| -> Value {
                if field == "id" {
                    json!(id)
                } else {
                    data.records
                        .get(id)
                        .and_then(|record| record.get(&field))
                        .cloned()
                        .unwrap_or(Value::Bool(false))
                }
            };
            ids.sort_by(|a, b| {
                let ordering = compare(&key(a), &key(b)).unwrap_or(Ordering::Equal);
                if descending { ordering.reverse() } else { ordering }
            });
        }

        let offset = options.offset.unwrap_or(0) as usize;
        let limit = options.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(ids.into_iter().skip(offset).take(limit).collect())
    }

    fn search_count(&self, model: &str, domain: &[Value]) -> Result<u64, RemoteError> {
        self.enter("search_count", model)?;
        let ids = lock(&self.state).search(model, domain)?;
        Ok(ids.len() as u64)
    }

    fn read_fields(
        &self,
        model: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<WireRecord>, RemoteError> {
        self.enter("read_fields", model)?;
        let state = lock(&self.state);
        ids.iter().map(|id| state.read(model, *id, fields)).collect()
    }

    fn field_schemas(&self, model: &str, filter_names: &[String]) -> Result<WireRecord, RemoteError> {
        self.enter("field_schemas", model)?;
        let state = lock(&self.state);
        let fields = &state.model(model)?.fields;
        Ok(fields
            .iter()
            .filter(|(name, _)| filter_names.is_empty() || filter_names.contains(name))
            .map(|(name, attrs)| (name.clone(), attrs.clone()))
            .collect())
    }

    fn import_legacy(
        &self,
        model: &str,
        fields: &[String],
        rows: &[Vec<Value>],
    ) -> Result<LegacyImportOutcome, RemoteError> {
        self.enter("import_legacy", model)?;
        let response = match self.import_rows("import_legacy", model, fields, rows)? {
            Ok(ids) => json!([ids.len(), 0, false, false]),
            Err((row, message)) => json!([-1, row, format!("Line {}: {message}", row + 1), ""]),
        };
        LegacyImportOutcome::from_wire(&response)
    }

    fn load(
        &self,
        model: &str,
        fields: &[String],
        rows: &[Vec<Value>],
    ) -> Result<LoadOutcome, RemoteError> {
        self.enter("load", model)?;
        let response = match self.import_rows("load", model, fields, rows)? {
            Ok(ids) => json!({"ids": ids, "messages": []}),
            Err((row, message)) => json!({
                "ids": false,
                "messages": [{"type": "error", "record": row, "message": message}],
            }),
        };
        LoadOutcome::from_wire(&response)
    }

    fn create(&self, model: &str, values: &WireRecord) -> Result<i64, RemoteError> {
        self.enter("create", model)?;
        lock(&self.state).create(model, values)
    }

    fn write(&self, model: &str, id: i64, values: &WireRecord) -> Result<bool, RemoteError> {
        self.enter("write", model)?;
        lock(&self.state).write(model, id, values)?;
        Ok(true)
    }

    fn unlink(&self, model: &str, ids: &[i64]) -> Result<bool, RemoteError> {
        self.enter("unlink", model)?;
        let mut state = lock(&self.state);
        let data = state.model_mut(model)?;
        if let Some(missing) = ids.iter().find(|id| !data.records.contains_key(id)) {
            return Err(RemoteError::RecordNotFound {
                model: model.to_string(),
                id: *missing,
            });
        }
        for id in ids {
            data.records.remove(id);
        }
        Ok(true)
    }

    fn call_function(
        &self,
        model: &str,
        function: &str,
        params: &[Value],
    ) -> Result<Value, RemoteError> {
        self.enter("call_function", model)?;
        let handler = lock(&self.functions)
            .get(&(model.to_string(), function.to_string()))
            .cloned()
            .ok_or_else(|| RemoteError::UnknownFunction {
                model: model.to_string(),
                function: function.to_string(),
            })?;
        handler(params)
    }

    fn resolve_display_names(
        &self,
        model: &str,
        ids: &[i64],
    ) -> Result<Vec<(i64, String)>, RemoteError> {
        self.enter("resolve_display_names", model)?;
        let state = lock(&self.state);
        state.model(model)?;
        ids.iter()
            .map(|id| {
                if state.exists(model, *id) {
                    Ok((*id, state.display_name(model, *id)))
                } else {
                    Err(RemoteError::RecordNotFound {
                        model: model.to_string(),
                        id: *id,
                    })
                }
            })
            .collect()
    }

    fn exec_workflow_signal(&self, model: &str, signal: &str, id: i64) -> Result<(), RemoteError> {
        self.enter("exec_workflow_signal", model)?;
        let mut state = lock(&self.state);
        if !state.exists(model, id) {
            state.model(model)?;
            return Err(RemoteError::RecordNotFound {
                model: model.to_string(),
                id,
            });
        }
        state
            .fired_signals
            .push((model.to_string(), signal.to_string(), id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> MemoryRemote {
        let remote = MemoryRemote::new(ServerVersion::new(8, 0));
        remote.define_model(
            "res.partner.category",
            json!({"name": {"type": "char", "required": true}}),
        );
        remote.define_model(
            "res.partner",
            json!({
                "name": {"type": "char", "required": true},
                "age": {"type": "integer"},
                "parent_id": {"type": "many2one", "relation": "res.partner"},
                "category_id": {"type": "many2many", "relation": "res.partner.category"},
                "state": {"type": "selection", "selection": [["draft", "Draft"], ["done", "Done"]]},
            }),
        );
        remote
    }

    #[test]
    fn defined_models_are_registered() {
        let remote = remote();
        let ids = remote
            .search_ids("ir.model", &[json!(["model", "=", "res.partner"])], &SearchOptions::default())
            .unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn domain_operators_follow_prefix_notation() {
        let remote = remote();
        for (name, age) in [("a", 10), ("b", 20), ("c", 30)] {
            remote.insert("res.partner", json!({"name": name, "age": age})).unwrap();
        }
        let opts = SearchOptions::default();
        let or = remote
            .search_ids(
                "res.partner",
                &[json!("|"), json!(["name", "=", "a"]), json!(["age", ">", 25])],
                &opts,
            )
            .unwrap();
        assert_eq!(or, vec![1, 3]);

        let not = remote
            .search_ids("res.partner", &[json!("!"), json!(["name", "in", ["a", "b"]])], &opts)
            .unwrap();
        assert_eq!(not, vec![3]);

        let implicit_and = remote
            .search_ids(
                "res.partner",
                &[json!(["age", ">=", 10]), json!(["name", "ilike", "B"])],
                &opts,
            )
            .unwrap();
        assert_eq!(implicit_and, vec![2]);
    }

    #[test]
    fn order_offset_and_limit_apply() {
        let remote = remote();
        for (name, age) in [("a", 10), ("b", 30), ("c", 20)] {
            remote.insert("res.partner", json!({"name": name, "age": age})).unwrap();
        }
        let options = SearchOptions {
            offset: Some(1),
            limit: Some(1),
            order: Some("age desc".to_string()),
        };
        assert_eq!(remote.search_ids("res.partner", &[], &options).unwrap(), vec![3]);
    }

    #[test]
    fn many2one_reads_as_id_name_pair() {
        let remote = remote();
        let parent = remote.insert("res.partner", json!({"name": "Parent"})).unwrap();
        let child = remote
            .insert("res.partner", json!({"name": "Child", "parent_id": parent}))
            .unwrap();
        let rows = remote
            .read_fields("res.partner", &[child], &["parent_id".to_string(), "age".to_string()])
            .unwrap();
        assert_eq!(rows[0].get("parent_id"), Some(&json!([parent, "Parent"])));
        assert_eq!(rows[0].get("age"), Some(&json!(false)));
    }

    #[test]
    fn create_enforces_required_fields() {
        let remote = remote();
        let err = remote.create("res.partner", &Map::new()).unwrap_err();
        assert!(matches!(err, RemoteError::Fault { .. }));
    }

    #[test]
    fn failed_import_leaves_no_partial_rows() {
        let remote = remote();
        let fields = vec![".id".to_string(), "name".to_string(), "state".to_string()];
        let rows = vec![
            vec![json!(0), json!("ok"), json!("Draft")],
            vec![json!(0), json!("bad"), json!("Nope")],
        ];
        let outcome = remote.import_legacy("res.partner", &fields, &rows).unwrap();
        assert_eq!(outcome.committed, -1);
        assert_eq!(outcome.failing_row, 1);
        assert!(outcome.message.starts_with("Line 2: "));
        assert_eq!(remote.record_count("res.partner"), 0);

        let outcome = remote.import_legacy("res.partner", &fields, &rows[..1]).unwrap();
        assert_eq!(outcome.committed, 1);
        assert_eq!(outcome.message, "");
    }

    #[test]
    fn load_reports_ids_or_row_messages() {
        let remote = remote();
        let fields = vec!["name".to_string(), "age".to_string()];
        let rows = vec![
            vec![json!("a"), json!("10")],
            vec![json!("b"), json!("20")],
        ];
        assert_eq!(
            remote.load("res.partner", &fields, &rows).unwrap(),
            LoadOutcome::Loaded(vec![1, 2])
        );

        let rows = vec![vec![json!("c"), json!("ten")]];
        let LoadOutcome::Rejected(messages) = remote.load("res.partner", &fields, &rows).unwrap() else {
            panic!("load should be rejected");
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].get("record"), Some(&json!(0)));
        assert_eq!(messages[0].get("type"), Some(&json!("error")));
        assert_eq!(remote.record_count("res.partner"), 2);
    }

    #[test]
    fn injected_faults_fail_calls() {
        let remote = remote();
        remote.inject_fault("unlink", "access denied");
        let err = remote.unlink("res.partner", &[1]).unwrap_err();
        assert_eq!(err.to_string(), "remote fault 1: access denied");
        assert_eq!(remote.call_count("unlink", "res.partner"), 1);
    }
}
