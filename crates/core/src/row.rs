use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::CoreError;
use crate::field::{FieldSchema, FieldType, Schema};
use crate::field_value::FieldValue;

/// Called synchronously, in registration order, after a field value changes.
pub type RowListener = Box<dyn FnMut(&FieldSchema, &Row) + Send>;

/// One remote record: values keyed by declared field name, plus change tracking.
pub struct Row {
    id: i64,
    values: BTreeMap<String, FieldValue>,
    changed: Vec<String>,
    schema: Arc<Schema>,
    listeners: Vec<RowListener>,
}

impl Row {
    /// Empty row: id 0 and every declared field null.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema
            .iter()
            .map(|field| (field.name.clone(), FieldValue::Null))
            .collect();
        Self {
            id: 0,
            values,
            changed: Vec::new(),
            schema,
            listeners: Vec::new(),
        }
    }

    /// Row hydrated from already-converted values. Keys with no declared field are dropped.
    pub fn with_values(schema: Arc<Schema>, id: i64, values: BTreeMap<String, FieldValue>) -> Self {
        let values = values
            .into_iter()
            .filter(|(name, _)| schema.contains(name))
            .collect();
        Self {
            id,
            values,
            changed: Vec::new(),
            schema,
            listeners: Vec::new(),
        }
    }

    /// Copies values and schema. The copy starts with no changes and no listeners.
    pub fn from_template(template: &Row) -> Self {
        Self {
            id: template.id,
            values: template.values.clone(),
            changed: Vec::new(),
            schema: Arc::clone(&template.schema),
            listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Sets the record id. The id is never part of the change-set.
    pub fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Current value of a declared field; `None` when the field is unknown.
    pub fn get(&self, field_name: &str) -> Option<&FieldValue> {
        if !self.schema.contains(field_name) {
            return None;
        }
        Some(self.values.get(field_name).unwrap_or(&FieldValue::Null))
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn on_change(&mut self, listener: RowListener) {
        self.listeners.push(listener);
    }

    /// Sets a field value.
    ///
    /// `id` is accepted as a pseudo-field. One2Many values are stored as the
    /// `(value, null)` command pair, and a value already in that shape is kept
    /// as is. Setting the current value again is a no-op.
    pub fn put(&mut self, field_name: &str, value: impl Into<FieldValue>) -> Result<(), CoreError> {
        let value = value.into();
        if field_name == "id" {
            self.id = match &value {
                FieldValue::Null => 0,
                other => other.as_id().ok_or_else(|| CoreError::InvalidInteger {
                    field: "id".to_string(),
                    value: other.to_string(),
                })?,
            };
            return Ok(());
        }

        let schema = Arc::clone(&self.schema);
        let field = schema
            .get(field_name)
            .ok_or_else(|| CoreError::UnknownField(field_name.to_string()))?;

        let value = if field.field_type == FieldType::One2Many {
            one2many_pair(value)
        } else {
            value
        };

        if self.values.get(field_name).unwrap_or(&FieldValue::Null) == &value {
            return Ok(());
        }

        self.values.insert(field_name.to_string(), value);
        if !self.changed.iter().any(|name| name == field_name) {
            self.changed.push(field_name.to_string());
        }

        let mut listeners = std::mem::take(&mut self.listeners);
        for listener in &mut listeners {
            listener(field, self);
        }
        self.listeners = listeners;
        Ok(())
    }

    /// Replaces or extends a many2many id list, dropping duplicates.
    pub fn put_many2many(&mut self, field_name: &str, ids: &[i64], append: bool) -> Result<(), CoreError> {
        let field = self
            .schema
            .get(field_name)
            .ok_or_else(|| CoreError::UnknownField(field_name.to_string()))?;
        if field.field_type != FieldType::Many2Many {
            return Err(CoreError::NotMany2Many(field_name.to_string()));
        }

        let mut merged: Vec<i64> = Vec::new();
        if append {
            let current = self.values.get(field_name).and_then(FieldValue::as_list);
            merged.extend(current.into_iter().flatten().filter_map(FieldValue::as_id));
        }
        for id in ids {
            if !merged.contains(id) {
                merged.push(*id);
            }
        }
        self.put(field_name, merged)
    }

    /// Fields changed since the last commit, in the order they were first changed.
    pub fn changed_fields(&self) -> Vec<&FieldSchema> {
        self.changed
            .iter()
            .filter_map(|name| self.schema.get(name))
            .collect()
    }

    pub fn is_changed(&self, field_name: &str) -> bool {
        self.changed.iter().any(|name| name == field_name)
    }

    /// Marks the current values as written to the remote store.
    pub fn commit(&mut self) {
        self.changed.clear();
    }
}

/// Null stays null so an unset one2many field compares equal to a fresh one.
fn one2many_pair(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Null => FieldValue::Null,
        FieldValue::List(items) if items.len() == 2 && items[1].is_null() => FieldValue::List(items),
        other => FieldValue::List(vec![other, FieldValue::Null]),
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("id", &self.id)
            .field("values", &self.values)
            .field("changed", &self.changed)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
