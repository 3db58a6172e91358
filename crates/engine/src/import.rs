//! Bulk import: reconciles a batch of rows against the remote bulk-write
//! endpoint of either protocol generation.

use std::sync::Arc;

use erpbridge_core::marshal;
use erpbridge_core::{FieldType, FieldValue, Row, Schema};
use erpbridge_remote::{LoadOutcome, RemoteStore, WireRecord};
use serde_json::Value;

use crate::config::ProtocolGeneration;
use crate::error::EngineError;
use crate::relation_names::RelationNames;

/// Column name of the row's own database id.
pub const ID_COLUMN: &str = ".id";

/// Field list plus positional row matrix, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBatch {
    pub fields: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ImportBatch {
    /// Drops the leading `.id` column.
    fn without_id_column(mut self) -> Self {
        if self.fields.first().is_some_and(|field| field == ID_COLUMN) {
            self.fields.remove(0);
            for row in &mut self.rows {
                if !row.is_empty() {
                    row.remove(0);
                }
            }
        }
        self
    }
}

/// One generation of the remote bulk-write interface.
pub trait ImportProtocol: Send + Sync {
    fn generation(&self) -> ProtocolGeneration;

    /// Whether creates and updates must travel in separate calls.
    fn splits_new_rows(&self) -> bool;

    /// Sends one projected batch and applies the outcome to `rows`.
    fn dispatch(
        &self,
        remote: &dyn RemoteStore,
        model: &str,
        batch: ImportBatch,
        rows: &mut [&mut Row],
    ) -> Result<(), EngineError>;
}

pub fn protocol(generation: ProtocolGeneration) -> Arc<dyn ImportProtocol> {
    match generation {
        ProtocolGeneration::Legacy => Arc::new(LegacyImport),
        ProtocolGeneration::Current => Arc::new(LoadImport),
    }
}

/// `import_data`: reports a commit count, never the generated ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyImport;

impl ImportProtocol for LegacyImport {
    fn generation(&self) -> ProtocolGeneration {
        ProtocolGeneration::Legacy
    }

    fn splits_new_rows(&self) -> bool {
        false
    }

    fn dispatch(
        &self,
        remote: &dyn RemoteStore,
        model: &str,
        batch: ImportBatch,
        _rows: &mut [&mut Row],
    ) -> Result<(), EngineError> {
        let outcome = remote.import_legacy(model, &batch.fields, &batch.rows)?;
        // The server stops at the first bad row; later rows are not reported.
        if outcome.committed != batch.rows.len() as i64 {
            tracing::warn!(
                model,
                committed = outcome.committed,
                row = outcome.failing_row,
                "legacy import rejected"
            );
            return Err(EngineError::ImportRejected {
                message: outcome.message,
                row: outcome.failing_row,
            });
        }
        Ok(())
    }
}

/// `load`: returns generated ids in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadImport;

impl ImportProtocol for LoadImport {
    fn generation(&self) -> ProtocolGeneration {
        ProtocolGeneration::Current
    }

    fn splits_new_rows(&self) -> bool {
        true
    }

    fn dispatch(
        &self,
        remote: &dyn RemoteStore,
        model: &str,
        batch: ImportBatch,
        rows: &mut [&mut Row],
    ) -> Result<(), EngineError> {
        // New rows carry no id; an existing-row batch keeps it so the server updates.
        let batch = if rows.first().is_some_and(|row| row.id() == 0) {
            batch.without_id_column()
        } else {
            batch
        };

        let ids = match remote.load(model, &batch.fields, &batch.rows)? {
            LoadOutcome::Loaded(ids) => ids,
            LoadOutcome::Rejected(messages) => {
                tracing::warn!(model, messages = messages.len(), "load rejected");
                return Err(EngineError::LoadRejected(join_messages(&messages)));
            }
        };
        if ids.len() != rows.len() {
            return Err(EngineError::LoadRejected(format!(
                "expected {} ids, server returned {}",
                rows.len(),
                ids.len()
            )));
        }
        for (row, id) in rows.iter_mut().zip(ids) {
            row.set_id(id);
            row.commit();
        }
        Ok(())
    }
}

/// One `key:value` line per message entry.
fn join_messages(messages: &[WireRecord]) -> String {
    messages
        .iter()
        .flat_map(|message| message.iter())
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}:{text}"),
            other => format!("{key}:{other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drives one top-level `import_data` call, recursive partitions included.
pub struct ImportCoordinator<'a> {
    remote: &'a dyn RemoteStore,
    model: &'a str,
    protocol: &'a dyn ImportProtocol,
    names: RelationNames,
}

impl<'a> ImportCoordinator<'a> {
    pub fn new(remote: &'a dyn RemoteStore, model: &'a str, protocol: &'a dyn ImportProtocol) -> Self {
        Self {
            remote,
            model,
            protocol,
            names: RelationNames::new(),
        }
    }

    pub fn run(mut self, rows: &mut [Row]) -> Result<bool, EngineError> {
        let mut refs: Vec<&mut Row> = rows.iter_mut().collect();
        self.import(&mut refs)
    }

    fn import(&mut self, rows: &mut [&mut Row]) -> Result<bool, EngineError> {
        if rows.is_empty() {
            return Ok(true);
        }
        if self.protocol.splits_new_rows() {
            let (mut existing, mut new): (Vec<&mut Row>, Vec<&mut Row>) =
                rows.iter_mut().map(|row| &mut **row).partition(|row| row.id() != 0);
            if !existing.is_empty() && !new.is_empty() {
                return Ok(self.import(&mut existing)? && self.import(&mut new)?);
            }
        }

        let schema = Arc::clone(rows[0].schema());
        let mut matrix = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            matrix.push(self.project(row, &schema)?);
        }
        let batch = ImportBatch {
            fields: field_list(&schema),
            rows: matrix,
        };
        tracing::info!(
            model = self.model,
            rows = rows.len(),
            generation = ?self.protocol.generation(),
            "dispatching import"
        );
        self.protocol.dispatch(self.remote, self.model, batch, rows)?;
        Ok(true)
    }

    /// Positional row: id first, then one cell per declared field in schema order.
    fn project(&mut self, row: &Row, schema: &Schema) -> Result<Vec<Value>, EngineError> {
        let mut cells = Vec::with_capacity(schema.len() + 1);
        cells.push(Value::from(row.id()));
        for field in schema {
            let value = row.get(&field.name).unwrap_or(&FieldValue::Null);
            let cell = match field.field_type {
                FieldType::Many2One => Value::from(marshal::record_id(field, value)?),
                _ if value.is_null() => Value::Bool(false),
                FieldType::Selection => {
                    Value::String(marshal::resolve_selection(field, value)?.label.clone())
                }
                FieldType::Many2Many => {
                    Value::String(self.names.display_names(self.remote, field, value)?)
                }
                _ => match marshal::write_value(field, value)? {
                    Value::String(text) => Value::String(text),
                    other => Value::String(other.to_string()),
                },
            };
            cells.push(cell);
        }
        Ok(cells)
    }
}

/// `.id` followed by the field names, many2one columns marked as foreign ids.
pub fn field_list(schema: &Schema) -> Vec<String> {
    std::iter::once(ID_COLUMN.to_string())
        .chain(schema.iter().map(|field| match field.field_type {
            FieldType::Many2One => format!("{}.id", field.name),
            _ => field.name.clone(),
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpbridge_core::FieldSchema;
    use erpbridge_remote::{MemoryRemote, ServerVersion};
    use serde_json::json;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            FieldSchema::new("name", FieldType::Char),
            FieldSchema::new("parent_id", FieldType::Many2One).with_relation("res.partner"),
            FieldSchema::new("state", FieldType::Selection)
                .with_selection(&[("draft", "Draft"), ("done", "Done")]),
            FieldSchema::new("category_id", FieldType::Many2Many)
                .with_relation("res.partner.category"),
            FieldSchema::new("age", FieldType::Integer),
        ]))
    }

    fn remote() -> MemoryRemote {
        let remote = MemoryRemote::new(ServerVersion::new(8, 0));
        remote.define_model("res.partner.category", json!({"name": {"type": "char"}}));
        remote.define_model(
            "res.partner",
            json!({
                "name": {"type": "char", "required": true},
                "parent_id": {"type": "many2one", "relation": "res.partner"},
                "state": {"type": "selection", "selection": [["draft", "Draft"], ["done", "Done"]]},
                "category_id": {"type": "many2many", "relation": "res.partner.category"},
                "age": {"type": "integer"},
            }),
        );
        remote.insert("res.partner.category", json!({"name": "Retail"})).unwrap();
        remote.insert("res.partner.category", json!({"name": "VIP"})).unwrap();
        remote
    }

    fn row(schema: &Arc<Schema>, name: &str) -> Row {
        let mut row = Row::new(Arc::clone(schema));
        row.put("name", name).unwrap();
        row
    }

    #[test]
    fn field_list_marks_many2one_columns() {
        assert_eq!(
            field_list(&schema()),
            vec![".id", "name", "parent_id.id", "state", "category_id", "age"]
        );
    }

    #[test]
    fn projection_uses_labels_and_display_names() {
        let remote = remote();
        let schema = schema();
        let mut row = row(&schema, "Acme");
        row.put("state", "draft").unwrap();
        row.put("category_id", vec![2_i64, 1]).unwrap();
        row.put("age", 41.0).unwrap();

        let mut coordinator = ImportCoordinator::new(&remote, "res.partner", &LoadImport);
        let cells = coordinator.project(&row, &schema).unwrap();
        assert_eq!(
            cells,
            vec![
                json!(0),
                json!("Acme"),
                json!(0),
                json!("Draft"),
                json!("VIP,Retail"),
                json!("41"),
            ]
        );
    }

    #[test]
    fn unknown_selection_fails_before_any_remote_call() {
        let remote = remote();
        let schema = schema();
        let mut rows = vec![row(&schema, "Acme")];
        rows[0].put("state", "archived").unwrap();
        remote.clear_calls();

        let err = ImportCoordinator::new(&remote, "res.partner", &LoadImport)
            .run(&mut rows)
            .unwrap_err();
        assert!(matches!(err, EngineError::Core(_)));
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn load_assigns_ids_in_order_and_commits() {
        let remote = remote();
        let schema = schema();
        let mut rows = vec![row(&schema, "a"), row(&schema, "b")];

        let ok = ImportCoordinator::new(&remote, "res.partner", &LoadImport)
            .run(&mut rows)
            .unwrap();
        assert!(ok);
        assert_eq!(rows[0].id(), 1);
        assert_eq!(rows[1].id(), 2);
        assert!(rows.iter().all(|row| row.changed_fields().is_empty()));
        assert!(remote.record("res.partner", 2).is_some());
    }

    #[test]
    fn load_rejection_joins_messages() {
        let remote = remote();
        let schema = schema();
        let mut rows = vec![Row::new(Arc::clone(&schema))];

        let err = ImportCoordinator::new(&remote, "res.partner", &LoadImport)
            .run(&mut rows)
            .unwrap_err();
        let EngineError::LoadRejected(message) = err else {
            panic!("expected load rejection, got {err:?}");
        };
        assert!(message.contains("type:error"));
        assert!(message.contains("Missing required value"));
        assert_eq!(rows[0].id(), 0);
    }

    #[test]
    fn legacy_rejection_carries_failing_row() {
        let remote = remote();
        let schema = schema();
        let mut rows = vec![row(&schema, "ok"), Row::new(Arc::clone(&schema))];

        let err = ImportCoordinator::new(&remote, "res.partner", &LegacyImport)
            .run(&mut rows)
            .unwrap_err();
        let EngineError::ImportRejected { row, .. } = err else {
            panic!("expected import rejection, got {err:?}");
        };
        assert_eq!(row, 1);
        assert_eq!(remote.record_count("res.partner"), 0);
    }

    #[test]
    fn legacy_success_leaves_ids_untouched() {
        let remote = remote();
        let schema = schema();
        let mut rows = vec![row(&schema, "a")];
        assert!(
            ImportCoordinator::new(&remote, "res.partner", &LegacyImport)
                .run(&mut rows)
                .unwrap()
        );
        assert_eq!(rows[0].id(), 0);
        assert_eq!(remote.record_count("res.partner"), 1);
        assert_eq!(remote.call_count("import_legacy", "res.partner"), 1);
    }

    #[test]
    fn empty_batch_makes_no_call() {
        let remote = remote();
        remote.clear_calls();
        let ok = ImportCoordinator::new(&remote, "res.partner", &LoadImport)
            .run(&mut [])
            .unwrap();
        assert!(ok);
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn messages_render_as_key_value_lines() {
        let messages = vec![
            json!({"message": "bad", "record": 2}).as_object().cloned().unwrap(),
        ];
        assert_eq!(join_messages(&messages), "message:bad\nrecord:2");
    }
}
