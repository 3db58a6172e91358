use std::collections::HashMap;
use std::collections::hash_map::Entry;

use erpbridge_core::marshal;
use erpbridge_core::{FieldSchema, FieldValue};
use erpbridge_remote::{RemoteStore, SearchOptions};

use crate::error::EngineError;

/// Display names of relation records, loaded once per relation model.
///
/// Scoped to a single bulk import so renamed records are never served stale
/// across batches.
#[derive(Debug, Default)]
pub struct RelationNames {
    names: HashMap<String, HashMap<i64, String>>,
}

impl RelationNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrites a many2many value (id list or comma-separated ids) as comma-joined display names.
    pub fn display_names(
        &mut self,
        remote: &dyn RemoteStore,
        field: &FieldSchema,
        value: &FieldValue,
    ) -> Result<String, EngineError> {
        let ids = marshal::record_ids(field, value)?;
        let names = self.names_for(remote, &field.relation)?;
        let resolved = ids
            .iter()
            .map(|id| {
                names
                    .get(id)
                    .map(String::as_str)
                    .ok_or_else(|| EngineError::RelationNotFound {
                        relation: field.relation.clone(),
                        id: *id,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(resolved.join(","))
    }

    fn names_for(
        &mut self,
        remote: &dyn RemoteStore,
        relation: &str,
    ) -> Result<&HashMap<i64, String>, EngineError> {
        match self.names.entry(relation.to_string()) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                let ids = remote.search_ids(relation, &[], &SearchOptions::default())?;
                let names: HashMap<i64, String> =
                    remote.resolve_display_names(relation, &ids)?.into_iter().collect();
                tracing::debug!(relation, entries = names.len(), "relation names loaded");
                Ok(&*entry.insert(names))
            }
        }
    }
}
