//! Process-wide lookup caches for model names and workflow signals.
//!
//! A miss clears and rebuilds the whole set. Rebuilds run inside a per-cache
//! critical section and re-check after acquiring it, so concurrent misses on
//! the same name collapse into a single remote round trip.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use erpbridge_remote::{RemoteStore, SearchOptions};
use serde_json::Value;

use crate::error::EngineError;

const MODEL_REGISTRY: &str = "ir.model";
const WORKFLOW: &str = "workflow";
const WORKFLOW_TRANSITION: &str = "workflow.transition";

#[derive(Debug, Default)]
pub struct LookupCache {
    models: RwLock<HashSet<String>>,
    signals: RwLock<HashSet<String>>,
    model_refresh: Mutex<()>,
    signal_refresh: Mutex<()>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(model)
    }

    pub fn has_signal(&self, model: &str, signal: &str) -> bool {
        self.signals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&signal_key(model, signal))
    }

    /// Succeeds if `model` is known to the remote store, rebuilding the cache on a miss.
    pub fn ensure_model(&self, remote: &dyn RemoteStore, model: &str) -> Result<(), EngineError> {
        if self.has_model(model) {
            return Ok(());
        }
        let _guard = self
            .model_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.has_model(model) {
            return Ok(());
        }

        let names = fetch_models(remote)?;
        tracing::debug!(entries = names.len(), missing = model, "model cache repopulated");
        *self.models.write().unwrap_or_else(PoisonError::into_inner) = names;

        if self.has_model(model) {
            Ok(())
        } else {
            Err(EngineError::ModelNotFound(model.to_string()))
        }
    }

    /// Succeeds if `signal` is a workflow transition of `model`, rebuilding the cache on a miss.
    pub fn ensure_signal(
        &self,
        remote: &dyn RemoteStore,
        model: &str,
        signal: &str,
    ) -> Result<(), EngineError> {
        if self.has_signal(model, signal) {
            return Ok(());
        }
        let _guard = self
            .signal_refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.has_signal(model, signal) {
            return Ok(());
        }

        let keys = fetch_signals(remote)?;
        tracing::debug!(entries = keys.len(), model, signal, "signal cache repopulated");
        *self.signals.write().unwrap_or_else(PoisonError::into_inner) = keys;

        if self.has_signal(model, signal) {
            Ok(())
        } else {
            Err(EngineError::SignalNotFound {
                model: model.to_string(),
                signal: signal.to_string(),
            })
        }
    }
}

fn signal_key(model: &str, signal: &str) -> String {
    format!("{model}#{signal}")
}

fn fetch_models(remote: &dyn RemoteStore) -> Result<HashSet<String>, EngineError> {
    let ids = remote.search_ids(MODEL_REGISTRY, &[], &SearchOptions::default())?;
    let records = remote.read_fields(MODEL_REGISTRY, &ids, &["model".to_string()])?;
    Ok(records
        .iter()
        .filter_map(|record| record.get("model").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Keys every transition signal by the model its workflow runs on.
fn fetch_signals(remote: &dyn RemoteStore) -> Result<HashSet<String>, EngineError> {
    let ids = remote.search_ids(WORKFLOW_TRANSITION, &[], &SearchOptions::default())?;
    let transitions = remote.read_fields(
        WORKFLOW_TRANSITION,
        &ids,
        &["signal".to_string(), "wkf_id".to_string()],
    )?;

    let mut by_workflow: BTreeMap<i64, Vec<String>> = BTreeMap::new();
    for transition in &transitions {
        let Some(signal) = transition.get("signal").and_then(Value::as_str) else {
            continue;
        };
        let workflow_id = match transition.get("wkf_id") {
            Some(Value::Array(pair)) => pair.first().and_then(Value::as_i64),
            Some(other) => other.as_i64(),
            None => None,
        };
        if let Some(workflow_id) = workflow_id {
            by_workflow
                .entry(workflow_id)
                .or_default()
                .push(signal.to_string());
        }
    }
    if by_workflow.is_empty() {
        return Ok(HashSet::new());
    }

    let workflow_ids: Vec<i64> = by_workflow.keys().copied().collect();
    let workflows = remote.read_fields(WORKFLOW, &workflow_ids, &["osv".to_string()])?;
    let mut keys = HashSet::new();
    for workflow in &workflows {
        let (Some(id), Some(model)) = (
            workflow.get("id").and_then(Value::as_i64),
            workflow.get("osv").and_then(Value::as_str),
        ) else {
            continue;
        };
        for signal in by_workflow.get(&id).into_iter().flatten() {
            keys.insert(signal_key(model, signal));
        }
    }
    Ok(keys)
}
