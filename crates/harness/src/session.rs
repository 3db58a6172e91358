use std::sync::Arc;

use erpbridge_core::Row;
use erpbridge_engine::{EngineError, LookupCache, ObjectAdapter, Session, SessionConfig};
use erpbridge_remote::{MemoryRemote, ServerVersion};

use crate::fixtures::{self, PARTNER};

/// A session over a freshly seeded in-memory store.
pub struct TestSession {
    pub remote: Arc<MemoryRemote>,
    pub session: Session,
}

impl TestSession {
    /// Server speaking the `load` protocol.
    pub fn current() -> Result<Self, EngineError> {
        Self::with_config(ServerVersion::new(8, 0), SessionConfig::default())
    }

    /// Server speaking only the legacy `import_data` protocol.
    pub fn legacy() -> Result<Self, EngineError> {
        Self::with_config(ServerVersion::new(6, 1), SessionConfig::default())
    }

    pub fn with_config(version: ServerVersion, config: SessionConfig) -> Result<Self, EngineError> {
        let remote = fixtures::seeded_remote(version)?;
        let session = Session::connect(remote.clone(), config)?;
        Ok(Self { remote, session })
    }

    /// Another session against the same store, sharing `cache`.
    pub fn sibling(&self, cache: Arc<LookupCache>) -> Result<Session, EngineError> {
        Session::with_cache(self.remote.clone(), cache, self.session.config().clone())
    }

    pub fn adapter(&self, model: &str) -> Result<ObjectAdapter, EngineError> {
        self.session.adapter(model)
    }

    pub fn partners(&self) -> Result<ObjectAdapter, EngineError> {
        self.adapter(PARTNER)
    }

    /// Unsaved partner row with only `name` set.
    pub fn new_partner(&self, partners: &ObjectAdapter, name: &str) -> Result<Row, EngineError> {
        let mut row = partners.new_row::<&str>(&[])?;
        row.put("name", name)?;
        Ok(row)
    }
}
