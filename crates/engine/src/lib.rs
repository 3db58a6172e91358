pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod import;
pub mod relation_names;

pub use adapter::ObjectAdapter;
pub use cache::LookupCache;
pub use config::{ProtocolGeneration, SessionConfig};
pub use error::EngineError;
pub use import::{ImportBatch, ImportCoordinator, ImportProtocol, LegacyImport, LoadImport};
pub use relation_names::RelationNames;

use std::sync::Arc;

use erpbridge_remote::{RemoteStore, ServerVersion};

/// A connected remote store plus the lookup cache and import protocol its adapters share.
pub struct Session {
    remote: Arc<dyn RemoteStore>,
    cache: Arc<LookupCache>,
    config: SessionConfig,
    server_version: ServerVersion,
    import: Arc<dyn ImportProtocol>,
}

impl Session {
    /// Connects with a private lookup cache.
    pub fn connect(remote: Arc<dyn RemoteStore>, config: SessionConfig) -> Result<Self, EngineError> {
        Self::with_cache(remote, Arc::new(LookupCache::new()), config)
    }

    /// Connects sharing `cache` with other sessions of the process.
    pub fn with_cache(
        remote: Arc<dyn RemoteStore>,
        cache: Arc<LookupCache>,
        config: SessionConfig,
    ) -> Result<Self, EngineError> {
        let server_version = remote.server_version()?;
        config.check_server(server_version)?;
        let generation = config.protocol_for(server_version);
        tracing::info!(%server_version, ?generation, "session connected");
        Ok(Self {
            remote,
            cache,
            config,
            server_version,
            import: import::protocol(generation),
        })
    }

    pub fn adapter(&self, model: &str) -> Result<ObjectAdapter, EngineError> {
        ObjectAdapter::new(self, model)
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn cache(&self) -> &Arc<LookupCache> {
        &self.cache
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn server_version(&self) -> ServerVersion {
        self.server_version
    }

    pub fn protocol(&self) -> ProtocolGeneration {
        self.import.generation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erpbridge_remote::{MemoryRemote, RemoteError};

    fn remote(major: u32) -> Arc<MemoryRemote> {
        Arc::new(MemoryRemote::new(ServerVersion::new(major, 0)))
    }

    #[test]
    fn protocol_is_resolved_from_server_version() {
        let legacy = Session::connect(remote(6), SessionConfig::default()).unwrap();
        assert_eq!(legacy.protocol(), ProtocolGeneration::Legacy);

        let current = Session::connect(remote(12), SessionConfig::default()).unwrap();
        assert_eq!(current.protocol(), ProtocolGeneration::Current);
        assert_eq!(current.server_version(), ServerVersion::new(12, 0));
    }

    #[test]
    fn unsupported_server_is_refused() {
        let config = SessionConfig {
            min_server_major: Some(8),
            ..SessionConfig::default()
        };
        let err = Session::connect(remote(6), config).err().unwrap();
        assert!(matches!(err, EngineError::UnsupportedServer { .. }));
    }

    #[test]
    fn transport_failure_surfaces_on_connect() {
        let remote = remote(8);
        remote.inject_fault("server_version", "connection refused");
        let err = Session::connect(remote, SessionConfig::default()).err().unwrap();
        assert!(matches!(err, EngineError::Remote(RemoteError::Fault { .. })));
    }

    #[test]
    fn sessions_can_share_a_cache() {
        let cache = Arc::new(LookupCache::new());
        let remote = remote(8);
        let first = Session::with_cache(remote.clone(), Arc::clone(&cache), SessionConfig::default()).unwrap();
        let second = Session::with_cache(remote.clone(), Arc::clone(&cache), SessionConfig::default()).unwrap();
        first.adapter("workflow").unwrap();
        second.adapter("workflow").unwrap();
        assert_eq!(remote.call_count("search_ids", "ir.model"), 1);
    }
}
