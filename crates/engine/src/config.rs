use erpbridge_remote::ServerVersion;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// First server major version that speaks the `load` bulk protocol.
const LOAD_PROTOCOL_MAJOR: u32 = 7;

/// Generation of the remote bulk-write interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolGeneration {
    /// `import_data`: returns a commit count and never reports generated ids.
    Legacy,
    /// `load`: returns generated ids, does not mix creates and updates.
    Current,
}

impl ProtocolGeneration {
    pub fn for_server(version: ServerVersion) -> Self {
        if version.major >= LOAD_PROTOCOL_MAJOR {
            ProtocolGeneration::Current
        } else {
            ProtocolGeneration::Legacy
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Forces a protocol instead of deriving it from the server version.
    pub protocol: Option<ProtocolGeneration>,
    pub min_server_major: Option<u32>,
    pub max_server_major: Option<u32>,
    /// Used by `search_and_read` when the caller passes no limit.
    pub default_limit: Option<u32>,
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn check_server(&self, version: ServerVersion) -> Result<(), EngineError> {
        if let Some(min) = self.min_server_major
            && version.major < min
        {
            return Err(EngineError::UnsupportedServer {
                version,
                reason: format!("minimum supported major version is {min}"),
            });
        }
        if let Some(max) = self.max_server_major
            && version.major > max
        {
            return Err(EngineError::UnsupportedServer {
                version,
                reason: format!("maximum supported major version is {max}"),
            });
        }
        Ok(())
    }

    pub fn protocol_for(&self, version: ServerVersion) -> ProtocolGeneration {
        self.protocol
            .unwrap_or_else(|| ProtocolGeneration::for_server(version))
    }
}
