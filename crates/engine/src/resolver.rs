//! Stored-connection resolution.
//!
//! The pipeline addresses databases by connection id; something has to turn
//! that id into a host, credentials included. The trait keeps the engine
//! agnostic about where credentials live; the file-backed implementation
//! reads the connections YAML once at startup.

use std::collections::HashMap;

use async_trait::async_trait;
use vantage_common::models::{ConnectionDescriptor, ConnectionsFile};
use vantage_error::{ErrorCode, ErrorContext, Result, VantageError};

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve a connection id into a full descriptor, credentials included.
    async fn resolve(&self, connection_id: &str) -> Result<ConnectionDescriptor>;

    /// Ids this resolver knows about, for error hints and the stats endpoint.
    fn known_ids(&self) -> Vec<String>;
}

/// Resolver backed by the stored-connections YAML file.
#[derive(Debug)]
pub struct FileCredentialResolver {
    connections: HashMap<String, ConnectionDescriptor>,
}

impl FileCredentialResolver {
    pub fn from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            VantageError::new(
                ErrorCode::InvalidConfig,
                format!("Failed to read connections file '{}': {}", path, e),
            )
            .with_context(ErrorContext::Config {
                file_path: Some(path.to_string()),
                field: None,
            })
        })?;
        let file: ConnectionsFile = serde_yaml::from_str(&text)?;
        Ok(Self::from_connections(file.connections))
    }

    pub fn from_connections(connections: Vec<ConnectionDescriptor>) -> Self {
        let connections = connections
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        Self { connections }
    }
}

#[async_trait]
impl CredentialResolver for FileCredentialResolver {
    async fn resolve(&self, connection_id: &str) -> Result<ConnectionDescriptor> {
        self.connections.get(connection_id).cloned().ok_or_else(|| {
            let mut err = VantageError::new(
                ErrorCode::UnknownConnection,
                format!("Unknown connection '{}'", connection_id),
            )
            .with_context(ErrorContext::Connection {
                connection_id: connection_id.to_string(),
                host: None,
                port: None,
                database: None,
            });
            if let Some(close) =
                vantage_error::find_closest_match(connection_id, &self.known_ids())
            {
                err = err.with_hint(format!("Did you mean '{}'?", close));
            }
            err
        })
    }

    fn known_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vantage_common::models::Dialect;

    fn sales() -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: "sales-db".to_string(),
            host: "db.internal".to_string(),
            port: 5432,
            database: "sales".to_string(),
            username: Some("reader".to_string()),
            password: None,
            dialect: Dialect::Postgres,
        }
    }

    #[tokio::test]
    async fn test_resolves_known_id() {
        let resolver = FileCredentialResolver::from_connections(vec![sales()]);
        let desc = resolver.resolve("sales-db").await.unwrap();
        assert_eq!(desc.host, "db.internal");
    }

    #[tokio::test]
    async fn test_unknown_id_suggests_closest() {
        let resolver = FileCredentialResolver::from_connections(vec![sales()]);
        let err = resolver.resolve("sales_db").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownConnection);
        assert_eq!(err.hint, Some("Did you mean 'sales-db'?".to_string()));
    }

    #[tokio::test]
    async fn test_loads_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "connections:\n  - id: warehouse\n    host: wh.internal\n    database: dw\n    username: reader\n    password: hunter2"
        )
        .unwrap();

        let resolver =
            FileCredentialResolver::from_file(file.path().to_str().unwrap()).unwrap();
        let desc = resolver.resolve("warehouse").await.unwrap();
        assert_eq!(desc.port, 5432);
        assert!(desc.password.is_some());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = FileCredentialResolver::from_file("/does/not/exist.yaml").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfig);
    }
}
