//! Catalog client
//!
//! Retrieves the reference tool description and the asset catalog of a
//! repository branch. Both are required for a run, so any failure here is
//! returned to the caller instead of being recovered.

use crate::catalog::{Catalog, CatalogParser};
use crate::repository::Repository;
use crate::transport::Transport;
use mapsync_config::{RepositoryConfig, ToolConfig};
use mapsync_types::{Error, Result, ToolMetadata};
use std::sync::Arc;
use tracing::{debug, info};

/// Names of the two text resources in a branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogResources {
    /// Reference tool description
    pub metadata: String,
    /// Asset catalog
    pub catalog: String,
}

impl Default for CatalogResources {
    fn default() -> Self {
        let defaults = RepositoryConfig::default();
        Self {
            metadata: defaults.metadata_resource,
            catalog: defaults.catalog_resource,
        }
    }
}

/// Client for the repository text resources
#[derive(Clone)]
pub struct CatalogClient {
    transport: Arc<dyn Transport>,
    parser: CatalogParser,
    resources: CatalogResources,
}

impl CatalogClient {
    /// Create a client
    pub fn new(
        transport: Arc<dyn Transport>,
        parser: CatalogParser,
        resources: CatalogResources,
    ) -> Self {
        Self {
            transport,
            parser,
            resources,
        }
    }

    /// Create a client from configuration sections
    pub fn from_config(
        transport: Arc<dyn Transport>,
        repository: &RepositoryConfig,
        tool: &ToolConfig,
        artifact_extension: &str,
    ) -> Self {
        let parser = CatalogParser::new(tool.name.as_str())
            .with_column_order(repository.column_order)
            .with_artifact_extension(artifact_extension);
        let resources = CatalogResources {
            metadata: repository.metadata_resource.clone(),
            catalog: repository.catalog_resource.clone(),
        };
        Self::new(transport, parser, resources)
    }

    /// Transport used for every request
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Download and parse the reference tool description
    pub async fn fetch_tool_metadata(&self, repository: &Repository) -> Result<ToolMetadata> {
        let url = repository.resource(&self.resources.metadata);
        debug!("Fetching tool metadata from {}", url);
        let text = self.transport.get_text(&url).await?;

        ToolMetadata::parse(&text).map_err(|e| match e {
            Error::Protocol { message } => Error::protocol(format!("{}: {}", url, message)),
            other => other,
        })
    }

    /// Download and parse the catalog
    pub async fn fetch_catalog(&self, repository: &Repository) -> Result<Catalog> {
        let url = repository.resource(&self.resources.catalog);
        debug!("Fetching catalog from {}", url);
        let text = self.transport.get_text(&url).await?;
        let catalog = self.parser.parse(&text);
        info!(
            "Catalog {} lists {} entries ({} skipped lines)",
            url,
            catalog.len(),
            catalog.issues.len()
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileTransport;
    use mapsync_types::ErrorKind;
    use tempfile::TempDir;

    fn mirror() -> (TempDir, Repository) {
        let dir = TempDir::new().unwrap();
        let branch = dir.path().join("2.3");
        std::fs::create_dir_all(&branch).unwrap();
        std::fs::write(
            branch.join("UFO2MAP"),
            "ufo2map version 2.3.1\nsource hash: 00ff00ff00ff\n",
        )
        .unwrap();
        std::fs::write(
            branch.join("MAPS"),
            "ufo2map 00ff00ff00ff 00ff00ff00ff\nmapB xyz\nmapA abc123 def456\n",
        )
        .unwrap();
        let repo = Repository::new(dir.path().to_str().unwrap(), "2.3");
        (dir, repo)
    }

    fn client() -> CatalogClient {
        CatalogClient::from_config(
            Arc::new(FileTransport::new(1024)),
            &RepositoryConfig::default(),
            &ToolConfig::default(),
            "bsp",
        )
    }

    #[tokio::test]
    async fn test_fetch_tool_metadata() {
        let (_dir, repo) = mirror();
        let meta = client().fetch_tool_metadata(&repo).await.unwrap();
        assert_eq!(meta.version(), "2.3.1");
        assert_eq!(meta.source_hash(), "00ff00ff00ff");
    }

    #[tokio::test]
    async fn test_fetch_catalog() {
        let (_dir, repo) = mirror();
        let catalog = client().fetch_catalog(&repo).await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries[0].name, "mapA");
        assert_eq!(catalog.issues.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_metadata_is_protocol_error() {
        let (dir, repo) = mirror();
        std::fs::write(dir.path().join("2.3").join("UFO2MAP"), "garbage\n").unwrap();
        let err = client().fetch_tool_metadata(&repo).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("UFO2MAP"));
    }

    #[tokio::test]
    async fn test_missing_catalog_is_network_error() {
        let (dir, repo) = mirror();
        std::fs::remove_file(dir.path().join("2.3").join("MAPS")).unwrap();
        let err = client().fetch_catalog(&repo).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
