//! Mapping of catalog names onto the local tree

use mapsync_config::SyncConfig;
use std::path::{Path, PathBuf};

/// Where the source, artifact and payload of an asset live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    root: PathBuf,
    source_extension: String,
    artifact_extension: String,
    payload_extension: String,
}

impl AssetLayout {
    /// Layout rooted at `root` with the default `map`/`bsp`/`gz` extensions
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let defaults = SyncConfig::default();
        Self {
            root: root.into(),
            source_extension: defaults.source_extension,
            artifact_extension: defaults.artifact_extension,
            payload_extension: defaults.payload_extension,
        }
    }

    /// Layout described by the sync section
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            root: config.root.clone(),
            source_extension: config.source_extension.clone(),
            artifact_extension: config.artifact_extension.clone(),
            payload_extension: config.payload_extension.clone(),
        }
    }

    /// Override the three extensions
    pub fn with_extensions(
        mut self,
        source: impl Into<String>,
        artifact: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        self.source_extension = source.into();
        self.artifact_extension = artifact.into();
        self.payload_extension = payload.into();
        self
    }

    /// Root of the local tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extension of compiled artifacts
    pub fn artifact_extension(&self) -> &str {
        &self.artifact_extension
    }

    /// `<root>/<name>.<source ext>`
    pub fn source_path(&self, name: &str) -> PathBuf {
        self.local_path(name, &self.source_extension)
    }

    /// `<root>/<name>.<artifact ext>`
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.local_path(name, &self.artifact_extension)
    }

    /// Repository resource of the compressed artifact, `<name>.bsp.gz`
    pub fn payload_resource(&self, name: &str) -> String {
        format!(
            "{}.{}.{}",
            name, self.artifact_extension, self.payload_extension
        )
    }

    /// Paths of an asset, before anything is known about them
    pub fn pair(&self, name: &str) -> LocalAssetPair {
        LocalAssetPair {
            source_path: self.source_path(name),
            artifact_path: self.artifact_path(name),
            source_hash: None,
            artifact_hash: None,
        }
    }

    // Catalog names always use '/' regardless of platform
    fn local_path(&self, name: &str, extension: &str) -> PathBuf {
        let file = format!("{}.{}", name, extension);
        let mut path = self.root.clone();
        path.extend(file.split('/'));
        path
    }
}

/// Local state of one asset as seen by the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAssetPair {
    /// Source asset location
    pub source_path: PathBuf,
    /// Artifact location
    pub artifact_path: PathBuf,
    /// Digest of the source, if it exists and was hashed
    pub source_hash: Option<String>,
    /// Digest of the artifact, if it exists and was hashed
    pub artifact_hash: Option<String>,
}

impl LocalAssetPair {
    /// Whether the source was found
    pub fn source_exists(&self) -> bool {
        self.source_hash.is_some()
    }

    /// Whether the artifact was found
    pub fn artifact_exists(&self) -> bool {
        self.artifact_hash.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = AssetLayout::new("/srv/game/base");
        assert_eq!(
            layout.source_path("maps/mapA"),
            Path::new("/srv/game/base/maps/mapA.map")
        );
        assert_eq!(
            layout.artifact_path("maps/mapA"),
            Path::new("/srv/game/base/maps/mapA.bsp")
        );
        assert_eq!(layout.payload_resource("maps/mapA"), "maps/mapA.bsp.gz");
    }

    #[test]
    fn test_dotted_names_keep_their_dots() {
        let layout = AssetLayout::new("root");
        assert_eq!(
            layout.artifact_path("ufo.v2"),
            Path::new("root").join("ufo.v2.bsp")
        );
    }

    #[test]
    fn test_custom_extensions() {
        let layout = AssetLayout::new("root").with_extensions("src", "bin", "gzip");
        assert_eq!(layout.source_path("a"), Path::new("root").join("a.src"));
        assert_eq!(layout.payload_resource("a"), "a.bin.gzip");
        assert!(!layout.pair("a").source_exists());
    }
}
