use std::fs;
use std::path::Path;

use semver::Version;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse manifest file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Version invalid: {0}")]
    InvalidVersion(String),
}

/// The mod manifest shipped alongside a release. `packageVersion` is the
/// game version the mod targets and becomes the registry bucket key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub id: String,
    pub version: String,
    pub author: String,
    pub package_version: String,
}

impl Manifest {
    /// Read and validate a manifest. Both versions must parse as semver;
    /// an invalid one fails the run before anything touches the remote.
    pub fn load(path: &Path) -> Result<Manifest, ManifestError> {
        let contents = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&contents)?;
        manifest.validate()?;
        debug!(id = %manifest.id, version = %manifest.version, package_version = %manifest.package_version, "loaded manifest");
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        for version in [&self.version, &self.package_version] {
            Version::parse(version)
                .map_err(|_| ManifestError::InvalidVersion(version.clone()))?;
        }
        Ok(())
    }
}
