//! The shared registry document: a JSON mapping from game version to the
//! list of mods published for it. One run reads the document from the
//! fork's branch, applies a single entry, and writes it back whole.

use std::collections::BTreeMap;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Version invalid: {0}")]
    InvalidVersion(String),

    #[error("Failed to parse registry document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Check that a game-version key is a well-formed semantic version.
pub fn validate_game_version(version: &str) -> Result<(), RegistryError> {
    Version::parse(version).map_err(|_| RegistryError::InvalidVersion(version.to_string()))?;
    Ok(())
}

/// The author block of a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub icon: String,
}

/// One published mod within a game-version bucket. Identity within a bucket
/// is the `id`; a resubmission replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModEntry {
    pub name: String,
    pub description: String,
    pub id: String,
    pub version: String,
    pub download_link: String,
    pub cover: String,
    pub author: Author,
}

/// Outcome of applying an entry to the document.
#[derive(Debug, Clone, Copy)]
pub struct ApplyOutcome {
    /// False when an entry with the same id was replaced.
    pub is_new_entry: bool,
    /// True when the game-version bucket did not exist before.
    pub created_bucket: bool,
}

/// The registry document. Bucket contents keep insertion order; keys
/// serialize in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry(BTreeMap<String, Vec<ModEntry>>);

impl Registry {
    pub fn parse(json: &str) -> Result<Registry, RegistryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RegistryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn bucket(&self, game_version: &str) -> Option<&[ModEntry]> {
        self.0.get(game_version).map(Vec::as_slice)
    }

    /// Insert or replace `entry` in the bucket for `game_version`.
    ///
    /// An existing entry with the same id is removed first, so identifiers
    /// stay unique within a bucket; the new entry always lands at the end
    /// (order within a bucket is insertion order, not sorted).
    pub fn apply(
        &mut self,
        game_version: &str,
        entry: ModEntry,
    ) -> Result<ApplyOutcome, RegistryError> {
        validate_game_version(game_version)?;

        let created_bucket = !self.0.contains_key(game_version);
        let bucket = self.0.entry(game_version.to_string()).or_default();

        let len_before = bucket.len();
        bucket.retain(|existing| existing.id != entry.id);
        let is_new_entry = bucket.len() == len_before;

        debug!(
            game_version,
            id = %entry.id,
            is_new_entry,
            created_bucket,
            "applied registry entry"
        );
        bucket.push(entry);

        Ok(ApplyOutcome {
            is_new_entry,
            created_bucket,
        })
    }
}
