use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Top-level configuration loaded from .mod-publisher.toml.
/// All fields are optional — the tool works with zero config against the
/// default upstream registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Canonical registry repository settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Bounded-retry policy for fork eventual-consistency
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Owner of the canonical registry repository
    pub owner: String,
    /// Name of the canonical registry repository
    pub repo: String,
    /// Path of the registry document within the repository
    pub registry_path: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            owner: "mod-community".to_string(),
            repo: "mod-registry".to_string(),
            registry_path: "mods.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts to fetch a freshly created fork before giving up
    pub fork_poll_attempts: u32,
    /// Delay between attempts, in seconds
    pub fork_poll_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            fork_poll_attempts: 10,
            fork_poll_delay_secs: 2,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.fork_poll_delay_secs)
    }
}

impl Config {
    /// Load configuration from .mod-publisher.toml in the current directory,
    /// falling back to defaults when the file is absent.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(".mod-publisher.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Token identifying the caller: all reads and the fork request.
    pub fn caller_token(&self) -> Result<String, ConfigError> {
        std::env::var("GITHUB_TOKEN").map_err(|_| ConfigError::MissingEnv("GITHUB_TOKEN"))
    }

    /// Elevated token for registry mutations (ref updates, commits, the
    /// pull request). Falls back to the caller token when unset.
    pub fn registry_token(&self) -> Result<String, ConfigError> {
        std::env::var("REGISTRY_TOKEN").or_else(|_| self.caller_token())
    }
}

/// Per-invocation inputs from the command line.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub manifest_path: PathBuf,
    /// Tag of the release that triggered this run
    pub release_tag: String,
    /// File name of the released artifact the download link points at
    pub artifact: String,
    /// Display name for the packaged artifact, shown in the pull request
    pub display_name: Option<String>,
    /// Explicit cover image URL; when unset a local cover.png is required
    pub cover_url: Option<String>,
    /// Explicit author icon URL; defaults to the submitter's avatar
    pub author_icon_url: Option<String>,
}

/// Repository context of the triggering workflow, from the standard
/// CI environment variables.
#[derive(Debug, Clone)]
pub struct RepoContext {
    /// "owner/name" of the repository the release came from
    pub repository: String,
    /// Commit the release was cut from
    pub sha: String,
    /// Workflow run id, when running under a workflow
    pub run_id: Option<String>,
}

impl RepoContext {
    pub fn from_env() -> Result<RepoContext, ConfigError> {
        Ok(RepoContext {
            repository: std::env::var("GITHUB_REPOSITORY")
                .map_err(|_| ConfigError::MissingEnv("GITHUB_REPOSITORY"))?,
            sha: std::env::var("GITHUB_SHA").map_err(|_| ConfigError::MissingEnv("GITHUB_SHA"))?,
            run_id: std::env::var("GITHUB_RUN_ID").ok(),
        })
    }
}
