pub mod client;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use client::GitHubClient;
pub use types::{
    Comparison, FileContent, GitRef, NewPullRequest, PullRequestInfo, RepoSlug, Repository, User,
};

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by remote platform operations. The gateway never
/// retries — callers decide what is transient and what is fatal.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited by the platform API")]
    RateLimited,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("rejected by the platform ({status}): {message}")]
    Conflict { status: u16, message: String },

    #[error("platform API request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected platform response ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode platform response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

/// Typed facade over the remote operations the submission protocol needs:
/// repository lookup/fork, ref read-create-update, file content read-write,
/// commit comparison, and pull-request list/create/comment.
///
/// One implementation talks to the GitHub REST API (`GitHubClient`); tests
/// use an in-memory mock. Refs are passed in short form ("heads/{branch}").
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, GatewayError>;

    /// Request a fork of `owner/name` under the authenticated user.
    /// Forking is eventually consistent: the new repository may not be
    /// fetchable immediately after this returns.
    async fn create_fork(&self, owner: &str, name: &str) -> Result<(), GatewayError>;

    async fn get_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> Result<GitRef, GatewayError>;

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<(), GatewayError>;

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
        force: bool,
    ) -> Result<(), GatewayError>;

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_name: &str,
    ) -> Result<FileContent, GatewayError>;

    /// Create or overwrite a file on a branch, returning the new commit SHA.
    /// `blob_sha` must be the current blob SHA when the file already exists;
    /// the platform rejects a stale or missing SHA for an existing file.
    #[allow(clippy::too_many_arguments)]
    async fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        message: &str,
        content_base64: &str,
        branch: &str,
        blob_sha: Option<&str>,
    ) -> Result<String, GatewayError>;

    /// Compare `base...head` within the given repository. `head` may be
    /// qualified as "owner:branch" for cross-fork comparison.
    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, GatewayError>;

    /// List open pull requests whose head matches "owner:branch".
    async fn list_open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
    ) -> Result<Vec<PullRequestInfo>, GatewayError>;

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        request: &NewPullRequest,
    ) -> Result<PullRequestInfo, GatewayError>;

    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), GatewayError>;

    async fn authenticated_user(&self) -> Result<User, GatewayError>;
}
