/// A repository as resolved from the hosting platform.
/// Constructed manually from the GitHub REST API response in client.rs.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    /// Owner login (user or organization)
    pub owner: String,
    /// Repository name
    pub name: String,
    /// Default branch name (e.g., "main")
    pub default_branch: String,
    /// Whether this repository is a fork
    pub fork: bool,
    /// The repository this was forked from, when `fork` is set
    pub parent: Option<RepoSlug>,
}

impl Repository {
    /// "owner/name" form used in messages and links.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn slug(&self) -> RepoSlug {
        RepoSlug {
            owner: self.owner.clone(),
            name: self.name.clone(),
        }
    }
}

/// Bare owner/name pair identifying a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A named ref resolved to its tip commit.
#[derive(Debug, Clone)]
pub struct GitRef {
    pub sha: String,
}

/// A file fetched through the contents API, already base64-decoded.
#[derive(Debug, Clone)]
pub struct FileContent {
    /// Blob SHA of the current file state, used as the
    /// optimistic-concurrency token when overwriting.
    pub sha: String,
    /// Decoded file text
    pub content: String,
}

/// Result of comparing two commits (base...head).
#[derive(Debug, Clone, Copy)]
pub struct Comparison {
    pub ahead_by: u64,
    pub behind_by: u64,
}

/// An open pull request as listed by the platform.
#[derive(Debug, Clone)]
pub struct PullRequestInfo {
    pub number: u64,
    pub html_url: String,
    /// Head label in "owner:branch" form
    pub head_label: String,
    pub title: String,
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// "owner:branch" for cross-repository heads
    pub head: String,
    pub base: String,
    /// Allow upstream maintainers to push to the head branch
    pub maintainer_can_modify: bool,
}

/// The authenticated user behind a token.
#[derive(Debug, Clone)]
pub struct User {
    pub login: String,
    pub avatar_url: String,
}
