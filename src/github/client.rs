use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::types::{
    Comparison, FileContent, GitRef, NewPullRequest, PullRequestInfo, RepoSlug, Repository, User,
};
use super::{Gateway, GatewayError};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "mod-publisher";

/// GitHub REST implementation of the [`Gateway`].
///
/// Holds one token; the run constructs two instances — the caller token
/// for reads and fork creation, the elevated registry token for mutations.
pub struct GitHubClient {
    http: reqwest::Client,
    token: String,
}

impl GitHubClient {
    pub fn new(token: String) -> Self {
        GitHubClient {
            http: reqwest::Client::new(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{API_BASE}{path}"))
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
    }

    /// Map a non-success response to the gateway error taxonomy.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            404 => GatewayError::NotFound(url),
            401 => GatewayError::PermissionDenied(url),
            403 | 429 => {
                if message.contains("rate limit") {
                    GatewayError::RateLimited
                } else {
                    GatewayError::PermissionDenied(url)
                }
            }
            409 | 422 => GatewayError::Conflict {
                status: status.as_u16(),
                message,
            },
            s => GatewayError::Api { status: s, message },
        })
    }
}

#[derive(Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Deserialize)]
struct ParentResponse {
    name: String,
    owner: OwnerResponse,
}

#[derive(Deserialize)]
struct RepoResponse {
    name: String,
    owner: OwnerResponse,
    default_branch: String,
    fork: bool,
    parent: Option<ParentResponse>,
}

impl From<RepoResponse> for Repository {
    fn from(raw: RepoResponse) -> Self {
        Repository {
            owner: raw.owner.login,
            name: raw.name,
            default_branch: raw.default_branch,
            fork: raw.fork,
            parent: raw.parent.map(|p| RepoSlug {
                owner: p.owner.login,
                name: p.name,
            }),
        }
    }
}

#[derive(Deserialize)]
struct RefObjectResponse {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: RefObjectResponse,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    content: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: String,
}

#[derive(Deserialize)]
struct PutFileResponse {
    commit: CommitResponse,
}

#[derive(Deserialize)]
struct CompareResponse {
    ahead_by: u64,
    behind_by: u64,
}

#[derive(Deserialize)]
struct HeadResponse {
    label: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    html_url: String,
    head: HeadResponse,
    title: String,
}

impl From<PullResponse> for PullRequestInfo {
    fn from(raw: PullResponse) -> Self {
        PullRequestInfo {
            number: raw.number,
            html_url: raw.html_url,
            head_label: raw.head.label,
            title: raw.title,
        }
    }
}

#[async_trait]
impl Gateway for GitHubClient {
    #[instrument(skip(self))]
    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/repos/{owner}/{name}"))
            .send()
            .await?;
        let raw = Self::check(response).await?.json::<RepoResponse>().await?;
        debug!(default_branch = %raw.default_branch, fork = raw.fork, "resolved repository");
        Ok(raw.into())
    }

    #[instrument(skip(self))]
    async fn create_fork(&self, owner: &str, name: &str) -> Result<(), GatewayError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{owner}/{name}/forks"))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> Result<GitRef, GatewayError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{owner}/{repo}/git/ref/{ref_name}"),
            )
            .send()
            .await?;
        let raw = Self::check(response).await?.json::<RefResponse>().await?;
        Ok(GitRef {
            sha: raw.object.sha,
        })
    }

    #[instrument(skip(self, sha))]
    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{owner}/{repo}/git/refs"),
            )
            .json(&serde_json::json!({
                "ref": format!("refs/{ref_name}"),
                "sha": sha,
            }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, sha))]
    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
        force: bool,
    ) -> Result<(), GatewayError> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/repos/{owner}/{repo}/git/refs/{ref_name}"),
            )
            .json(&serde_json::json!({ "sha": sha, "force": force }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_name: &str,
    ) -> Result<FileContent, GatewayError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{owner}/{repo}/contents/{path}"),
            )
            .query(&[("ref", ref_name)])
            .send()
            .await?;
        let raw = Self::check(response)
            .await?
            .json::<ContentResponse>()
            .await?;

        // The contents API base64-encodes with line wrapping.
        let stripped: String = raw.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(stripped)
            .map_err(|e| GatewayError::Decode(format!("invalid base64 at {path}: {e}")))?;
        let content = String::from_utf8(bytes)
            .map_err(|e| GatewayError::Decode(format!("non-UTF-8 content at {path}: {e}")))?;

        debug!(bytes = content.len(), "fetched file content");
        Ok(FileContent {
            sha: raw.sha,
            content,
        })
    }

    #[instrument(skip(self, message, content_base64, blob_sha))]
    async fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        message: &str,
        content_base64: &str,
        branch: &str,
        blob_sha: Option<&str>,
    ) -> Result<String, GatewayError> {
        let mut body = serde_json::json!({
            "message": message,
            "content": content_base64,
            "branch": branch,
        });
        if let Some(sha) = blob_sha {
            body["sha"] = serde_json::Value::String(sha.to_string());
        }

        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/repos/{owner}/{repo}/contents/{path}"),
            )
            .json(&body)
            .send()
            .await?;
        let raw = Self::check(response)
            .await?
            .json::<PutFileResponse>()
            .await?;
        debug!(commit = %raw.commit.sha, "committed file");
        Ok(raw.commit.sha)
    }

    #[instrument(skip(self))]
    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, GatewayError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{owner}/{repo}/compare/{base}...{head}"),
            )
            .send()
            .await?;
        let raw = Self::check(response)
            .await?
            .json::<CompareResponse>()
            .await?;
        Ok(Comparison {
            ahead_by: raw.ahead_by,
            behind_by: raw.behind_by,
        })
    }

    #[instrument(skip(self))]
    async fn list_open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
    ) -> Result<Vec<PullRequestInfo>, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/repos/{owner}/{repo}/pulls"))
            .query(&[("state", "open"), ("head", head)])
            .send()
            .await?;
        let raw = Self::check(response)
            .await?
            .json::<Vec<PullResponse>>()
            .await?;
        Ok(raw.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request), fields(title = %request.title, head = %request.head))]
    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        request: &NewPullRequest,
    ) -> Result<PullRequestInfo, GatewayError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/repos/{owner}/{repo}/pulls"))
            .json(&serde_json::json!({
                "title": request.title,
                "body": request.body,
                "head": request.head,
                "base": request.base,
                "maintainer_can_modify": request.maintainer_can_modify,
            }))
            .send()
            .await?;
        let raw = Self::check(response).await?.json::<PullResponse>().await?;
        debug!(number = raw.number, url = %raw.html_url, "opened pull request");
        Ok(raw.into())
    }

    #[instrument(skip(self, body))]
    async fn create_comment(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{owner}/{repo}/issues/{issue_number}/comments"),
            )
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn authenticated_user(&self) -> Result<User, GatewayError> {
        #[derive(Deserialize)]
        struct UserResponse {
            login: String,
            avatar_url: String,
        }

        let response = self.request(reqwest::Method::GET, "/user").send().await?;
        let raw = Self::check(response).await?.json::<UserResponse>().await?;
        Ok(User {
            login: raw.login,
            avatar_url: raw.avatar_url,
        })
    }
}
