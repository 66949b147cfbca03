//! In-memory [`Gateway`] used by the protocol tests. Remote state lives
//! behind an `Arc<Mutex<..>>` so one mock can serve as both the reader and
//! the writer side of a run, and so a second run observes the mutations of
//! the first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::types::{
    Comparison, FileContent, GitRef, NewPullRequest, PullRequestInfo, Repository, User,
};
use super::{Gateway, GatewayError};

/// A recorded `put_file` call.
#[derive(Debug, Clone)]
pub struct CommitCall {
    pub path: String,
    pub branch: String,
    pub message: String,
    pub blob_sha: Option<String>,
    pub content: String,
}

#[derive(Default)]
struct State {
    repos: HashMap<(String, String), Repository>,
    /// (owner, repo, "heads/branch") -> commit sha
    refs: HashMap<(String, String, String), String>,
    /// (owner, repo, path, ref) -> file
    files: HashMap<(String, String, String, String), FileContent>,
    pulls: Vec<(String, String, PullRequestInfo)>,
    user: Option<User>,
    /// Fork requested but not yet visible: value is the number of
    /// `get_repository` misses left before it materializes.
    pending_fork: Option<(Repository, u32)>,
    fork_delay_polls: u32,
    /// When set, a file's blob SHA rotates after every read, as if
    /// another run committed between this run's read and write.
    rotate_blob_sha_on_read: bool,

    fork_requests: u32,
    created_refs: Vec<(String, String, String)>,
    updated_refs: Vec<(String, String, bool)>,
    commits: Vec<CommitCall>,
    created_pulls: Vec<NewPullRequest>,
    comments: Vec<(u64, String)>,
    blob_counter: u64,
}

#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<State>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_repository(&self, repo: Repository) {
        let mut state = self.state.lock().unwrap();
        state
            .repos
            .insert((repo.owner.clone(), repo.name.clone()), repo);
    }

    pub fn seed_ref(&self, owner: &str, repo: &str, branch: &str, sha: &str) {
        let mut state = self.state.lock().unwrap();
        state.refs.insert(
            (owner.to_string(), repo.to_string(), format!("heads/{branch}")),
            sha.to_string(),
        );
    }

    pub fn seed_file(&self, owner: &str, repo: &str, path: &str, ref_name: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        state.blob_counter += 1;
        let sha = format!("blob-{}", state.blob_counter);
        state.files.insert(
            (
                owner.to_string(),
                repo.to_string(),
                path.to_string(),
                ref_name.to_string(),
            ),
            FileContent {
                sha,
                content: content.to_string(),
            },
        );
    }

    pub fn seed_user(&self, login: &str, avatar_url: &str) {
        self.state.lock().unwrap().user = Some(User {
            login: login.to_string(),
            avatar_url: avatar_url.to_string(),
        });
    }

    pub fn seed_open_pull(&self, owner: &str, repo: &str, pull: PullRequestInfo) {
        self.state
            .lock()
            .unwrap()
            .pulls
            .push((owner.to_string(), repo.to_string(), pull));
    }

    /// Make a requested fork invisible for the given number of
    /// `get_repository` calls, modeling eventual consistency.
    pub fn set_fork_delay_polls(&self, polls: u32) {
        self.state.lock().unwrap().fork_delay_polls = polls;
    }

    /// Rotate a file's blob SHA after each read, so any SHA fetched before
    /// a write is stale by the time the write lands. Models a concurrent
    /// run racing on the same registry file.
    pub fn rotate_blob_sha_on_read(&self) {
        self.state.lock().unwrap().rotate_blob_sha_on_read = true;
    }

    pub fn fork_requests(&self) -> u32 {
        self.state.lock().unwrap().fork_requests
    }

    pub fn created_refs(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().created_refs.clone()
    }

    pub fn updated_refs(&self) -> Vec<(String, String, bool)> {
        self.state.lock().unwrap().updated_refs.clone()
    }

    pub fn commits(&self) -> Vec<CommitCall> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn created_pulls(&self) -> Vec<NewPullRequest> {
        self.state.lock().unwrap().created_pulls.clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn mutation_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.fork_requests as usize
            + state.created_refs.len()
            + state.updated_refs.len()
            + state.commits.len()
            + state.created_pulls.len()
            + state.comments.len()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn get_repository(&self, owner: &str, name: &str) -> Result<Repository, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = (owner.to_string(), name.to_string());

        if let Some((pending, misses_left)) = state.pending_fork.take() {
            if pending.owner == owner && pending.name == name {
                if misses_left == 0 {
                    state.repos.insert(key.clone(), pending);
                } else {
                    state.pending_fork = Some((pending, misses_left - 1));
                }
            } else {
                state.pending_fork = Some((pending, misses_left));
            }
        }

        state
            .repos
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("/repos/{owner}/{name}")))
    }

    async fn create_fork(&self, owner: &str, name: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.fork_requests += 1;

        let parent = state
            .repos
            .get(&(owner.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("/repos/{owner}/{name}")))?;
        let fork_owner = state
            .user
            .as_ref()
            .map(|u| u.login.clone())
            .unwrap_or_else(|| "forker".to_string());

        let fork = Repository {
            owner: fork_owner.clone(),
            name: parent.name.clone(),
            default_branch: parent.default_branch.clone(),
            fork: true,
            parent: Some(parent.slug()),
        };
        // Fork starts at the parent's branch tips.
        let parent_refs: Vec<(String, String)> = state
            .refs
            .iter()
            .filter(|((o, r, _), _)| o == owner && r == name)
            .map(|((_, _, rf), sha)| (rf.clone(), sha.clone()))
            .collect();
        for (rf, sha) in parent_refs {
            state
                .refs
                .insert((fork_owner.clone(), name.to_string(), rf), sha);
        }

        let delay = state.fork_delay_polls;
        state.pending_fork = Some((fork, delay));
        Ok(())
    }

    async fn get_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
    ) -> Result<GitRef, GatewayError> {
        let state = self.state.lock().unwrap();
        state
            .refs
            .get(&(owner.to_string(), repo.to_string(), ref_name.to_string()))
            .map(|sha| GitRef { sha: sha.clone() })
            .ok_or_else(|| GatewayError::NotFound(format!("/repos/{owner}/{repo}/git/ref/{ref_name}")))
    }

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = (owner.to_string(), repo.to_string(), ref_name.to_string());
        if state.refs.contains_key(&key) {
            return Err(GatewayError::Conflict {
                status: 422,
                message: format!("reference already exists: {ref_name}"),
            });
        }
        state.refs.insert(key, sha.to_string());
        state
            .created_refs
            .push((repo.to_string(), ref_name.to_string(), sha.to_string()));
        Ok(())
    }

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
        force: bool,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = (owner.to_string(), repo.to_string(), ref_name.to_string());
        if !state.refs.contains_key(&key) {
            return Err(GatewayError::NotFound(format!(
                "/repos/{owner}/{repo}/git/refs/{ref_name}"
            )));
        }
        state.refs.insert(key, sha.to_string());
        state
            .updated_refs
            .push((ref_name.to_string(), sha.to_string(), force));
        Ok(())
    }

    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_name: &str,
    ) -> Result<FileContent, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let key = (
            owner.to_string(),
            repo.to_string(),
            path.to_string(),
            ref_name.to_string(),
        );
        let file = state
            .files
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("/repos/{owner}/{repo}/contents/{path}")))?;

        if state.rotate_blob_sha_on_read {
            state.blob_counter += 1;
            let racing_sha = format!("blob-{}", state.blob_counter);
            if let Some(stored) = state.files.get_mut(&key) {
                stored.sha = racing_sha;
            }
        }
        Ok(file)
    }

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
        use base64::{engine::general_purpose::STANDARD, Engine as _};

        let mut state = self.state.lock().unwrap();
        let key = (
            owner.to_string(),
            repo.to_string(),
            path.to_string(),
            branch.to_string(),
        );

        // Enforce the optimistic-concurrency contract.
        match (state.files.get(&key), blob_sha) {
            (Some(existing), Some(sha)) if existing.sha != sha => {
                return Err(GatewayError::Conflict {
                    status: 409,
                    message: format!("{path} does not match {sha}"),
                });
            }
            (Some(_), None) => {
                return Err(GatewayError::Conflict {
                    status: 422,
                    message: format!("sha required to update {path}"),
                });
            }
            _ => {}
        }

        let decoded = STANDARD
            .decode(content_base64)
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        let content = String::from_utf8(decoded).map_err(|e| GatewayError::Decode(e.to_string()))?;

        state.blob_counter += 1;
        let new_sha = format!("blob-{}", state.blob_counter);
        state.files.insert(
            key,
            FileContent {
                sha: new_sha,
                content: content.clone(),
            },
        );
        state.commits.push(CommitCall {
            path: path.to_string(),
            branch: branch.to_string(),
            message: message.to_string(),
            blob_sha: blob_sha.map(str::to_string),
            content,
        });
        Ok(format!("commit-{}", state.blob_counter))
    }

    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Comparison, GatewayError> {
        let state = self.state.lock().unwrap();

        let base_sha = state
            .refs
            .get(&(owner.to_string(), repo.to_string(), format!("heads/{base}")));
        // Cross-fork heads are "owner:branch"; forks share the repo name here.
        let (head_owner, head_branch) = match head.split_once(':') {
            Some((o, b)) => (o, b),
            None => (owner, head),
        };
        let head_sha = state.refs.get(&(
            head_owner.to_string(),
            repo.to_string(),
            format!("heads/{head_branch}"),
        ));

        match (base_sha, head_sha) {
            (Some(b), Some(h)) if b == h => Ok(Comparison {
                ahead_by: 0,
                behind_by: 0,
            }),
            (Some(_), Some(_)) => Ok(Comparison {
                ahead_by: 0,
                behind_by: 1,
            }),
            _ => Err(GatewayError::NotFound(format!(
                "/repos/{owner}/{repo}/compare/{base}...{head}"
            ))),
        }
    }

    async fn list_open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
    ) -> Result<Vec<PullRequestInfo>, GatewayError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pulls
            .iter()
            .filter(|(o, r, pr)| o == owner && r == repo && pr.head_label == head)
            .map(|(_, _, pr)| pr.clone())
            .collect())
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        request: &NewPullRequest,
    ) -> Result<PullRequestInfo, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let number = state.pulls.len() as u64 + 1;
        let pull = PullRequestInfo {
            number,
            html_url: format!("https://github.com/{owner}/{repo}/pull/{number}"),
            head_label: request.head.clone(),
            title: request.title.clone(),
        };
        state
            .pulls
            .push((owner.to_string(), repo.to_string(), pull.clone()));
        state.created_pulls.push(request.clone());
        Ok(pull)
    }

    async fn create_comment(
        &self,
        _owner: &str,
        _repo: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<(), GatewayError> {
        self.state
            .lock()
            .unwrap()
            .comments
            .push((issue_number, body.to_string()));
        Ok(())
    }

    async fn authenticated_user(&self) -> Result<User, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .user
            .clone()
            .ok_or_else(|| GatewayError::NotFound("/user".to_string()))
    }
}
