//! The orchestrator: one submission run, driven entirely by remote state
//! fetched live. A linear pipeline of stages where each stage's output is
//! exactly what the next stage needs; every failure folds into a single
//! terminal [`RunError`].

use std::path::Path;

use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::branch::{self, BranchError};
use crate::config::{Config, ConfigError, Inputs, RepoContext, RetryConfig, UpstreamConfig};
use crate::github::{Gateway, GatewayError, PullRequestInfo, Repository, User};
use crate::manifest::{Manifest, ManifestError};
use crate::publish;
use crate::registry::{self, Author, ModEntry, Registry, RegistryError};
use crate::sync::{self, SyncError};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error("upstream registry repository {0} not found; check the [upstream] configuration")]
    UpstreamMissing(String),

    #[error("{fork} is not a fork of {upstream}; delete it and fork {upstream} instead")]
    NotAFork { fork: String, upstream: String },

    #[error("fork was not visible after {attempts} attempts: {last}")]
    ForkUnavailable { attempts: u32, last: GatewayError },

    #[error("no cover image configured and {0} does not exist; add it next to the manifest or pass --cover-url")]
    MissingCover(String),

    #[error("the registry file changed during the run; rerun the workflow or merge manually ({0})")]
    CommitConflict(GatewayError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Everything a run needs, constructed once by the entry point and passed
/// through the pipeline — no ambient state.
pub struct RunContext {
    pub config: Config,
    pub inputs: Inputs,
    pub repo_ctx: RepoContext,
    pub manifest: Manifest,
    /// Reads and the fork request, under the caller's token
    pub reader: Box<dyn Gateway>,
    /// Registry mutations, under the elevated token
    pub writer: Box<dyn Gateway>,
    /// Run-level notices, surfaced in the pull request body or comment
    pub notices: Vec<String>,
}

/// What a successful run produced.
#[derive(Debug)]
pub struct RunReport {
    pub pull_request: PullRequestInfo,
    /// True when the run commented on an existing pull request
    pub commented: bool,
    pub commit_sha: String,
    pub is_new_entry: bool,
}

/// Execute the submit-or-update protocol once.
pub async fn run(mut ctx: RunContext) -> Result<RunReport, RunError> {
    // Everything local is checked before the first remote mutation.
    registry::validate_game_version(&ctx.manifest.package_version)?;
    let cover = resolve_cover(&ctx.inputs, &ctx.repo_ctx)?;

    let upstream = resolve_upstream(ctx.reader.as_ref(), &ctx.config.upstream)
        .instrument(info_span!("resolve_upstream"))
        .await?;

    let (fork, user) = resolve_fork(ctx.reader.as_ref(), &ctx.config.retry, &upstream)
        .instrument(info_span!("resolve_fork"))
        .await?;

    sync::sync_if_behind(
        ctx.reader.as_ref(),
        ctx.writer.as_ref(),
        &fork,
        &upstream,
        &fork.default_branch,
        &upstream.default_branch,
    )
    .instrument(info_span!("sync_fork"))
    .await?;

    let branch = ctx.manifest.id.clone();
    branch::ensure_branch(ctx.reader.as_ref(), ctx.writer.as_ref(), &fork, &branch)
        .instrument(info_span!("ensure_branch", branch = %branch))
        .await?;

    let path = ctx.config.upstream.registry_path.clone();
    let mut document =
        load_registry(ctx.reader.as_ref(), &fork, &path, &branch, &mut ctx.notices)
            .instrument(info_span!("load_registry", path = %path))
            .await?;

    let entry = build_entry(&ctx, cover, &user);
    let outcome = document.apply(&ctx.manifest.package_version, entry)?;
    if outcome.created_bucket {
        ctx.notices.push(format!(
            "new version entry created for {}",
            ctx.manifest.package_version
        ));
    }

    let commit_message = if outcome.is_new_entry {
        format!("Added {} v{}", ctx.manifest.name, ctx.manifest.version)
    } else {
        format!("Updated {} to v{}", ctx.manifest.name, ctx.manifest.version)
    };
    let commit_sha = publish::commit_registry(
        ctx.writer.as_ref(),
        &fork,
        &path,
        &branch,
        &document.to_json()?,
        &commit_message,
    )
    .instrument(info_span!("commit", branch = %branch))
    .await
    .map_err(|err| match err {
        GatewayError::Conflict { .. } => RunError::CommitConflict(err),
        other => RunError::Gateway(other),
    })?;

    let message = publish::build_message(
        &ctx.manifest,
        outcome.is_new_entry,
        &ctx.repo_ctx,
        &ctx.inputs,
        &ctx.notices,
    );
    let pr = publish::reconcile_pull_request(
        ctx.reader.as_ref(),
        ctx.writer.as_ref(),
        &upstream,
        &fork,
        &branch,
        &message,
    )
    .instrument(info_span!("reconcile_pull_request", branch = %branch))
    .await?;

    info!(
        pr = pr.pull_request.number,
        commented = pr.commented,
        is_new_entry = outcome.is_new_entry,
        "run complete"
    );
    Ok(RunReport {
        pull_request: pr.pull_request,
        commented: pr.commented,
        commit_sha,
        is_new_entry: outcome.is_new_entry,
    })
}

/// Resolve the cover image URL. With no explicit URL configured, a local
/// cover.png next to the manifest is required and the entry points at the
/// raw copy inside the triggering repository.
fn resolve_cover(inputs: &Inputs, repo_ctx: &RepoContext) -> Result<String, RunError> {
    if let Some(url) = &inputs.cover_url {
        return Ok(url.clone());
    }
    let local = inputs
        .manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("cover.png");
    if !local.exists() {
        return Err(RunError::MissingCover(local.display().to_string()));
    }
    Ok(format!(
        "https://raw.githubusercontent.com/{}/{}/cover.png",
        repo_ctx.repository, repo_ctx.sha
    ))
}

async fn resolve_upstream(
    reader: &dyn Gateway,
    upstream: &UpstreamConfig,
) -> Result<Repository, RunError> {
    reader
        .get_repository(&upstream.owner, &upstream.repo)
        .await
        .map_err(|err| {
            if err.is_not_found() {
                RunError::UpstreamMissing(format!("{}/{}", upstream.owner, upstream.repo))
            } else {
                err.into()
            }
        })
}

/// Find the caller's fork of the registry, forking first when absent.
/// Fork creation is eventually consistent, so a fresh fork is polled for
/// under the bounded retry policy.
async fn resolve_fork(
    reader: &dyn Gateway,
    retry: &RetryConfig,
    upstream: &Repository,
) -> Result<(Repository, User), RunError> {
    let user = reader.authenticated_user().await?;

    let fork = match reader.get_repository(&user.login, &upstream.name).await {
        Ok(repo) => repo,
        Err(err) if err.is_not_found() => {
            info!(user = %user.login, "no fork found, forking the registry repository");
            reader.create_fork(&upstream.owner, &upstream.name).await?;
            poll_fork(reader, retry, &user.login, &upstream.name).await?
        }
        Err(err) => return Err(err.into()),
    };

    verify_fork(&fork, upstream)?;
    Ok((fork, user))
}

fn verify_fork(fork: &Repository, upstream: &Repository) -> Result<(), RunError> {
    let parent_matches = fork.fork && fork.parent.as_ref() == Some(&upstream.slug());
    if !parent_matches {
        return Err(RunError::NotAFork {
            fork: fork.full_name(),
            upstream: upstream.full_name(),
        });
    }
    Ok(())
}

async fn poll_fork(
    reader: &dyn Gateway,
    retry: &RetryConfig,
    owner: &str,
    name: &str,
) -> Result<Repository, RunError> {
    let mut last = GatewayError::NotFound(format!("/repos/{owner}/{name}"));
    for attempt in 1..=retry.fork_poll_attempts {
        match reader.get_repository(owner, name).await {
            Ok(repo) => {
                info!(attempt, "fork became visible");
                return Ok(repo);
            }
            Err(err) if err.is_not_found() => {
                last = err;
                if attempt < retry.fork_poll_attempts {
                    tokio::time::sleep(retry.delay()).await;
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(RunError::ForkUnavailable {
        attempts: retry.fork_poll_attempts,
        last,
    })
}

async fn load_registry(
    reader: &dyn Gateway,
    fork: &Repository,
    path: &str,
    branch: &str,
    notices: &mut Vec<String>,
) -> Result<Registry, RunError> {
    match reader
        .get_file_content(&fork.owner, &fork.name, path, branch)
        .await
    {
        Ok(file) => Ok(Registry::parse(&file.content)?),
        Err(err) if err.is_not_found() => {
            notices.push("no registry file found on the fork; a new one will be created".to_string());
            Ok(Registry::default())
        }
        Err(err) => Err(err.into()),
    }
}

fn build_entry(ctx: &RunContext, cover: String, user: &User) -> ModEntry {
    ModEntry {
        name: ctx.manifest.name.clone(),
        description: ctx.manifest.description.clone(),
        id: ctx.manifest.id.clone(),
        version: ctx.manifest.version.clone(),
        download_link: format!(
            "https://github.com/{}/releases/download/{}/{}",
            ctx.repo_ctx.repository, ctx.inputs.release_tag, ctx.inputs.artifact
        ),
        cover,
        author: Author {
            name: ctx.manifest.author.clone(),
            icon: ctx
                .inputs
                .author_icon_url
                .clone()
                .unwrap_or_else(|| user.avatar_url.clone()),
        },
    }
}
