//! Final stages of a run: write the updated registry document back as a
//! single commit on the per-mod branch, then find or create the pull
//! request proposing it upstream.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info, instrument};

use crate::config::{Inputs, RepoContext};
use crate::github::{Gateway, GatewayError, NewPullRequest, PullRequestInfo, Repository};
use crate::manifest::Manifest;

/// Title and body for the pull request or follow-up comment.
#[derive(Debug, Clone)]
pub struct PrMessage {
    pub title: String,
    pub body: String,
}

/// Build the run's pull-request message. The title phrasing depends on
/// whether the entry was added or replaced; the body links back to the
/// triggering release and workflow run and lists the run notices.
pub fn build_message(
    manifest: &Manifest,
    is_new_entry: bool,
    repo_ctx: &RepoContext,
    inputs: &Inputs,
    notices: &[String],
) -> PrMessage {
    let title = if is_new_entry {
        format!("Added {} v{} to the mod repo", manifest.name, manifest.version)
    } else {
        format!("Updated {} to v{}", manifest.name, manifest.version)
    };

    let mut body = format!("{} for game version {}.\n", title, manifest.package_version);
    body.push_str(&format!(
        "\nRelease: https://github.com/{}/releases/tag/{}\n",
        repo_ctx.repository, inputs.release_tag
    ));
    if let Some(run_id) = &repo_ctx.run_id {
        body.push_str(&format!(
            "Workflow run: https://github.com/{}/actions/runs/{}\n",
            repo_ctx.repository, run_id
        ));
    }
    if let Some(display_name) = &inputs.display_name {
        body.push_str(&format!("Artifact: {} (`{}`)\n", display_name, inputs.artifact));
    }

    if !notices.is_empty() {
        body.push_str("\nNotes:\n");
        for notice in notices {
            body.push_str(&format!("- {notice}\n"));
        }
    }

    PrMessage { title, body }
}

/// Commit the serialized document to `path` on `branch`.
///
/// The blob SHA fetched here is the optimistic-concurrency token: omitting
/// it when the file exists fails the platform's own check, and a stale one
/// means another run committed underneath us. An absent file simply means
/// the first commit on this fork creates it.
#[instrument(skip(writer, fork, document_json, message), fields(fork = %fork.full_name()))]
pub async fn commit_registry(
    writer: &dyn Gateway,
    fork: &Repository,
    path: &str,
    branch: &str,
    document_json: &str,
    message: &str,
) -> Result<String, GatewayError> {
    let blob_sha = match writer
        .get_file_content(&fork.owner, &fork.name, path, branch)
        .await
    {
        Ok(file) => Some(file.sha),
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err),
    };
    debug!(has_blob_sha = blob_sha.is_some(), "fetched current blob state");

    let encoded = STANDARD.encode(document_json.as_bytes());
    let commit_sha = writer
        .put_file(
            &fork.owner,
            &fork.name,
            path,
            message,
            &encoded,
            branch,
            blob_sha.as_deref(),
        )
        .await?;
    info!(commit = %commit_sha, "committed registry document");
    Ok(commit_sha)
}

/// Result of reconciling the pull request for a branch.
#[derive(Debug)]
pub struct PrOutcome {
    pub pull_request: PullRequestInfo,
    /// True when the message landed as a comment on an existing pull
    /// request instead of a new one.
    pub commented: bool,
}

/// Find the open pull request for `{fork_owner}:{branch}` and post the run
/// message on it, or open a new one (with maintainer edits allowed so
/// upstream can push fixups to the contributor's branch). At most one open
/// pull request per branch is expected; repeat runs never open a second.
#[instrument(skip_all, fields(upstream = %upstream.full_name(), branch))]
pub async fn reconcile_pull_request(
    reader: &dyn Gateway,
    writer: &dyn Gateway,
    upstream: &Repository,
    fork: &Repository,
    branch: &str,
    message: &PrMessage,
) -> Result<PrOutcome, GatewayError> {
    let head = format!("{}:{}", fork.owner, branch);
    let open = reader
        .list_open_pull_requests(&upstream.owner, &upstream.name, &head)
        .await?;

    if let Some(existing) = open.into_iter().next() {
        info!(number = existing.number, title = %existing.title, "found open pull request, commenting");
        writer
            .create_comment(
                &upstream.owner,
                &upstream.name,
                existing.number,
                &message.body,
            )
            .await?;
        return Ok(PrOutcome {
            pull_request: existing,
            commented: true,
        });
    }

    let created = writer
        .create_pull_request(
            &upstream.owner,
            &upstream.name,
            &NewPullRequest {
                title: message.title.clone(),
                body: message.body.clone(),
                head,
                base: upstream.default_branch.clone(),
                maintainer_can_modify: true,
            },
        )
        .await?;
    info!(number = created.number, url = %created.html_url, "opened pull request");
    Ok(PrOutcome {
        pull_request: created,
        commented: false,
    })
}
