//! Upstream sync: bring a branch up to date with an upstream branch by
//! force-updating its ref to the upstream tip. A hard fast-forward, not a
//! merge — commits unique to the target branch are discarded. The only
//! content ever committed to these branches is the single registry file,
//! so losing divergent history is the accepted trade-off.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::github::{Gateway, GatewayError, Repository};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch upstream failed; perform a manual merge: {0}")]
    FetchUpstream(#[source] GatewayError),
}

/// Force-fast-forward `repo`'s `branch` onto `upstream`'s `upstream_branch`
/// when it is behind. Returns whether an update was performed.
///
/// `repo` and `upstream` may be the same repository (catching a per-mod
/// branch up with the fork's own default branch).
#[instrument(skip(reader, writer, repo, upstream), fields(repo = %repo.full_name()))]
pub async fn sync_if_behind(
    reader: &dyn Gateway,
    writer: &dyn Gateway,
    repo: &Repository,
    upstream: &Repository,
    branch: &str,
    upstream_branch: &str,
) -> Result<bool, SyncError> {
    let head = format!("{}:{}", repo.owner, branch);
    let comparison = reader
        .compare_commits(&upstream.owner, &upstream.name, upstream_branch, &head)
        .await
        .map_err(SyncError::FetchUpstream)?;

    if comparison.behind_by == 0 {
        debug!("branch is up to date with upstream");
        return Ok(false);
    }

    let tip = reader
        .get_ref(
            &upstream.owner,
            &upstream.name,
            &format!("heads/{upstream_branch}"),
        )
        .await
        .map_err(SyncError::FetchUpstream)?;

    writer
        .update_ref(
            &repo.owner,
            &repo.name,
            &format!("heads/{branch}"),
            &tip.sha,
            true,
        )
        .await
        .map_err(SyncError::FetchUpstream)?;

    info!(
        behind_by = comparison.behind_by,
        ahead_by = comparison.ahead_by,
        tip = %tip.sha,
        "force-updated branch to upstream tip"
    );
    Ok(true)
}
