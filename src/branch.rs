//! Per-mod branch provisioning on the submitter's fork. The branch named
//! after the mod identifier is the unit of isolation for one mod's pending
//! change; it is created lazily and reused across runs until merged.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::github::{Gateway, GatewayError, Repository};
use crate::sync::{self, SyncError};

#[derive(Debug, Error)]
pub enum BranchError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Make sure `branch` exists on the fork. An existing branch is caught up
/// with the fork's default branch (the fork itself may have advanced since
/// the branch was cut); a fresh branch is created at the default branch
/// tip and needs no sync. Returns whether the branch was created.
#[instrument(skip(reader, writer, fork), fields(fork = %fork.full_name()))]
pub async fn ensure_branch(
    reader: &dyn Gateway,
    writer: &dyn Gateway,
    fork: &Repository,
    branch: &str,
) -> Result<bool, BranchError> {
    match reader
        .get_ref(&fork.owner, &fork.name, &format!("heads/{branch}"))
        .await
    {
        Ok(_) => {
            debug!("branch already exists, syncing with the fork's default branch");
            sync::sync_if_behind(reader, writer, fork, fork, branch, &fork.default_branch).await?;
            Ok(false)
        }
        Err(err) if err.is_not_found() => {
            let tip = reader
                .get_ref(
                    &fork.owner,
                    &fork.name,
                    &format!("heads/{}", fork.default_branch),
                )
                .await?;
            writer
                .create_ref(&fork.owner, &fork.name, &format!("heads/{branch}"), &tip.sha)
                .await?;
            info!(tip = %tip.sha, "created branch from the default branch tip");
            Ok(true)
        }
        Err(err) => Err(err.into()),
    }
}
