use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::git::{RemoteOptions, Repository, commit_all, current_branch, push_branch, resolve_commit};

/// Message used for every mirror commit.
pub const COMMIT_MESSAGE: &str = "update";

/// A commit that reached the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub commit: String,
    pub branch: String,
}

/// Commits the working tree and pushes the current branch to `origin`.
pub struct CommitPublisher<'a> {
    repo: &'a Repository,
    author_name: &'a str,
    author_email: &'a str,
    remote: &'a RemoteOptions,
}

impl<'a> CommitPublisher<'a> {
    pub fn new(repo: &'a Repository, cfg: &'a BackupConfig, remote: &'a RemoteOptions) -> Self {
        Self {
            repo,
            author_name: &cfg.author_name,
            author_email: &cfg.author_email,
            remote,
        }
    }

    /// Commit everything modified or staged, confirm the commit exists, push.
    ///
    /// A failed push keeps the local commit; the next successful push
    /// carries it along.
    pub fn publish(&self) -> Result<Published> {
        let oid = commit_all(self.repo, self.author_name, self.author_email, COMMIT_MESSAGE)
            .map_err(BackupError::Commit)?;
        let commit = resolve_commit(self.repo, oid).map_err(BackupError::Commit)?;
        let branch = current_branch(self.repo).map_err(BackupError::Commit)?;
        info!(commit = %commit, branch = %branch, "created backup commit");

        if let Err(source) = push_branch(self.repo, &branch, self.remote) {
            warn!(commit = %commit, branch = %branch, error = %source, "push failed; commit kept locally");
            return Err(BackupError::Push { branch, source });
        }
        info!(commit = %commit, branch = %branch, "pushed backup commit to origin");
        Ok(Published { commit, branch })
    }
}
