//! Git integration layer.
//!
//! This module wraps the backend implementation (`git2_backend`) and
//! re-exports the small surface the backup pipeline needs: clone, open,
//! pull, staging, commit and push. No other module calls `git2` directly;
//! they use the [`Repository`] handle re-exported here.
//!
//! Failures are classified into [`GitError`] kinds so callers can tell
//! "repository already exists" or a diverged branch apart from real errors
//! without inspecting messages.

mod git2_backend;

pub use git2::Repository;
pub use git2_backend::{
    GitError, PullOutcome, RemoteOptions, Staging, clone_repo, commit_all, current_branch,
    open_worktree, pull_origin, push_branch, resolve_commit,
};
