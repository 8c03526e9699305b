//! One-time bootstrap of the local mirror repository.
//!
//! ```text
//! Uninitialized ── clone ok ───────────────────────────────▶ Ready (Cloned)
//!       │
//!       └── clone: already exists ── open ── pull origin ──▶ Ready (Reopened)
//!                                              │
//!                                              └ up to date: logged, not an error
//! ```
//!
//! Any other failure aborts the call and leaves the state `Uninitialized`,
//! so the next call starts over with a clone attempt.

use std::path::PathBuf;
use tracing::info;

use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use crate::git::{GitError, PullOutcome, RemoteOptions, Repository, clone_repo, open_worktree, pull_origin};

/// How the Ready handle was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Cloned,
    Reopened { pull: PullOutcome },
}

/// Owns the local clone once it has been bootstrapped.
pub struct RepositorySync {
    remote_url: String,
    local_path: PathBuf,
    remote: RemoteOptions,
    repo: Option<Repository>,
    outcome: Option<BootstrapOutcome>,
}

impl RepositorySync {
    pub fn new(cfg: &BackupConfig) -> Self {
        Self {
            remote_url: cfg.remote_url.clone(),
            local_path: cfg.local_repo_path.clone(),
            remote: RemoteOptions::from_config(cfg),
            repo: None,
            outcome: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.repo.is_some()
    }

    /// How bootstrap went, or `None` while still uninitialized.
    pub fn outcome(&self) -> Option<BootstrapOutcome> {
        self.outcome
    }

    pub fn remote(&self) -> &RemoteOptions {
        &self.remote
    }

    /// Return the cached handle, bootstrapping it on first use.
    pub fn ensure_ready(&mut self) -> Result<&Repository> {
        let repo = match self.repo.take() {
            Some(repo) => repo,
            None => {
                let (repo, outcome) = self.bootstrap().map_err(|source| BackupError::Bootstrap {
                    path: self.local_path.clone(),
                    source,
                })?;
                self.outcome = Some(outcome);
                repo
            }
        };
        Ok(self.repo.insert(repo))
    }

    fn bootstrap(&self) -> std::result::Result<(Repository, BootstrapOutcome), GitError> {
        match clone_repo(&self.remote_url, &self.local_path, &self.remote) {
            Ok(repo) => {
                info!(remote = %self.remote_url, path = %self.local_path.display(), "cloned backup repository");
                Ok((repo, BootstrapOutcome::Cloned))
            }
            Err(GitError::RepositoryExists(path)) => {
                info!(path = %path.display(), "backup repository already exists; reopening");
                let repo = open_worktree(&path)?;
                let pull = pull_origin(&repo, &self.remote)?;
                match pull {
                    PullOutcome::AlreadyUpToDate => info!("backup repository already up to date"),
                    PullOutcome::FastForwarded => info!("fast-forwarded backup repository from origin"),
                }
                Ok((repo, BootstrapOutcome::Reopened { pull }))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{current_branch, push_branch};
    use crate::test_support::{bare_remote, commit_file, enabled_config};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn fresh_path_is_cloned_once() {
        let td = tempdir().unwrap();
        let remote = bare_remote(td.path());
        let work = td.path().join("work");
        let mut sync = RepositorySync::new(&enabled_config(&remote, &work));
        assert!(!sync.is_ready());

        sync.ensure_ready().unwrap();
        assert_eq!(sync.outcome(), Some(BootstrapOutcome::Cloned));
        assert!(work.join(".git").is_dir());

        // A second bootstrap would see the existing clone and report Reopened.
        sync.ensure_ready().unwrap();
        assert_eq!(sync.outcome(), Some(BootstrapOutcome::Cloned));
    }

    #[test]
    fn existing_clone_is_reopened_and_pull_up_to_date_is_not_an_error() {
        let td = tempdir().unwrap();
        let remote = bare_remote(td.path());
        let work = td.path().join("work");
        let cfg = enabled_config(&remote, &work);
        RepositorySync::new(&cfg).ensure_ready().unwrap();

        let mut sync = RepositorySync::new(&cfg);
        sync.ensure_ready().unwrap();
        assert_eq!(
            sync.outcome(),
            Some(BootstrapOutcome::Reopened {
                pull: PullOutcome::AlreadyUpToDate
            })
        );
    }

    #[test]
    fn existing_clone_picks_up_upstream_changes() {
        let td = tempdir().unwrap();
        let remote = bare_remote(td.path());
        let work = td.path().join("work");
        let cfg = enabled_config(&remote, &work);
        RepositorySync::new(&cfg).ensure_ready().unwrap();

        let other = clone_repo(&cfg.remote_url, &td.path().join("other"), &RemoteOptions::default())
            .unwrap();
        commit_file(&other, "lb9.json", r#"{"from":"other"}"#);
        let branch = current_branch(&other).unwrap();
        push_branch(&other, &branch, &RemoteOptions::default()).unwrap();

        let mut sync = RepositorySync::new(&cfg);
        sync.ensure_ready().unwrap();
        assert_eq!(
            sync.outcome(),
            Some(BootstrapOutcome::Reopened {
                pull: PullOutcome::FastForwarded
            })
        );
        assert_eq!(
            fs::read_to_string(work.join("lb9.json")).unwrap(),
            r#"{"from":"other"}"#
        );
    }

    #[test]
    fn unreachable_remote_is_fatal_and_stays_uninitialized() {
        let td = tempdir().unwrap();
        let work = td.path().join("work");
        let cfg = enabled_config(&td.path().join("missing.git"), &work);
        let mut sync = RepositorySync::new(&cfg);

        let err = sync.ensure_ready().err().unwrap();
        assert!(matches!(err, BackupError::Bootstrap { .. }));
        assert!(!sync.is_ready());
        assert_eq!(sync.outcome(), None);
    }

    #[test]
    fn non_repository_directory_is_fatal() {
        let td = tempdir().unwrap();
        let remote = bare_remote(td.path());
        let work = td.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("stray.txt"), "x").unwrap();

        let mut sync = RepositorySync::new(&enabled_config(&remote, &work));
        let err = sync.ensure_ready().err().unwrap();
        assert!(matches!(
            err,
            BackupError::Bootstrap {
                source: GitError::Git { op: "open", .. },
                ..
            }
        ));
    }
}
