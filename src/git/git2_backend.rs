use git2::{
    Cred, CredentialType, ErrorCode, FetchOptions, Index, IndexAddOption, IndexMatchedPath, Oid,
    PushOptions, RemoteCallbacks, Repository, Signature,
    build::{CheckoutBuilder, RepoBuilder},
};
use std::ffi::c_int;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::BackupConfig;

/// Typed classification of git failures.
///
/// The variants other than [`GitError::Git`] are conditions callers are
/// expected to match on; `Git` carries everything else from libgit2.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("{} already exists and is not an empty directory", .0.display())]
    RepositoryExists(PathBuf),

    #[error("repository at {} has no working tree", .0.display())]
    Bare(PathBuf),

    #[error("HEAD does not point at a local branch")]
    DetachedHead,

    #[error("local branch {branch} has diverged from origin/{branch}")]
    NonFastForward { branch: String },

    #[error("remote rejected {reference}: {message}")]
    Rejected { reference: String, message: String },

    #[error("{op} timed out after {}s", .after.as_secs())]
    TimedOut { op: &'static str, after: Duration },

    #[error("{op}: {source}")]
    Git {
        op: &'static str,
        #[source]
        source: git2::Error,
    },
}

impl GitError {
    fn git(op: &'static str) -> impl FnOnce(git2::Error) -> GitError {
        move |source| GitError::Git { op, source }
    }
}

/// Result of reconciling the local branch with `origin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Nothing to merge, including a remote that has no such branch yet.
    AlreadyUpToDate,
    FastForwarded,
}

/// Authentication and deadline applied to every network operation.
#[derive(Clone, Default)]
pub struct RemoteOptions {
    pub username: String,
    pub credential: String,
    pub timeout: Option<Duration>,
}

impl RemoteOptions {
    pub fn from_config(cfg: &BackupConfig) -> Self {
        Self {
            username: cfg.remote_username.clone(),
            credential: cfg.remote_credential.clone(),
            timeout: cfg.network_timeout(),
        }
    }
}

#[derive(Clone, Copy)]
struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    fn start(limit: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    fn expired(&self) -> bool {
        self.limit.is_some_and(|l| self.started.elapsed() >= l)
    }

    /// Attribute a transport failure to the deadline when it has passed or
    /// the socket layer gave up. An aborted callback surfaces as a generic
    /// user error, a silent peer as `ErrorCode::Timeout`.
    fn classify(&self, op: &'static str, source: git2::Error) -> GitError {
        match self.limit {
            Some(after) if self.expired() || source.code() == ErrorCode::Timeout => {
                GitError::TimedOut { op, after }
            }
            _ => GitError::Git { op, source },
        }
    }
}

// libgit2 keeps its socket timeouts in process globals.
static SOCKET_TIMEOUTS: Mutex<()> = Mutex::new(());

/// Apply `limit` to libgit2's connect and read/write socket timeouts.
///
/// Callbacks only run while data is moving, so a peer that accepts the
/// connection and then goes silent is only caught at the socket layer.
/// The returned guard must be held for the whole network operation: the
/// values are read when a stream is opened and are shared by every thread.
fn arm_socket_timeouts(limit: Option<Duration>) -> Result<MutexGuard<'static, ()>, GitError> {
    let guard = SOCKET_TIMEOUTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let ms = limit.map_or(0, |l| c_int::try_from(l.as_millis()).unwrap_or(c_int::MAX).max(1));
    // SAFETY: every writer holds SOCKET_TIMEOUTS, and libgit2 only reads the
    // values when this crate opens a stream under the same guard.
    unsafe {
        git2::opts::set_server_connect_timeout_in_milliseconds(ms)
            .map_err(GitError::git("set connect timeout"))?;
        git2::opts::set_server_timeout_in_milliseconds(ms)
            .map_err(GitError::git("set socket timeout"))?;
    }
    Ok(guard)
}

/// Build callbacks with basic-auth credentials and deadline checks.
///
/// Username/credential from the configuration are offered for
/// plaintext auth. SSH remotes fall back to the user's SSH agent, anything
/// else to default credentials. Progress callbacks cancel the transfer once
/// the deadline has passed.
fn remote_callbacks(opts: &RemoteOptions, deadline: Deadline) -> RemoteCallbacks<'_> {
    let mut cb = RemoteCallbacks::new();
    let mut attempts = 0u32;
    cb.credentials(move |_url, username_from_url, allowed| {
        attempts += 1;
        if attempts > 3 {
            return Err(git2::Error::from_str("remote rejected the configured credentials"));
        }
        if deadline.expired() {
            return Err(git2::Error::from_str("network deadline exceeded"));
        }
        let user = if opts.username.is_empty() {
            username_from_url.unwrap_or("git")
        } else {
            opts.username.as_str()
        };
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) && !opts.credential.is_empty() {
            Cred::userpass_plaintext(user, &opts.credential)
        } else if allowed.contains(CredentialType::USERNAME) {
            Cred::username(user)
        } else if allowed.contains(CredentialType::SSH_KEY) {
            Cred::ssh_key_from_agent(user)
        } else {
            Cred::default()
        }
    });
    cb.transfer_progress(move |_| !deadline.expired());
    cb.sideband_progress(move |_| !deadline.expired());
    cb
}

/// Clone `url` into `dest`.
///
/// A destination that already exists and is non-empty is reported as
/// [`GitError::RepositoryExists`]; the caller decides whether to reopen it.
///
/// # Errors
/// Any other clone failure, or [`GitError::TimedOut`] past the deadline.
pub fn clone_repo(url: &str, dest: &Path, opts: &RemoteOptions) -> Result<Repository, GitError> {
    let _sockets = arm_socket_timeouts(opts.timeout)?;
    let deadline = Deadline::start(opts.timeout);
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(remote_callbacks(opts, deadline));

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fo);
    builder.clone(url, dest).map_err(|e| {
        if e.code() == ErrorCode::Exists {
            GitError::RepositoryExists(dest.to_path_buf())
        } else {
            deadline.classify("clone", e)
        }
    })
}

/// Open an existing repository that has a working tree.
pub fn open_worktree(path: &Path) -> Result<Repository, GitError> {
    let repo = Repository::open(path).map_err(GitError::git("open"))?;
    if repo.is_bare() || repo.workdir().is_none() {
        return Err(GitError::Bare(path.to_path_buf()));
    }
    Ok(repo)
}

/// Short name of the branch HEAD points at. Works on an unborn branch.
pub fn current_branch(repo: &Repository) -> Result<String, GitError> {
    let head = repo
        .find_reference("HEAD")
        .map_err(GitError::git("resolve HEAD"))?;
    head.symbolic_target()
        .and_then(|t| t.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .ok_or(GitError::DetachedHead)
}

/// Perform `git fetch origin` to update remote-tracking branches.
fn fetch_origin(repo: &Repository, opts: &RemoteOptions) -> Result<(), GitError> {
    let _sockets = arm_socket_timeouts(opts.timeout)?;
    let deadline = Deadline::start(opts.timeout);
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(remote_callbacks(opts, deadline));

    let mut remote = repo
        .find_remote("origin")
        .map_err(GitError::git("find remote origin"))?;
    remote
        .fetch(&["refs/heads/*:refs/remotes/origin/*"], Some(&mut fo), None)
        .map_err(|e| deadline.classify("fetch origin", e))
}

/// `git pull origin <current branch>`, fast-forward only.
///
/// The working tree is checked out with a safe strategy before the branch
/// ref moves, so local modifications that do not conflict survive.
///
/// # Errors
/// - [`GitError::NonFastForward`] when local and remote history diverged.
/// - Fetch or checkout failures.
pub fn pull_origin(repo: &Repository, opts: &RemoteOptions) -> Result<PullOutcome, GitError> {
    let branch = current_branch(repo)?;
    fetch_origin(repo, opts)?;

    let tracking = format!("refs/remotes/origin/{}", branch);
    let remote_ref = match repo.find_reference(&tracking) {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(PullOutcome::AlreadyUpToDate),
        Err(e) => return Err(GitError::git("pull")(e)),
    };
    let fetched = repo
        .reference_to_annotated_commit(&remote_ref)
        .map_err(GitError::git("pull"))?;
    let (analysis, _) = repo
        .merge_analysis(&[&fetched])
        .map_err(GitError::git("merge analysis"))?;

    if analysis.is_up_to_date() {
        return Ok(PullOutcome::AlreadyUpToDate);
    }
    if !(analysis.is_fast_forward() || analysis.is_unborn()) {
        return Err(GitError::NonFastForward { branch });
    }

    let target = repo
        .find_commit(fetched.id())
        .map_err(GitError::git("pull"))?;
    repo.checkout_tree(target.as_object(), Some(CheckoutBuilder::new().safe()))
        .map_err(GitError::git("checkout"))?;
    let local = format!("refs/heads/{}", branch);
    repo.reference(&local, target.id(), true, "pull: fast-forward")
        .map_err(GitError::git("update branch"))?;
    repo.set_head(&local).map_err(GitError::git("update HEAD"))?;
    Ok(PullOutcome::FastForwarded)
}

/// Thin wrapper over the repository index for per-file staging.
pub struct Staging {
    index: Index,
}

impl Staging {
    pub fn open(repo: &Repository) -> Result<Self, GitError> {
        let index = repo.index().map_err(GitError::git("open index"))?;
        Ok(Self { index })
    }

    /// Stage one path relative to the working tree root.
    pub fn add(&mut self, rel: &Path) -> Result<(), GitError> {
        self.index.add_path(rel).map_err(GitError::git("stage"))
    }

    /// Stage `*.json` files at the working tree root that are untracked or
    /// modified, such as records written by a call that never reached its
    /// commit. Returns the paths picked up.
    pub fn add_leftover_records(&mut self) -> Result<Vec<PathBuf>, GitError> {
        let mut picked = Vec::new();
        let cb: &mut IndexMatchedPath<'_> = &mut |path: &Path, _: &[u8]| -> i32 {
            if path.components().count() == 1 {
                picked.push(path.to_path_buf());
                0
            } else {
                1
            }
        };
        self.index
            .add_all(["*.json"], IndexAddOption::DEFAULT, Some(cb))
            .map_err(GitError::git("stage leftovers"))?;
        Ok(picked)
    }

    /// Persist the in-memory index to disk.
    pub fn write(&mut self) -> Result<(), GitError> {
        self.index.write().map_err(GitError::git("write index"))
    }
}

/// Commit every staged and modified tracked file on the current branch.
///
/// Equivalent to `git commit -a -m <message>` with an explicit identity:
/// tracked files changed in the working tree are swept into the index first.
/// On an unborn branch the commit has no parent.
pub fn commit_all(
    repo: &Repository,
    author_name: &str,
    author_email: &str,
    message: &str,
) -> Result<Oid, GitError> {
    let mut index = repo.index().map_err(GitError::git("open index"))?;
    index
        .update_all(["*"], None)
        .map_err(GitError::git("stage modified files"))?;
    index.write().map_err(GitError::git("write index"))?;

    let tree_id = index.write_tree().map_err(GitError::git("write tree"))?;
    let tree = repo.find_tree(tree_id).map_err(GitError::git("write tree"))?;
    let sig = Signature::now(author_name, author_email).map_err(GitError::git("signature"))?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit().map_err(GitError::git("resolve HEAD"))?),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => None,
        Err(e) => return Err(GitError::git("resolve HEAD")(e)),
    };
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .map_err(GitError::git("commit"))
}

/// Look `oid` up in the object store and confirm it is a commit.
pub fn resolve_commit(repo: &Repository, oid: Oid) -> Result<String, GitError> {
    let commit = repo.find_commit(oid).map_err(GitError::git("resolve commit"))?;
    Ok(commit.id().to_string())
}

/// Push `refs/heads/<branch>` to the same ref on `origin`.
///
/// A per-ref rejection reported by the remote is returned as
/// [`GitError::Rejected`] even though the transport call itself succeeded.
/// The deadline is checked again once the remote has advertised its refs,
/// before the pack is uploaded.
pub fn push_branch(repo: &Repository, branch: &str, opts: &RemoteOptions) -> Result<(), GitError> {
    let _sockets = arm_socket_timeouts(opts.timeout)?;
    let deadline = Deadline::start(opts.timeout);
    let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
    let mut remote = repo
        .find_remote("origin")
        .map_err(GitError::git("find remote origin"))?;

    let mut rejection: Option<(String, String)> = None;
    {
        let mut cb = remote_callbacks(opts, deadline);
        cb.push_negotiation(move |_| {
            if deadline.expired() {
                return Err(git2::Error::from_str("network deadline exceeded"));
            }
            Ok(())
        });
        cb.push_update_reference(|reference, status| {
            if let Some(message) = status {
                rejection = Some((reference.to_string(), message.to_string()));
            }
            Ok(())
        });
        let mut po = PushOptions::new();
        po.remote_callbacks(cb);
        remote
            .push(&[refspec.as_str()], Some(&mut po))
            .map_err(|e| deadline.classify("push", e))?;
    }

    match rejection {
        Some((reference, message)) => Err(GitError::Rejected { reference, message }),
        None => Ok(()),
    }
}
