//! Crate entry point for **lbmirror**.
//!
//! lbmirror keeps a git-backed mirror of load-balancer configuration
//! records: each mutating API call hands a batch of `{id, data}` records to
//! [`BackupService::commit`], which writes them as `<id>.json` into a local
//! clone, commits with a fixed identity and pushes to the remote.
//!
//! Each submodule encapsulates one step (bootstrap, writing, publishing),
//! with `git` being the only module that talks to libgit2. The `pub use`
//! re-exports make the service and the CLI commands available from the
//! crate root.

mod backup;
mod config;
mod error;
mod git;
mod logging;
mod paths;
mod publish;
mod record;
mod service;
mod sync;
mod writer;

#[cfg(test)]
mod test_support;

pub use backup::cmd_commit;
pub use config::{BackupConfig, CREDENTIAL_ENV, cmd_config, load_config, parse_config};
pub use error::{BackupError, DecodeError, Result};
pub use git::{GitError, PullOutcome, RemoteOptions};
pub use logging::init_logging;
pub use paths::{Paths, lbmirror_home, paths};
pub use publish::COMMIT_MESSAGE;
pub use record::{BackupBatch, BackupRecord};
pub use service::{BackupService, CommitReport};
pub use sync::{BootstrapOutcome, RepositorySync};
pub use writer::{SkippedRecord, WriteReport};
