use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use crate::config::BackupConfig;
use crate::error::Result;
use crate::publish::CommitPublisher;
use crate::record::BackupBatch;
use crate::sync::{BootstrapOutcome, RepositorySync};
use crate::writer::{WriteReport, write_batch};

/// What a call to [`BackupService::commit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitReport {
    /// Backup is turned off; nothing was inspected or touched.
    Disabled,
    Published {
        write: WriteReport,
        commit: String,
        branch: String,
    },
}

/// Mirrors record batches into a git repository and pushes them.
///
/// The service owns its configuration and the local repository handle.
/// Calls are serialized: the whole bootstrap, write, commit and push
/// sequence runs under one lock.
pub struct BackupService {
    config: BackupConfig,
    sync: Mutex<RepositorySync>,
}

impl BackupService {
    pub fn new(config: BackupConfig) -> Self {
        let sync = Mutex::new(RepositorySync::new(&config));
        Self { config, sync }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Outcome of the one-time bootstrap, `None` until the first
    /// successful enabled call.
    pub fn bootstrap_outcome(&self) -> Option<BootstrapOutcome> {
        self.sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome()
    }

    /// Back up `batch`, which must serialize to `{"records": [{"id", "data"}]}`.
    ///
    /// When backup is disabled this returns [`CommitReport::Disabled`]
    /// without looking at `batch`.
    ///
    /// # Errors
    /// The first fatal error of decode, bootstrap, write, commit or push.
    /// Records that failed to stage are not errors; see
    /// [`WriteReport::skipped`].
    pub fn commit<T: Serialize + ?Sized>(&self, batch: &T) -> Result<CommitReport> {
        if !self.config.enabled {
            debug!("backup disabled; skipping");
            return Ok(CommitReport::Disabled);
        }

        let batch = BackupBatch::decode(batch)?;
        // The lock only guards a handle that is either fully bootstrapped or
        // absent, so a panic in another caller leaves it usable.
        let mut sync = self.sync.lock().unwrap_or_else(PoisonError::into_inner);
        let remote = sync.remote().clone();
        let repo = sync.ensure_ready()?;

        let write = write_batch(repo, &batch)?;
        info!(
            records = batch.len(),
            staged = write.staged.len(),
            skipped = write.skipped.len(),
            "wrote backup records"
        );

        let published = CommitPublisher::new(repo, &self.config, &remote).publish()?;
        Ok(CommitReport::Published {
            write,
            commit: published.commit,
            branch: published.branch,
        })
    }
}
