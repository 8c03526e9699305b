use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{BackupError, Result};
use crate::git::{GitError, Repository, Staging};
use crate::record::BackupBatch;

/// Index operations the writer needs.
///
/// Implemented by [`Staging`]; tests substitute a stager that fails on
/// chosen paths to exercise the best-effort policy.
pub trait Stager {
    fn stage(&mut self, rel: &Path) -> std::result::Result<(), GitError>;
    fn persist(&mut self) -> std::result::Result<(), GitError>;
}

impl Stager for Staging {
    fn stage(&mut self, rel: &Path) -> std::result::Result<(), GitError> {
        self.add(rel)
    }

    fn persist(&mut self) -> std::result::Result<(), GitError> {
        self.write()
    }
}

/// A record whose file was written but could not be staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: String,
}

/// Which ids of a batch made it into the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub staged: Vec<String>,
    pub skipped: Vec<SkippedRecord>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Writes `<id>.json` files into a working tree and stages them.
pub struct RecordWriter<'a, S> {
    root: PathBuf,
    stager: &'a mut S,
}

impl<'a, S: Stager> RecordWriter<'a, S> {
    pub fn new(root: impl Into<PathBuf>, stager: &'a mut S) -> Self {
        Self {
            root: root.into(),
            stager,
        }
    }

    /// Write and stage every record in batch order.
    ///
    /// All payloads are encoded before the first file is touched, so an
    /// encode failure leaves the working tree unchanged. A failed file write
    /// aborts the batch. A failed stage only skips that record. The index is
    /// persisted after every staged record, so an interrupted batch leaves
    /// its finished files tracked.
    pub fn write(self, batch: &BackupBatch) -> Result<WriteReport> {
        let encoded = batch
            .records
            .iter()
            .map(|rec| {
                serde_json::to_vec(&rec.data)
                    .map(|bytes| (rec, bytes))
                    .map_err(|source| BackupError::Encode {
                        id: rec.id.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut report = WriteReport::default();
        for (rec, bytes) in encoded {
            let rel = PathBuf::from(rec.file_name());
            let path = self.root.join(&rel);
            fs::write(&path, &bytes).map_err(|source| BackupError::Write {
                path: path.clone(),
                source,
            })?;

            match self.stager.stage(&rel) {
                Ok(()) => {
                    self.stager.persist().map_err(BackupError::Index)?;
                    debug!(id = %rec.id, bytes = bytes.len(), "staged record");
                    report.staged.push(rec.id.clone());
                }
                Err(e) => {
                    warn!(id = %rec.id, error = %e, "failed to stage record; leaving it out of this commit");
                    report.skipped.push(SkippedRecord {
                        id: rec.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}

/// Write `batch` into the working tree of `repo` using its index.
///
/// Record files an earlier call wrote but never staged (a crash, or a
/// skipped record) are staged first so this commit carries them.
pub fn write_batch(repo: &Repository, batch: &BackupBatch) -> Result<WriteReport> {
    let root = repo
        .workdir()
        .ok_or_else(|| BackupError::Index(GitError::Bare(repo.path().to_path_buf())))?
        .to_path_buf();
    let mut staging = Staging::open(repo).map_err(BackupError::Index)?;

    match staging.add_leftover_records() {
        Ok(picked) if picked.is_empty() => {}
        Ok(picked) => {
            staging.write().map_err(BackupError::Index)?;
            info!(count = picked.len(), "staged records left over from an earlier call");
        }
        Err(e) => warn!(error = %e, "failed to stage leftover records"),
    }

    RecordWriter::new(root, &mut staging).write(batch)
}
