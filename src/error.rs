//! Error types for the backup pipeline.
//!
//! Every variant of [`BackupError`] is fatal for the call that produced it.
//! The two benign conditions ("repository already exists" on clone and
//! "already up to date" on pull) never surface here; they are absorbed by
//! the bootstrap state machine and only logged.

use std::path::PathBuf;
use thiserror::Error;

use crate::git::GitError;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup batch rejected: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to bootstrap repository at {}", .path.display())]
    Bootstrap {
        path: PathBuf,
        #[source]
        source: GitError,
    },

    #[error("failed to encode record {id:?}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load or persist the index")]
    Index(#[source] GitError),

    #[error("failed to create commit")]
    Commit(#[source] GitError),

    #[error("failed to push {branch} to origin")]
    Push {
        branch: String,
        #[source]
        source: GitError,
    },
}

/// Why a caller-supplied value is not a usable batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("value does not match {{\"records\": [{{\"id\", \"data\"}}]}}: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("record #{index} has an empty id")]
    EmptyId { index: usize },

    #[error("record id {id:?} is not a plain file name")]
    UnsafeId { id: String },
}
