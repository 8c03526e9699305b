use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;

/// One record destined for the mirror.
///
/// `id` is the file stem of `<id>.json` in the working tree, so it must be
/// stable across calls and a plain file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

impl BackupRecord {
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }
}

/// An ordered set of records submitted in one backup call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupBatch {
    #[serde(default)]
    pub records: Vec<BackupRecord>,
}

impl BackupBatch {
    /// Re-encode an arbitrary caller value into a batch through JSON.
    ///
    /// The value must serialize to `{"records": [{"id": ..., "data": ...}]}`.
    /// A missing `data` becomes `null`; a missing `records` is an empty batch.
    /// Ids are checked here so nothing is written for an invalid batch.
    pub fn decode<T: Serialize + ?Sized>(value: &T) -> Result<Self, DecodeError> {
        let json = serde_json::to_value(value)?;
        let batch: BackupBatch = serde_json::from_value(json)?;
        batch.check_ids()?;
        Ok(batch)
    }

    fn check_ids(&self) -> Result<(), DecodeError> {
        for (index, rec) in self.records.iter().enumerate() {
            if rec.id.is_empty() {
                return Err(DecodeError::EmptyId { index });
            }
            if !is_plain_file_stem(&rec.id) {
                return Err(DecodeError::UnsafeId { id: rec.id.clone() });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// `<id>.json` must land at the working tree root.
fn is_plain_file_stem(id: &str) -> bool {
    !id.contains(['/', '\\', '\0'])
}
