//! Object metadata records.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata for one stored object: an opaque unique id, the filesystem
/// location of its bytes, and its creation time.
///
/// Records are what the append-only log persists; the blob bytes themselves
/// live at `path` and are never written to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Globally unique object id (UUID v4).
    pub id: String,
    /// Filesystem location of the blob bytes. Unique among live records.
    pub path: PathBuf,
    /// Creation timestamp. Unchanged by content updates.
    pub created: DateTime<Utc>,
}

impl ObjectRecord {
    /// Mint a record for a freshly created object at `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path,
            created: Utc::now(),
        }
    }

    /// Content type inferred from the path's extension, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        mime_guess::from_path(&self.path).first_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_mint_unique_ids() {
        let a = ObjectRecord::new(PathBuf::from("a.txt"));
        let b = ObjectRecord::new(PathBuf::from("b.txt"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_should_round_trip_record_through_json() {
        let record = ObjectRecord::new(PathBuf::from("data/report.pdf"));
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ObjectRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_should_infer_content_type_from_extension() {
        let record = ObjectRecord::new(PathBuf::from("notes.txt"));
        assert_eq!(record.content_type(), Some("text/plain"));

        let record = ObjectRecord::new(PathBuf::from("blob.withoutanytype"));
        assert_eq!(record.content_type(), None);
    }
}
