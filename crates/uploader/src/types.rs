//! Events and snapshots reported by the upload engine.

use upqueue_transfer::{RecordKey, UploadRecord};

/// Snapshot of one queued record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordProgress {
    pub key: RecordKey,
    pub filename: Option<String>,
    /// Bytes acknowledged by the server. May exceed `length` on the last
    /// chunk, since the offset advances by whole chunks.
    pub position: u64,
    /// Payload size; 0 while the file is still being read.
    pub length: u64,
}

impl RecordProgress {
    /// Fraction uploaded in `[0.0, 1.0]`. 0.0 while the length is unknown.
    pub fn fraction(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        (self.position.min(self.length) as f64) / (self.length as f64)
    }
}

impl From<&UploadRecord> for RecordProgress {
    fn from(record: &UploadRecord) -> Self {
        Self {
            key: record.key(),
            filename: record.filename().map(str::to_string),
            position: record.position(),
            length: record.length(),
        }
    }
}

/// Events emitted by the upload engine.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// State of the active record after a chunk response or a completion.
    /// `None` when the queue is empty.
    Progress(Option<RecordProgress>),

    /// A record was fully acknowledged and removed from the store.
    FileComplete {
        key: RecordKey,
        filename: Option<String>,
    },

    /// A record was dropped without being uploaded.
    Failed {
        key: RecordKey,
        filename: Option<String>,
        error: String,
    },

    /// A response arrived for a record that is no longer stored.
    Orphaned { key: RecordKey },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_clamps_overshoot() {
        let p = RecordProgress {
            key: 1,
            filename: None,
            position: 122_880,
            length: 115_063,
        };
        assert_eq!(p.fraction(), 1.0);
    }

    #[test]
    fn fraction_unknown_length() {
        let p = RecordProgress {
            key: 1,
            filename: Some("a".into()),
            position: 0,
            length: 0,
        };
        assert_eq!(p.fraction(), 0.0);
    }

    #[test]
    fn from_record() {
        let mut record = UploadRecord::new(4);
        record.set_filename("clip.mp4");
        record.set_data(vec![0; 100]);
        record.set_position(40);

        let p = RecordProgress::from(&record);
        assert_eq!(p.key, 4);
        assert_eq!(p.filename.as_deref(), Some("clip.mp4"));
        assert_eq!(p.position, 40);
        assert_eq!(p.length, 100);
        assert!((p.fraction() - 0.4).abs() < f64::EPSILON);
    }
}
