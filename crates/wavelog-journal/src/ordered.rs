//! Incrementally merged log kept by the leader.

use crate::error::LogResult;
use crate::ordering::{write_records, LogOrdering, RecordKey};
use crate::record::LogRecord;
use std::path::{Path, PathBuf};

/// Sorted record sequence backed by a file.
///
/// Inserts place a record after every record with an equal key, so arrival
/// order decides among ties.
#[derive(Debug)]
pub struct OrderedLog {
    path: PathBuf,
    ordering: LogOrdering,
    records: Vec<(RecordKey, LogRecord)>,
}

impl OrderedLog {
    /// Empty ordered log that [`OrderedLog::flush`] writes to `path`
    pub fn new(path: impl Into<PathBuf>, ordering: LogOrdering) -> Self {
        Self {
            path: path.into(),
            ordering,
            records: Vec::new(),
        }
    }

    /// Insert one record at its sorted position
    pub fn insert(&mut self, record: impl Into<LogRecord>) -> LogResult<()> {
        let record = record.into();
        let key = RecordKey::of(&record, self.ordering)?;
        let at = self.records.partition_point(|(existing, _)| *existing <= key);
        self.records.insert(at, (key, record));
        Ok(())
    }

    /// Insert every record, stopping at the first malformed one
    pub fn extend<I, R>(&mut self, records: I) -> LogResult<usize>
    where
        I: IntoIterator<Item = R>,
        R: Into<LogRecord>,
    {
        let mut inserted = 0;
        for record in records {
            self.insert(record)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Records in order
    pub fn records(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter().map(|(_, record)| record)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no record was inserted
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// File this log is written to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the backing file with the current contents
    pub fn flush(&self) -> LogResult<()> {
        let records: Vec<LogRecord> = self.records().cloned().collect();
        write_records(&self.path, &records)?;
        tracing::debug!(path = %self.path.display(), records = records.len(), "ordered log written");
        Ok(())
    }
}
