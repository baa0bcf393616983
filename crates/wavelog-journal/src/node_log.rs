//! Per-peer log file
//!
//! Each node appends clock-stamped records to its own file. A line cursor
//! remembers how much of the file was already handed to a collection wave so
//! every record ships exactly once.

use crate::error::{LogError, LogResult};
use crate::record::LogRecord;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use wavelog_core::VectorClock;

/// Append-only log of one node
#[derive(Debug)]
pub struct NodeLog {
    path: PathBuf,
    file: File,
    shipped: usize,
}

impl NodeLog {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: impl Into<PathBuf>) -> LogResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LogError::io(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| LogError::io(&path, e))?;
        Ok(Self {
            path,
            file,
            shipped: 0,
        })
    }

    /// File backing this log
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record
    pub fn append(&mut self, record: &LogRecord) -> LogResult<()> {
        writeln!(self.file, "{record}").map_err(|e| LogError::io(&self.path, e))?;
        self.file.flush().map_err(|e| LogError::io(&self.path, e))
    }

    /// Stamp `text` with the current clock, append it, then tick the clock.
    pub fn stamp(&mut self, clock: &mut VectorClock, text: &str) -> LogResult<LogRecord> {
        let record = LogRecord::now(clock, text);
        self.append(&record)?;
        clock.event();
        Ok(record)
    }

    /// Records appended since the previous call.
    pub fn take_unshipped(&mut self) -> LogResult<Vec<String>> {
        let contents = fs::read_to_string(&self.path).map_err(|e| LogError::io(&self.path, e))?;
        let fresh: Vec<String> = contents
            .lines()
            .skip(self.shipped)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        self.shipped = contents.lines().count();
        Ok(fresh)
    }

    /// Lines already handed out by [`NodeLog::take_unshipped`]
    pub fn shipped(&self) -> usize {
        self.shipped
    }
}
