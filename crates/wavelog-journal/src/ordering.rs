//! Total orders over log records and the file merge
//!
//! Vector clocks only order events partially, but a sort needs a total order.
//! [`ClockKey`] orders clocks by the sum of their entries first, then by the
//! entry list itself (zero entries dropped). The sum strictly grows along
//! happened-before, so every causally ordered pair keeps its order;
//! concurrent clocks fall back to the entry list, which is deterministic;
//! equal clocks get equal keys and keep their input order under the stable
//! sort.

use crate::error::{LogError, LogResult};
use crate::record::LogRecord;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use wavelog_core::{PeerId, VectorClock};

/// Which field of a record drives the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LogOrdering {
    /// Embedded vector clock
    #[default]
    Clock,
    /// Leading wall-clock timestamp
    Timestamp,
}

impl fmt::Display for LogOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogOrdering::Clock => f.write_str("clock"),
            LogOrdering::Timestamp => f.write_str("timestamp"),
        }
    }
}

impl FromStr for LogOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clock" | "vc" => Ok(LogOrdering::Clock),
            "timestamp" | "ts" => Ok(LogOrdering::Timestamp),
            other => Err(format!("unknown log ordering '{other}'")),
        }
    }
}

/// Sort key of a clock. See the module docs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockKey {
    total: u128,
    entries: Vec<(PeerId, u64)>,
}

impl From<&VectorClock> for ClockKey {
    fn from(clock: &VectorClock) -> Self {
        Self {
            total: clock.total(),
            entries: clock
                .entries()
                .filter(|(_, value)| *value > 0)
                .map(|(pid, value)| (pid.clone(), value))
                .collect(),
        }
    }
}

/// Precomputed sort key of one record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordKey {
    /// Clock-ordered key
    Clock(ClockKey),
    /// Timestamp-ordered key
    Timestamp(u64),
}

impl RecordKey {
    /// Extract the key `ordering` needs from `record`
    pub fn of(record: &LogRecord, ordering: LogOrdering) -> LogResult<Self> {
        match ordering {
            LogOrdering::Clock => Ok(RecordKey::Clock(ClockKey::from(&record.clock()?))),
            LogOrdering::Timestamp => Ok(RecordKey::Timestamp(record.timestamp()?)),
        }
    }
}

/// Order two records by their embedded vector clocks.
///
/// Agrees with happened-before on causally related records and returns
/// `Equal` only for equal clocks.
pub fn compare_by_clock(a: &LogRecord, b: &LogRecord) -> LogResult<Ordering> {
    let a = ClockKey::from(&a.clock()?);
    let b = ClockKey::from(&b.clock()?);
    Ok(a.cmp(&b))
}

/// Order two records numerically by their leading timestamps.
pub fn compare_by_timestamp(a: &LogRecord, b: &LogRecord) -> LogResult<Ordering> {
    Ok(a.timestamp()?.cmp(&b.timestamp()?))
}

/// Stable sort of `records` under `ordering`.
///
/// Every key is extracted before sorting, so a malformed record fails the
/// whole call and nothing is reordered.
pub fn order_records(records: Vec<LogRecord>, ordering: LogOrdering) -> LogResult<Vec<LogRecord>> {
    let mut keyed = records
        .into_iter()
        .map(|record| Ok((RecordKey::of(&record, ordering)?, record)))
        .collect::<LogResult<Vec<_>>>()?;
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}

/// Read every record of `source`, sort them and write them to `dest`, one
/// per line. Blank lines are skipped. Returns the number of records written.
pub fn order_log(source: &Path, dest: &Path, ordering: LogOrdering) -> LogResult<usize> {
    let contents = fs::read_to_string(source).map_err(|e| LogError::io(source, e))?;
    let records = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(LogRecord::new)
        .collect();
    let ordered = order_records(records, ordering)?;
    write_records(dest, &ordered)?;
    tracing::debug!(
        source = %source.display(),
        dest = %dest.display(),
        records = ordered.len(),
        %ordering,
        "log ordered"
    );
    Ok(ordered.len())
}

/// Write `records` to `path`, replacing its contents.
pub fn write_records(path: &Path, records: &[LogRecord]) -> LogResult<()> {
    let file = fs::File::create(path).map_err(|e| LogError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        writeln!(writer, "{record}").map_err(|e| LogError::io(path, e))?;
    }
    writer.flush().map_err(|e| LogError::io(path, e))
}
