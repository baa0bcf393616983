//! Offline log ordering

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use wavelog_journal::{order_log, LogOrdering};

/// Sort key selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OrderBy {
    /// Vector clock, consistent with happened-before
    Clock,
    /// Leading wall-clock timestamp
    Timestamp,
}

impl From<OrderBy> for LogOrdering {
    fn from(by: OrderBy) -> Self {
        match by {
            OrderBy::Clock => LogOrdering::Clock,
            OrderBy::Timestamp => LogOrdering::Timestamp,
        }
    }
}

/// Arguments of `wavelog order`
#[derive(Args)]
pub struct OrderArgs {
    /// Log file to read
    pub src: PathBuf,

    /// File to write the sorted records to
    pub dst: PathBuf,

    /// Sort key
    #[arg(long, value_enum, default_value_t = OrderBy::Clock)]
    pub by: OrderBy,
}

/// Sort `src` into `dst`
pub fn run(args: &OrderArgs) -> Result<()> {
    let ordering = LogOrdering::from(args.by);
    let records = order_log(&args.src, &args.dst, ordering).with_context(|| {
        format!(
            "ordering {} into {}",
            args.src.display(),
            args.dst.display()
        )
    })?;
    info!(records, %ordering, dst = %args.dst.display(), "log ordered");
    Ok(())
}
