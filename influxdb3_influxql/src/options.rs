use std::time::Duration;

use crate::{Expr, Sources};

/// Window used to group points by time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub duration: Duration,
    pub offset: Duration,
}

/// Options passed, unchanged, to every iterator opened for a query.
#[derive(Debug, Clone)]
pub struct IteratorOptions {
    /// Auxiliary fields projected alongside the primary value.
    pub aux: Vec<String>,

    /// Measurements the query reads from.
    pub sources: Sources,

    /// Time window for `GROUP BY time(...)`.
    pub interval: Interval,

    /// Tag keys of the `GROUP BY` clause.
    pub dimensions: Vec<String>,

    /// Tag predicate used to select series.
    pub condition: Option<Expr>,

    /// Inclusive time range in nanoseconds.
    pub start_time: i64,
    pub end_time: i64,

    /// Iterate points in ascending time order.
    pub ascending: bool,

    /// Point limit and offset (`LIMIT`, `OFFSET`).
    pub limit: usize,
    pub offset: usize,

    /// Series limit and offset (`SLIMIT`, `SOFFSET`). Zero means unbounded.
    pub slimit: usize,
    pub soffset: usize,

    /// Remove duplicate points.
    pub dedupe: bool,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            aux: vec![],
            sources: Sources::default(),
            interval: Interval::default(),
            dimensions: vec![],
            condition: None,
            start_time: i64::MIN,
            end_time: i64::MAX,
            ascending: true,
            limit: 0,
            offset: 0,
            slimit: 0,
            soffset: 0,
            dedupe: false,
        }
    }
}

impl IteratorOptions {
    /// Returns true if `time` falls within the options' time range.
    pub fn contains_time(&self, time: i64) -> bool {
        self.start_time <= time && time <= self.end_time
    }
}
