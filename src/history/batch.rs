//! Batch aggregation: per-row exclusive cumulative history over a full event
//! log, one pass per entity group.

use super::{ClassTally, HistorySnapshot};
use crate::events::SeverityClass;
use chrono::NaiveDate;
use std::collections::HashMap;

/// One input row for the batch pass. `key` is the grouping entity id
/// (device or manufacturer); rows with no key get the zero snapshot.
#[derive(Debug, Clone)]
pub struct HistoryInput {
    pub key: Option<String>,
    pub severity: SeverityClass,
    pub time: NaiveDate,
}

/// Compute, for every row, the history of its entity as of the row's own
/// time, excluding the row itself. Output is positionally aligned with the
/// input.
///
/// Within a group, rows are ordered by `(time, input position)`: equal
/// timestamps fall back to insertion order, so a row sees earlier-inserted
/// same-time events as prior but never itself or later ties.
pub fn exclusive_histories(rows: &[HistoryInput]) -> Vec<HistorySnapshot> {
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        if let Some(key) = row.key.as_deref() {
            groups.entry(key).or_default().push(idx);
        }
    }

    let mut out = vec![HistorySnapshot::empty(); rows.len()];
    for indices in groups.values_mut() {
        indices.sort_by_key(|&idx| (rows[idx].time, idx));
        let mut tally = ClassTally::default();
        for &idx in indices.iter() {
            let row = &rows[idx];
            out[idx] = tally.snapshot(row.time);
            tally.observe(row.severity, row.time);
        }
    }
    out
}
