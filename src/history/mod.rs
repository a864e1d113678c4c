//! Point-in-time history aggregation: how many prior classified events an
//! entity had accumulated as of a cutoff, with leak-safe semantics shared by
//! the batch and online paths.

mod batch;
mod online;
mod resolve;

pub use batch::{exclusive_histories, HistoryInput};
pub use online::HistoryService;
pub use resolve::{parse_date, resolve_event_time};

use crate::events::SeverityClass;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Cutoff semantics for an online query.
///
/// `AtOrBefore` is for scoring a brand-new event that is not itself stored;
/// `Before` is strict-prior and must be used when re-scoring an event that
/// already exists in the store at the cutoff time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    Before(NaiveDate),
    AtOrBefore(NaiveDate),
}

impl Cutoff {
    pub fn admits(self, time: NaiveDate) -> bool {
        match self {
            Cutoff::Before(t) => time < t,
            Cutoff::AtOrBefore(t) => time <= t,
        }
    }

    /// The reference date used for recency arithmetic.
    pub fn as_of(self) -> NaiveDate {
        match self {
            Cutoff::Before(t) | Cutoff::AtOrBefore(t) => t,
        }
    }
}

/// Grouped prior-event counts plus the latest matching event time: the result
/// shape every store adapter must produce for one `(entity, cutoff)` query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTally {
    pub class_i: u32,
    pub class_ii: u32,
    pub class_iii: u32,
    pub last_time: Option<NaiveDate>,
}

impl ClassTally {
    /// Fold in one event. Unknown-class events are ignored entirely: they
    /// count toward neither the per-class counters nor the total.
    pub fn observe(&mut self, class: SeverityClass, time: NaiveDate) {
        match class {
            SeverityClass::ClassI => self.class_i += 1,
            SeverityClass::ClassII => self.class_ii += 1,
            SeverityClass::ClassIII => self.class_iii += 1,
            SeverityClass::Unknown => return,
        }
        self.last_time = Some(match self.last_time {
            Some(prev) => prev.max(time),
            None => time,
        });
    }

    /// Fold in a pre-grouped row (one severity label, its count, its max
    /// time), as returned by aggregation-capable stores.
    pub fn observe_group(&mut self, class: SeverityClass, count: u32, last: Option<NaiveDate>) {
        if count == 0 {
            return;
        }
        match class {
            SeverityClass::ClassI => self.class_i += count,
            SeverityClass::ClassII => self.class_ii += count,
            SeverityClass::ClassIII => self.class_iii += count,
            SeverityClass::Unknown => return,
        }
        if let Some(t) = last {
            self.last_time = Some(match self.last_time {
                Some(prev) => prev.max(t),
                None => t,
            });
        }
    }

    pub fn total(&self) -> u32 {
        self.class_i + self.class_ii + self.class_iii
    }

    /// Finish the aggregate relative to `as_of`. This is the single place the
    /// total and the recency arithmetic are defined.
    pub fn snapshot(&self, as_of: NaiveDate) -> HistorySnapshot {
        HistorySnapshot {
            class_i: self.class_i,
            class_ii: self.class_ii,
            class_iii: self.class_iii,
            total: self.total(),
            last_prior_time: self.last_time,
            days_since_prior: match self.last_time {
                Some(last) => (as_of - last).num_days(),
                None => -1,
            },
        }
    }
}

/// Prior-event counts for one entity as of one cutoff. Ephemeral, computed
/// fresh per row or per request, never persisted.
///
/// `days_since_prior` is `-1` when no prior event exists; `0` means a prior
/// event on the same day. The two must never be conflated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub class_i: u32,
    pub class_ii: u32,
    pub class_iii: u32,
    pub total: u32,
    pub last_prior_time: Option<NaiveDate>,
    pub days_since_prior: i64,
}

impl HistorySnapshot {
    /// Zero history: the defined result for an entity with no prior events.
    pub fn empty() -> Self {
        HistorySnapshot {
            class_i: 0,
            class_ii: 0,
            class_iii: 0,
            total: 0,
            last_prior_time: None,
            days_since_prior: -1,
        }
    }
}
