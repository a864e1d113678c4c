//! Canonical event time: first candidate field that parses wins.

use crate::events::RecallEvent;
use chrono::NaiveDate;

/// Parse one cleaned date string (`%Y-%m-%d`). Malformed input degrades to
/// `None`, identical to a missing value.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Resolve the canonical event time for a record, or `None` when no candidate
/// parses. Events without a resolvable time are excluded from all
/// aggregation; both aggregation modes and every store adapter go through
/// this one function.
pub fn resolve_event_time(event: &RecallEvent) -> Option<NaiveDate> {
    [&event.date, &event.date_posted, &event.date_updated]
        .into_iter()
        .find_map(|field| field.as_deref().and_then(parse_date))
}
