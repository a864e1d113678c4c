//! Cached device status summaries: status counts, a handful of recent
//! event digests, and the manufacturers seen in those events.

use crate::history::parse_date;
use crate::store::{EventStore, SqliteStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const EVENT_SCAN_LIMIT: usize = 200;
const DIGEST_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDigest {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub country: String,
    pub device_name: String,
    pub status_counts: BTreeMap<String, u64>,
    pub top_events: Vec<EventDigest>,
    pub manufacturers: Vec<String>,
}

/// Collapse raw status values. Terminated recalls are recorded either with
/// the literal word or with the termination date in the status column.
pub fn normalize_status(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "Unknown".to_string();
    };
    let s = raw.trim();
    if s.is_empty() {
        return "Unknown".to_string();
    }
    if s.eq_ignore_ascii_case("terminated") || parse_date(s).is_some() {
        return "Terminated".to_string();
    }
    s.to_string()
}

pub struct StatusSummaryService<'a> {
    store: &'a SqliteStore,
}

impl<'a> StatusSummaryService<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// Return the cached summary for `(country, device_name)` or build and
    /// cache it. `Ok(None)` when no matching device exists.
    pub fn get_or_build(
        &self,
        country: &str,
        device_name: &str,
    ) -> Result<Option<StatusSummary>, StoreError> {
        let key = format!("{country}||{device_name}");
        if let Some(cached) = self.store.cached_summary(&key)? {
            if let Ok(summary) = serde_json::from_str(&cached) {
                debug!(key, "status summary cache hit");
                return Ok(Some(summary));
            }
        }

        let Some(device) = self.store.find_device(country, device_name)? else {
            return Ok(None);
        };
        let events = self
            .store
            .events_for_device(&device.id, country, EVENT_SCAN_LIMIT)?;

        let mut status_counts: BTreeMap<String, u64> = BTreeMap::new();
        for event in &events {
            *status_counts
                .entry(normalize_status(event.status.as_deref()))
                .or_insert(0) += 1;
        }

        let top_events = events
            .iter()
            .take(DIGEST_LIMIT)
            .map(|e| EventDigest {
                id: e.id.clone(),
                action: e.action.clone(),
                status: normalize_status(e.status.as_deref()),
                date: e.date.clone(),
            })
            .collect();

        let mut manufacturers: BTreeSet<String> = BTreeSet::new();
        for event in &events {
            if let Some(id) = event.manufacturer_id.as_deref() {
                if let Some(m) = self.store.manufacturer(id)? {
                    if let Some(name) = m.name {
                        manufacturers.insert(name);
                    }
                }
            }
        }

        let summary = StatusSummary {
            country: country.to_string(),
            device_name: device_name.to_string(),
            status_counts,
            top_events,
            manufacturers: manufacturers.into_iter().collect(),
        };
        let payload = serde_json::to_string(&summary)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        self.store.cache_summary(&key, &payload)?;
        Ok(Some(summary))
    }
}
