//! Remote event store over HTTP. The service owns the event log; this
//! adapter only speaks the grouped-count-plus-max-time result shape.

use super::{EntityKind, EventStore, StoreError};
use crate::events::{DeviceRecord, ManufacturerRecord, SeverityClass};
use crate::history::{ClassTally, Cutoff};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Wire shape of `GET /history`: counts keyed by severity label plus the
/// latest matching event time.
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    counts: BTreeMap<String, u32>,
    #[serde(default)]
    last_time: Option<NaiveDate>,
}

pub struct HttpStore {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpStore {
    /// Build the adapter with caller-supplied timeouts. Transport failures
    /// surface as the retryable [`StoreError::Unavailable`].
    pub fn new(
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::blocking::Response, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .get(&url)
            .query(query)
            .send()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = res.status();
        if status.is_server_error() {
            return Err(StoreError::Unavailable(format!("{} {}", status, url)));
        }
        Ok(res)
    }
}

impl EventStore for HttpStore {
    fn entity_history(
        &self,
        entity: EntityKind,
        id: &str,
        cutoff: Cutoff,
    ) -> Result<ClassTally, StoreError> {
        let strict = matches!(cutoff, Cutoff::Before(_));
        let res = self.get(
            "/history",
            &[
                ("entity", entity.as_str().to_string()),
                ("id", id.to_string()),
                ("as_of", cutoff.as_of().to_string()),
                ("strict", strict.to_string()),
            ],
        )?;
        if !res.status().is_success() {
            return Err(StoreError::Query(format!("history: {}", res.status())));
        }
        let body: HistoryResponse = res
            .json()
            .map_err(|e| StoreError::Query(e.to_string()))?;
        let mut tally = ClassTally::default();
        for (label, count) in &body.counts {
            tally.observe_group(SeverityClass::parse(Some(label)), *count, body.last_time);
        }
        Ok(tally)
    }

    fn device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let res = self.get(&format!("/devices/{}", id), &[])?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(StoreError::Query(format!("devices: {}", res.status())));
        }
        res.json().map(Some).map_err(|e| StoreError::Query(e.to_string()))
    }

    fn manufacturer(&self, id: &str) -> Result<Option<ManufacturerRecord>, StoreError> {
        let res = self.get(&format!("/manufacturers/{}", id), &[])?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(StoreError::Query(format!("manufacturers: {}", res.status())));
        }
        res.json().map(Some).map_err(|e| StoreError::Query(e.to_string()))
    }
}
