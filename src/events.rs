//! Canonical recall records: events, devices, manufacturers. Events are
//! append-only and externally owned; this crate only reads them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Severity taxonomy for adverse-action events. Anything that is not one of
/// the three regulatory classes is `Unknown` and never enters aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityClass {
    ClassI,
    ClassII,
    ClassIII,
    Unknown,
}

impl SeverityClass {
    pub const KNOWN: [SeverityClass; 3] =
        [SeverityClass::ClassI, SeverityClass::ClassII, SeverityClass::ClassIII];

    /// Parse a raw label. Accepts the spellings the upstream cleaner emits
    /// ("CLASS I", "CLASS 1", bare "I"), case- and whitespace-insensitive.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return SeverityClass::Unknown;
        };
        match raw.trim().to_uppercase().as_str() {
            "CLASS I" | "CLASS 1" | "I" | "1" => SeverityClass::ClassI,
            "CLASS II" | "CLASS 2" | "II" | "2" => SeverityClass::ClassII,
            "CLASS III" | "CLASS 3" | "III" | "3" => SeverityClass::ClassIII,
            _ => SeverityClass::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SeverityClass::ClassI => "CLASS I",
            SeverityClass::ClassII => "CLASS II",
            SeverityClass::ClassIII => "CLASS III",
            SeverityClass::Unknown => "UNKNOWN",
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, SeverityClass::Unknown)
    }
}

/// One cleaned adverse-action record. Timestamp fields stay raw here; the
/// canonical event time is derived by [`crate::history::resolve_event_time`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallEvent {
    pub id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub manufacturer_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub action_classification: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub determined_cause: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub date_posted: Option<String>,
    #[serde(default)]
    pub date_updated: Option<String>,
}

impl RecallEvent {
    pub fn severity(&self) -> SeverityClass {
        SeverityClass::parse(self.action_classification.as_deref())
    }
}

/// Static device attributes joined into the feature vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub risk_class: Option<String>,
    #[serde(default)]
    pub implanted: Option<String>,
    #[serde(default)]
    pub quantity_in_commerce: Option<f64>,
    #[serde(default)]
    pub manufacturer_id: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManufacturerRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_company: Option<String>,
}

/// Truthy-string convention used by the upstream cleaner for boolean columns.
pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|s| s.trim().to_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes") | Some("y")
    )
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: malformed record: {source}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Read one record per line (NDJSON). Blank lines are skipped; a malformed
/// line fails the whole load with its line number.
pub fn read_ndjson<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DatasetError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| DatasetError::Io {
        path: display.clone(),
        source,
    })?;
    let mut out = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| DatasetError::Io {
            path: display.clone(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|source| DatasetError::Parse {
            path: display.clone(),
            line: idx + 1,
            source,
        })?;
        out.push(record);
    }
    Ok(out)
}
