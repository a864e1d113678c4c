//! Event store adapters: read-only access to the canonical records, either
//! in memory, in SQLite, or behind a remote HTTP service.

mod http;
mod memory;
mod sqlite;

pub use http::HttpStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::events::{DeviceRecord, ManufacturerRecord};
use crate::history::{ClassTally, Cutoff};
use thiserror::Error;

/// Which foreign key groups the history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Device,
    Manufacturer,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Device => "device",
            EntityKind::Manufacturer => "manufacturer",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or timed out. Retryable; callers must
    /// not substitute zero history for this.
    #[error("event store unavailable: {0}")]
    Unavailable(String),
    /// The store answered but the query or its result was invalid.
    #[error("event store query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Read access the online aggregator needs. The one aggregation operation is
/// "count events for an entity grouped by severity class up to a cutoff,
/// plus the maximum matching event time" — a store may run it as a single
/// grouped query or fetch-then-reduce, but the result shape is fixed.
pub trait EventStore {
    fn entity_history(
        &self,
        entity: EntityKind,
        id: &str,
        cutoff: Cutoff,
    ) -> Result<ClassTally, StoreError>;

    fn device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError>;

    fn manufacturer(&self, id: &str) -> Result<Option<ManufacturerRecord>, StoreError>;

    /// Resolve a device's manufacturer, used when a query names only the
    /// device.
    fn manufacturer_for_device(&self, device_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.device(device_id)?.and_then(|d| d.manufacturer_id))
    }
}
