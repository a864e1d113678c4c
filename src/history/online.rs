//! Online aggregation: one entity, one cutoff, against a live event store.

use super::{Cutoff, HistorySnapshot};
use crate::store::{EntityKind, EventStore, StoreError};

/// Point-query aggregator over any [`EventStore`]. The store produces the
/// grouped tally; the snapshot arithmetic is shared with the batch path, so
/// the two modes cannot diverge on totals or recency.
pub struct HistoryService<'a, S: EventStore> {
    store: &'a S,
}

impl<'a, S: EventStore> HistoryService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Device history at the cutoff. An unknown device id yields the zero
    /// snapshot; a store failure propagates and is never masked as zero
    /// history.
    pub fn device_history(
        &self,
        device_id: &str,
        cutoff: Cutoff,
    ) -> Result<HistorySnapshot, StoreError> {
        let tally = self
            .store
            .entity_history(EntityKind::Device, device_id, cutoff)?;
        Ok(tally.snapshot(cutoff.as_of()))
    }

    pub fn manufacturer_history(
        &self,
        manufacturer_id: &str,
        cutoff: Cutoff,
    ) -> Result<HistorySnapshot, StoreError> {
        let tally =
            self.store
                .entity_history(EntityKind::Manufacturer, manufacturer_id, cutoff)?;
        Ok(tally.snapshot(cutoff.as_of()))
    }
}
