//! In-memory store over an immutable dataset: fetch-then-reduce with the
//! shared resolver and cutoff comparison. Backs batch runs and tests.

use super::{EntityKind, EventStore, StoreError};
use crate::events::{DeviceRecord, ManufacturerRecord, RecallEvent};
use crate::history::{resolve_event_time, ClassTally, Cutoff};
use chrono::NaiveDate;
use std::collections::HashMap;

pub struct MemoryStore {
    events: Vec<(RecallEvent, Option<NaiveDate>)>,
    by_device: HashMap<String, Vec<usize>>,
    by_manufacturer: HashMap<String, Vec<usize>>,
    devices: HashMap<String, DeviceRecord>,
    manufacturers: HashMap<String, ManufacturerRecord>,
}

impl MemoryStore {
    pub fn new(
        events: Vec<RecallEvent>,
        devices: Vec<DeviceRecord>,
        manufacturers: Vec<ManufacturerRecord>,
    ) -> Self {
        let mut by_device: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_manufacturer: HashMap<String, Vec<usize>> = HashMap::new();
        let events: Vec<_> = events
            .into_iter()
            .map(|e| {
                let time = resolve_event_time(&e);
                (e, time)
            })
            .collect();
        for (idx, (event, _)) in events.iter().enumerate() {
            if let Some(id) = event.device_id.as_deref() {
                by_device.entry(id.to_string()).or_default().push(idx);
            }
            if let Some(id) = event.manufacturer_id.as_deref() {
                by_manufacturer.entry(id.to_string()).or_default().push(idx);
            }
        }
        Self {
            events,
            by_device,
            by_manufacturer,
            devices: devices.into_iter().map(|d| (d.id.clone(), d)).collect(),
            manufacturers: manufacturers
                .into_iter()
                .map(|m| (m.id.clone(), m))
                .collect(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl EventStore for MemoryStore {
    fn entity_history(
        &self,
        entity: EntityKind,
        id: &str,
        cutoff: Cutoff,
    ) -> Result<ClassTally, StoreError> {
        let index = match entity {
            EntityKind::Device => &self.by_device,
            EntityKind::Manufacturer => &self.by_manufacturer,
        };
        let mut tally = ClassTally::default();
        if let Some(indices) = index.get(id) {
            for &idx in indices {
                let (event, time) = &self.events[idx];
                // Events without a resolvable time contribute nothing.
                if let Some(time) = time {
                    if cutoff.admits(*time) {
                        tally.observe(event.severity(), *time);
                    }
                }
            }
        }
        Ok(tally)
    }

    fn device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self.devices.get(id).cloned())
    }

    fn manufacturer(&self, id: &str) -> Result<Option<ManufacturerRecord>, StoreError> {
        Ok(self.manufacturers.get(id).cloned())
    }
}
