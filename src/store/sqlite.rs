//! SQLite-backed event store. The canonical `event_time` is materialized at
//! insert time with the shared resolver, so the grouped SQL aggregation and
//! the in-process reduce see the same timeline.

use super::{EntityKind, EventStore, StoreError};
use crate::events::{DeviceRecord, ManufacturerRecord, RecallEvent, SeverityClass};
use crate::history::{parse_date, resolve_event_time, ClassTally, Cutoff};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                device_id TEXT,
                manufacturer_id TEXT,
                action TEXT,
                action_classification TEXT,
                severity TEXT,
                reason TEXT,
                determined_cause TEXT,
                status TEXT,
                country TEXT,
                date TEXT,
                date_posted TEXT,
                date_updated TEXT,
                event_time TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_events_device ON events(device_id, event_time);
            CREATE INDEX IF NOT EXISTS idx_events_manufacturer ON events(manufacturer_id, event_time);
            CREATE TABLE IF NOT EXISTS devices (
                id TEXT PRIMARY KEY,
                name TEXT,
                classification TEXT,
                risk_class TEXT,
                implanted TEXT,
                quantity_in_commerce REAL,
                manufacturer_id TEXT,
                country TEXT
            );
            CREATE TABLE IF NOT EXISTS manufacturers (
                id TEXT PRIMARY KEY,
                name TEXT,
                parent_company TEXT
            );
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                device_id TEXT,
                manufacturer_id TEXT,
                label TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS status_summaries (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert one event. The severity label is normalized and the canonical
    /// event time resolved here; unresolvable times are stored as NULL and
    /// never reach aggregation.
    pub fn insert_event(&self, event: &RecallEvent) -> Result<(), StoreError> {
        let severity = event.severity();
        let severity_label = severity.is_known().then(|| severity.label());
        let event_time = resolve_event_time(event).map(|t| t.to_string());
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO events \
             (id, device_id, manufacturer_id, action, action_classification, severity, \
              reason, determined_cause, status, country, date, date_posted, date_updated, event_time) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                event.id,
                event.device_id,
                event.manufacturer_id,
                event.action,
                event.action_classification,
                severity_label,
                event.reason,
                event.determined_cause,
                event.status,
                event.country,
                event.date,
                event.date_posted,
                event.date_updated,
                event_time,
            ],
        )?;
        Ok(())
    }

    pub fn insert_device(&self, device: &DeviceRecord) -> Result<(), StoreError> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO devices \
             (id, name, classification, risk_class, implanted, quantity_in_commerce, manufacturer_id, country) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                device.id,
                device.name,
                device.classification,
                device.risk_class,
                device.implanted,
                device.quantity_in_commerce,
                device.manufacturer_id,
                device.country,
            ],
        )?;
        Ok(())
    }

    pub fn insert_manufacturer(&self, manufacturer: &ManufacturerRecord) -> Result<(), StoreError> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO manufacturers (id, name, parent_company) VALUES (?1, ?2, ?3)",
            params![manufacturer.id, manufacturer.name, manufacturer.parent_company],
        )?;
        Ok(())
    }

    /// Persist one prediction for audit (payload is the serialized response).
    pub fn record_prediction(
        &self,
        id: &str,
        created_at: &str,
        device_id: Option<&str>,
        manufacturer_id: Option<&str>,
        label: &str,
        payload: &str,
    ) -> Result<(), StoreError> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO predictions (id, created_at, device_id, manufacturer_id, label, payload) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, created_at, device_id, manufacturer_id, label, payload],
        )?;
        Ok(())
    }

    pub fn prediction(&self, id: &str) -> Result<Option<(String, String)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT label, payload FROM predictions WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    /// Case-insensitive device lookup by name fragment and country, for the
    /// status summary.
    pub fn find_device(
        &self,
        country: &str,
        name_fragment: &str,
    ) -> Result<Option<DeviceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", name_fragment);
        let row = conn
            .query_row(
                "SELECT id, name, classification, risk_class, implanted, quantity_in_commerce, \
                        manufacturer_id, country \
                 FROM devices WHERE country = ?1 AND name LIKE ?2 COLLATE NOCASE LIMIT 1",
                params![country, pattern],
                Self::device_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Up to `limit` events for one device in one country, most recent first.
    pub fn events_for_device(
        &self,
        device_id: &str,
        country: &str,
        limit: usize,
    ) -> Result<Vec<RecallEvent>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, device_id, manufacturer_id, action, action_classification, \
                    reason, determined_cause, status, country, date, date_posted, date_updated \
             FROM events WHERE device_id = ?1 AND country = ?2 \
             ORDER BY event_time DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![device_id, country, limit as i64], |row| {
            Ok(RecallEvent {
                id: row.get(0)?,
                device_id: row.get(1)?,
                manufacturer_id: row.get(2)?,
                action: row.get(3)?,
                action_classification: row.get(4)?,
                reason: row.get(5)?,
                determined_cause: row.get(6)?,
                status: row.get(7)?,
                country: row.get(8)?,
                date: row.get(9)?,
                date_posted: row.get(10)?,
                date_updated: row.get(11)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn cached_summary(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT payload FROM status_summaries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn cache_summary(&self, key: &str, payload: &str) -> Result<(), StoreError> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO status_summaries (key, payload) VALUES (?1, ?2)",
            params![key, payload],
        )?;
        Ok(())
    }

    fn device_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceRecord> {
        Ok(DeviceRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            classification: row.get(2)?,
            risk_class: row.get(3)?,
            implanted: row.get(4)?,
            quantity_in_commerce: row.get(5)?,
            manufacturer_id: row.get(6)?,
            country: row.get(7)?,
        })
    }
}

impl EventStore for SqliteStore {
    fn entity_history(
        &self,
        entity: EntityKind,
        id: &str,
        cutoff: Cutoff,
    ) -> Result<ClassTally, StoreError> {
        let column = match entity {
            EntityKind::Device => "device_id",
            EntityKind::Manufacturer => "manufacturer_id",
        };
        // ISO dates compare lexicographically, so the cutoff is a plain
        // string comparison on the materialized event_time.
        let op = match cutoff {
            Cutoff::Before(_) => "<",
            Cutoff::AtOrBefore(_) => "<=",
        };
        let sql = format!(
            "SELECT severity, COUNT(*), MAX(event_time) FROM events \
             WHERE {column} = ?1 AND severity IS NOT NULL \
               AND event_time IS NOT NULL AND event_time {op} ?2 \
             GROUP BY severity"
        );
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![id, cutoff.as_of().to_string()], |row| {
            let label: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let last: Option<String> = row.get(2)?;
            Ok((label, count, last))
        })?;
        let mut tally = ClassTally::default();
        for row in rows {
            let (label, count, last) = row?;
            tally.observe_group(
                SeverityClass::parse(Some(&label)),
                count as u32,
                last.as_deref().and_then(parse_date),
            );
        }
        Ok(tally)
    }

    fn device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, name, classification, risk_class, implanted, quantity_in_commerce, \
                        manufacturer_id, country \
                 FROM devices WHERE id = ?1",
                params![id],
                Self::device_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn manufacturer(&self, id: &str) -> Result<Option<ManufacturerRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, name, parent_company FROM manufacturers WHERE id = ?1",
                params![id],
                |row| {
                    Ok(ManufacturerRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        parent_company: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
