//! Schedule record storage.
//!
//! A schedule record holds the durable state of one athlete's session on one
//! date. Records are unique on `(athlete_id, date)`; plan-derived sessions
//! write through [`ScheduleStore::upsert`] on that key, custom sessions are
//! addressed by record id.

use crate::locked_file::{self, WriteLock};
use crate::{Error, Result, ScheduleFields, ScheduleKey, ScheduleRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable store of schedule records
pub trait ScheduleStore {
    /// Records for an athlete with `from <= date <= to`, ordered by date
    fn read_range(&self, athlete_id: &str, from: NaiveDate, to: NaiveDate)
        -> Result<Vec<ScheduleRecord>>;

    /// Overwrite the record for `key` if one exists, else insert one
    fn upsert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Result<Uuid>;

    fn update(&mut self, record_id: Uuid, fields: ScheduleFields) -> Result<()>;

    fn insert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Result<Uuid>;

    fn delete(&mut self, record_id: Uuid) -> Result<()>;
}

/// Record set with the store semantics, shared by both implementations
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ScheduleTable {
    #[serde(default)]
    pub records: Vec<ScheduleRecord>,
}

impl ScheduleTable {
    fn position_by_key(&self, key: &ScheduleKey) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.athlete_id == key.athlete_id && r.date == key.date)
    }

    fn position_by_id(&self, record_id: Uuid) -> Result<usize> {
        self.records
            .iter()
            .position(|r| r.id == record_id)
            .ok_or_else(|| Error::NotFound(format!("schedule record {}", record_id)))
    }

    pub fn read_range(&self, athlete_id: &str, from: NaiveDate, to: NaiveDate) -> Vec<ScheduleRecord> {
        let mut records: Vec<ScheduleRecord> = self
            .records
            .iter()
            .filter(|r| r.athlete_id == athlete_id && r.date >= from && r.date <= to)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.date);
        records
    }

    pub fn upsert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Uuid {
        match self.position_by_key(key) {
            Some(idx) => {
                let record = &mut self.records[idx];
                record.fields = fields;
                tracing::debug!("Upsert updated schedule record {}", record.id);
                record.id
            }
            None => {
                let id = Uuid::new_v4();
                self.records.push(ScheduleRecord {
                    id,
                    athlete_id: key.athlete_id.clone(),
                    date: key.date,
                    fields,
                });
                tracing::debug!("Upsert inserted schedule record {}", id);
                id
            }
        }
    }

    pub fn update(&mut self, record_id: Uuid, fields: ScheduleFields) -> Result<()> {
        let idx = self.position_by_id(record_id)?;
        self.records[idx].fields = fields;
        Ok(())
    }

    pub fn insert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Result<Uuid> {
        if self.position_by_key(key).is_some() {
            return Err(Error::Persistence(format!(
                "athlete {} already has a session on {}",
                key.athlete_id, key.date
            )));
        }
        let id = Uuid::new_v4();
        self.records.push(ScheduleRecord {
            id,
            athlete_id: key.athlete_id.clone(),
            date: key.date,
            fields,
        });
        Ok(id)
    }

    pub fn delete(&mut self, record_id: Uuid) -> Result<()> {
        let idx = self.position_by_id(record_id)?;
        self.records.remove(idx);
        Ok(())
    }
}

/// In-process schedule store
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    table: ScheduleTable,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ScheduleRecord] {
        &self.table.records
    }
}

impl ScheduleStore for MemoryScheduleStore {
    fn read_range(
        &self,
        athlete_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>> {
        Ok(self.table.read_range(athlete_id, from, to))
    }

    fn upsert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Result<Uuid> {
        Ok(self.table.upsert(key, fields))
    }

    fn update(&mut self, record_id: Uuid, fields: ScheduleFields) -> Result<()> {
        self.table.update(record_id, fields)
    }

    fn insert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Result<Uuid> {
        self.table.insert(key, fields)
    }

    fn delete(&mut self, record_id: Uuid) -> Result<()> {
        self.table.delete(record_id)
    }
}

/// Schedule store backed by a JSON file with file locking
///
/// Every write holds the writer lock while it loads the table, applies the
/// change and atomically replaces the file.
#[derive(Debug, Clone)]
pub struct JsonScheduleStore {
    path: PathBuf,
}

impl JsonScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the table; a missing file is an empty table
    ///
    /// Unlike user preferences, a corrupted schedule is an error: falling
    /// back to an empty table would drop every record on the next write.
    pub fn load(&self) -> Result<ScheduleTable> {
        let Some(contents) = locked_file::read_shared(&self.path)? else {
            tracing::debug!("No schedule file at {:?}, starting empty", self.path);
            return Ok(ScheduleTable::default());
        };

        serde_json::from_str(&contents).map_err(|e| {
            Error::Persistence(format!("schedule file {:?} is unreadable: {}", self.path, e))
        })
    }

    /// Atomically write the table via temp file, fsync and rename
    pub fn save(&self, table: &ScheduleTable) -> Result<()> {
        locked_file::write_json_atomic(&self.path, table)?;
        tracing::debug!("Saved {} schedule records to {:?}", table.records.len(), self.path);
        Ok(())
    }

    /// Load, change and save under the writer lock
    fn modify<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ScheduleTable) -> Result<T>,
    {
        let _lock = WriteLock::acquire(&self.path)?;
        let mut table = self.load()?;
        let out = f(&mut table)?;
        self.save(&table)?;
        Ok(out)
    }
}

impl ScheduleStore for JsonScheduleStore {
    fn read_range(
        &self,
        athlete_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>> {
        Ok(self.load()?.read_range(athlete_id, from, to))
    }

    fn upsert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Result<Uuid> {
        self.modify(|table| Ok(table.upsert(key, fields)))
    }

    fn update(&mut self, record_id: Uuid, fields: ScheduleFields) -> Result<()> {
        self.modify(|table| table.update(record_id, fields))
    }

    fn insert(&mut self, key: &ScheduleKey, fields: ScheduleFields) -> Result<Uuid> {
        self.modify(|table| table.insert(key, fields))
    }

    fn delete(&mut self, record_id: Uuid) -> Result<()> {
        self.modify(|table| table.delete(record_id))
    }
}
