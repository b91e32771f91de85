//! CSV rollup functionality for archiving the workout log WAL.
//!
//! This module implements atomic WAL-to-CSV conversion with proper error handling
//! to prevent data loss. The CSV holds one row per logged set.

use crate::{LoggedSet, Result, SetType, SetValues, WorkoutLogEntry};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;
use uuid::Uuid;

/// A row in the CSV archive
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CsvRow {
    pub entry_id: Uuid,
    pub athlete_id: String,
    pub session_id: String,
    pub date: NaiveDate,
    pub block_id: String,
    pub exercise_ref: String,
    pub exercise_name: String,
    pub set_index: usize,
    pub set_type: SetType,
    pub completed: bool,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub percent_one_rm: Option<f64>,
    pub rpe: Option<f64>,
    pub distance: Option<f64>,
    pub time_seconds: Option<u32>,
    pub tempo: Option<String>,
    pub duration_seconds: u32,
    pub logged_at: DateTime<Utc>,
}

impl CsvRow {
    fn rows_for(entry: &WorkoutLogEntry) -> Vec<CsvRow> {
        entry
            .sets
            .iter()
            .enumerate()
            .map(|(set_index, set)| CsvRow {
                entry_id: entry.id,
                athlete_id: entry.athlete_id.clone(),
                session_id: entry.session_id.clone(),
                date: entry.date,
                block_id: entry.block_id.clone(),
                exercise_ref: entry.exercise_ref.clone(),
                exercise_name: entry.exercise_name.clone(),
                set_index,
                set_type: set.set_type,
                completed: set.completed,
                reps: set.values.reps,
                weight: set.values.weight,
                percent_one_rm: set.values.percent_one_rm,
                rpe: set.values.rpe,
                distance: set.values.distance,
                time_seconds: set.values.time_seconds,
                tempo: set.values.tempo.clone(),
                duration_seconds: entry.duration_seconds,
                logged_at: entry.logged_at,
            })
            .collect()
    }

    /// Entry header fields with no sets yet
    pub(crate) fn to_entry(&self) -> WorkoutLogEntry {
        WorkoutLogEntry {
            id: self.entry_id,
            athlete_id: self.athlete_id.clone(),
            session_id: self.session_id.clone(),
            date: self.date,
            block_id: self.block_id.clone(),
            exercise_ref: self.exercise_ref.clone(),
            exercise_name: self.exercise_name.clone(),
            sets: Vec::new(),
            duration_seconds: self.duration_seconds,
            logged_at: self.logged_at,
        }
    }

    pub(crate) fn to_set(&self) -> LoggedSet {
        LoggedSet {
            set_type: self.set_type,
            values: SetValues {
                reps: self.reps,
                weight: self.weight,
                percent_one_rm: self.percent_one_rm,
                rpe: self.rpe,
                distance: self.distance,
                time_seconds: self.time_seconds,
                tempo: self.tempo.clone(),
            },
            completed: self.completed,
        }
    }
}

/// Roll up WAL entries into CSV and archive the WAL atomically
///
/// This function:
/// 1. Reads all entries from the WAL
/// 2. Appends one row per set to the CSV file (creates with headers if needed)
/// 3. Syncs the CSV to disk
/// 4. Renames the WAL to .processed
/// 5. Returns the number of entries processed
///
/// The WAL is renamed, not deleted, so it can be recovered manually.
pub fn wal_to_csv_and_archive(wal_path: &Path, csv_path: &Path) -> Result<usize> {
    let entries = crate::wal::read_entries(wal_path)?;

    if entries.is_empty() {
        tracing::info!("No log entries in WAL to roll up");
        return Ok(0);
    }

    if let Some(parent) = csv_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;

    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for entry in &entries {
        for row in CsvRow::rows_for(entry) {
            writer.serialize(row)?;
        }
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Wrote {} log entries to CSV", entries.len());

    let processed_path = wal_path.with_extension("wal.processed");
    std::fs::rename(wal_path, &processed_path)?;

    tracing::info!("Archived WAL to {:?}", processed_path);

    Ok(entries.len())
}

/// Remove all .wal.processed files in the given directory
pub fn cleanup_processed_wals(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.extension().is_some_and(|ext| ext == "processed") {
            std::fs::remove_file(&path)?;
            tracing::debug!("Removed processed WAL: {:?}", path);
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Cleaned up {} processed WAL files", count);
    }

    Ok(count)
}
