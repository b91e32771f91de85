//! Workout history and personal bests.
//!
//! Log entries are written when a block completes and read back to annotate
//! exercises with what was done last time and the heaviest set on record.
//! Reads merge the live WAL with the CSV archive.

use crate::csv_rollup::CsvRow;
use crate::wal::JsonlSink;
use crate::{Error, LoggedSet, Result, WorkoutLogEntry};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable workout log
pub trait HistoryStore {
    fn append_logs(&mut self, entries: &[WorkoutLogEntry]) -> Result<()>;

    /// Most recent entries for the athlete and exercises, newest first, at most `limit`
    fn read_recent_logs(
        &self,
        athlete_id: &str,
        exercise_refs: &[String],
        limit: usize,
    ) -> Result<Vec<WorkoutLogEntry>>;
}

/// Heaviest logged set with at least one rep
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersonalBest {
    pub weight: f64,
    pub reps: u32,
    pub date: NaiveDate,
}

/// Annotation shown next to an exercise during a session
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExerciseHistory {
    pub exercise_ref: String,
    pub last_performed: Option<NaiveDate>,
    pub last_sets: Vec<LoggedSet>,
    pub personal_best: Option<PersonalBest>,
}

/// Summarize newest-first entries for one exercise
pub fn summarize(entries: &[WorkoutLogEntry], exercise_ref: &str) -> ExerciseHistory {
    let mut matching = entries.iter().filter(|e| e.exercise_ref == exercise_ref);
    let last = matching.next();

    let personal_best = entries
        .iter()
        .filter(|e| e.exercise_ref == exercise_ref)
        .flat_map(|e| e.sets.iter().map(move |s| (e.date, s)))
        .filter_map(|(date, set)| {
            let reps = set.values.reps.filter(|r| *r > 0)?;
            let weight = set.values.weight?;
            Some(PersonalBest { weight, reps, date })
        })
        .fold(None, |best: Option<PersonalBest>, candidate| match best {
            Some(b) if b.weight >= candidate.weight => Some(b),
            _ => Some(candidate),
        });

    ExerciseHistory {
        exercise_ref: exercise_ref.to_string(),
        last_performed: last.map(|e| e.date),
        last_sets: last.map(|e| e.sets.clone()).unwrap_or_default(),
        personal_best,
    }
}

/// Read history for a set of exercises and summarize each one
///
/// Store failures come back as [`Error::HistoryLookup`]; callers treat them
/// as missing annotations.
pub fn lookup(
    store: &dyn HistoryStore,
    athlete_id: &str,
    exercise_refs: &[String],
    limit: usize,
) -> Result<HashMap<String, ExerciseHistory>> {
    let entries = store
        .read_recent_logs(athlete_id, exercise_refs, limit)
        .map_err(|e| Error::HistoryLookup(e.to_string()))?;

    Ok(exercise_refs
        .iter()
        .map(|r| (r.clone(), summarize(&entries, r)))
        .collect())
}

fn select_recent(
    entries: impl IntoIterator<Item = WorkoutLogEntry>,
    athlete_id: &str,
    exercise_refs: &[String],
    limit: usize,
) -> Vec<WorkoutLogEntry> {
    let wanted: HashSet<&str> = exercise_refs.iter().map(String::as_str).collect();
    let mut selected: Vec<WorkoutLogEntry> = entries
        .into_iter()
        .filter(|e| e.athlete_id == athlete_id && wanted.contains(e.exercise_ref.as_str()))
        .collect();
    selected.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
    selected.truncate(limit);
    selected
}

/// In-process workout log
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Vec<WorkoutLogEntry>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[WorkoutLogEntry] {
        &self.entries
    }
}

impl HistoryStore for MemoryHistory {
    fn append_logs(&mut self, entries: &[WorkoutLogEntry]) -> Result<()> {
        self.entries.extend_from_slice(entries);
        Ok(())
    }

    fn read_recent_logs(
        &self,
        athlete_id: &str,
        exercise_refs: &[String],
        limit: usize,
    ) -> Result<Vec<WorkoutLogEntry>> {
        Ok(select_recent(
            self.entries.iter().cloned(),
            athlete_id,
            exercise_refs,
            limit,
        ))
    }
}

/// File-backed workout log: appends go to the WAL, reads merge WAL and CSV archive
#[derive(Debug, Clone)]
pub struct FileHistory {
    sink: JsonlSink,
    csv_path: PathBuf,
}

impl FileHistory {
    pub fn new(wal_path: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            sink: JsonlSink::new(wal_path),
            csv_path: csv_path.into(),
        }
    }

    /// All entries from WAL and CSV, deduplicated by entry id
    pub fn load_all(&self) -> Result<Vec<WorkoutLogEntry>> {
        let mut entries = Vec::new();
        let mut seen_ids = HashSet::new();

        for entry in crate::wal::read_entries(self.sink.path())? {
            if seen_ids.insert(entry.id) {
                entries.push(entry);
            }
        }
        let wal_count = entries.len();

        if self.csv_path.exists() {
            for entry in load_entries_from_csv(&self.csv_path)? {
                if seen_ids.insert(entry.id) {
                    entries.push(entry);
                }
            }
        }

        tracing::debug!(
            "Loaded {} log entries ({} from WAL, {} from CSV)",
            entries.len(),
            wal_count,
            entries.len() - wal_count
        );
        Ok(entries)
    }
}

impl HistoryStore for FileHistory {
    fn append_logs(&mut self, entries: &[WorkoutLogEntry]) -> Result<()> {
        self.sink.append(entries)
    }

    fn read_recent_logs(
        &self,
        athlete_id: &str,
        exercise_refs: &[String],
        limit: usize,
    ) -> Result<Vec<WorkoutLogEntry>> {
        Ok(select_recent(self.load_all()?, athlete_id, exercise_refs, limit))
    }
}

/// Load entries from the CSV archive, regrouping set rows by entry id
fn load_entries_from_csv(path: &Path) -> Result<Vec<WorkoutLogEntry>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;

    let mut order: Vec<Uuid> = Vec::new();
    let mut grouped: HashMap<Uuid, WorkoutLogEntry> = HashMap::new();

    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => {
                let entry = grouped.entry(row.entry_id).or_insert_with(|| {
                    order.push(row.entry_id);
                    row.to_entry()
                });
                entry.sets.push(row.to_set());
            }
            Err(e) => {
                tracing::warn!("Failed to deserialize CSV row: {}", e);
            }
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|id| grouped.remove(&id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::tests::create_test_entry;

    fn refs(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_personal_best_requires_reps() {
        let mut zero_rep = create_test_entry("back_squat", 200.0, 0, 0);
        zero_rep.date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let mut best = create_test_entry("back_squat", 140.0, 3, 1);
        best.date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let lighter = create_test_entry("back_squat", 120.0, 5, 2);

        let summary = summarize(&[zero_rep.clone(), best, lighter], "back_squat");
        let pb = summary.personal_best.unwrap();
        assert_eq!(pb.weight, 140.0);
        assert_eq!(pb.reps, 3);
        assert_eq!(pb.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());

        assert_eq!(summary.last_performed, Some(zero_rep.date));
        assert_eq!(summary.last_sets, zero_rep.sets);
    }

    #[test]
    fn test_no_history_gives_empty_summary() {
        let summary = summarize(&[], "deadlift");
        assert_eq!(summary.last_performed, None);
        assert!(summary.last_sets.is_empty());
        assert_eq!(summary.personal_best, None);
    }

    #[test]
    fn test_memory_history_filters_and_limits() {
        let mut store = MemoryHistory::new();
        store
            .append_logs(&[
                create_test_entry("back_squat", 100.0, 5, 3),
                create_test_entry("back_squat", 105.0, 5, 1),
                create_test_entry("bench_press", 80.0, 5, 0),
                create_test_entry("deadlift", 150.0, 5, 0),
            ])
            .unwrap();

        let recent = store
            .read_recent_logs("ath", &refs(&["back_squat", "bench_press"]), 2)
            .unwrap();
        let weights: Vec<_> = recent.iter().map(|e| e.sets[0].values.weight).collect();
        assert_eq!(weights, vec![Some(80.0), Some(105.0)]);

        assert!(store
            .read_recent_logs("other", &refs(&["back_squat"]), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_file_history_merges_wal_and_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("workout_logs.wal");
        let csv_path = temp_dir.path().join("workout_logs.csv");
        let mut store = FileHistory::new(&wal_path, &csv_path);

        let archived = create_test_entry("back_squat", 100.0, 5, 5);
        store.append_logs(&[archived.clone()]).unwrap();
        crate::csv_rollup::wal_to_csv_and_archive(&wal_path, &csv_path).unwrap();

        store
            .append_logs(&[create_test_entry("back_squat", 110.0, 3, 0)])
            .unwrap();

        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 2);
        let from_csv = all.iter().find(|e| e.id == archived.id).unwrap();
        assert_eq!(from_csv.sets, archived.sets);

        let history = lookup(&store, "ath", &refs(&["back_squat"]), 10).unwrap();
        let pb = history["back_squat"].personal_best.as_ref().unwrap();
        assert_eq!(pb.weight, 110.0);
    }

    struct BrokenHistory;

    impl HistoryStore for BrokenHistory {
        fn append_logs(&mut self, _entries: &[WorkoutLogEntry]) -> Result<()> {
            Err(Error::Persistence("offline".into()))
        }

        fn read_recent_logs(
            &self,
            _athlete_id: &str,
            _exercise_refs: &[String],
            _limit: usize,
        ) -> Result<Vec<WorkoutLogEntry>> {
            Err(Error::Persistence("offline".into()))
        }
    }

    #[test]
    fn test_lookup_failure_is_history_error() {
        let result = lookup(&BrokenHistory, "ath", &refs(&["back_squat"]), 5);
        assert!(matches!(result, Err(Error::HistoryLookup(_))));
    }
}
