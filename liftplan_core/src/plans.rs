//! Assigned-plan loading.
//!
//! Plans are authored elsewhere; this module only reads the structure and date
//! schedule of the plans assigned to an athlete.

use crate::{AssignedPlan, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Source of the plans assigned to an athlete
pub trait AssignedPlanStore {
    fn read_assigned_plans(&self, athlete_id: &str) -> Result<Vec<AssignedPlan>>;
}

/// In-process plan assignments
#[derive(Debug, Default)]
pub struct MemoryPlanStore {
    assignments: HashMap<String, Vec<AssignedPlan>>,
}

impl MemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, athlete_id: &str, plan: AssignedPlan) {
        self.assignments
            .entry(athlete_id.to_string())
            .or_default()
            .push(plan);
    }
}

impl AssignedPlanStore for MemoryPlanStore {
    fn read_assigned_plans(&self, athlete_id: &str) -> Result<Vec<AssignedPlan>> {
        Ok(self.assignments.get(athlete_id).cloned().unwrap_or_default())
    }
}

/// Plan assignments exported as JSON: `{ "<athlete_id>": [AssignedPlan, ...] }`
///
/// A missing file means no plans are assigned. A malformed file is logged and
/// treated the same way, so custom sessions stay usable.
#[derive(Debug, Clone)]
pub struct FilePlanStore {
    path: PathBuf,
}

impl FilePlanStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_all(&self) -> HashMap<String, Vec<AssignedPlan>> {
        load_assignments(&self.path)
    }
}

impl AssignedPlanStore for FilePlanStore {
    fn read_assigned_plans(&self, athlete_id: &str) -> Result<Vec<AssignedPlan>> {
        Ok(self.load_all().remove(athlete_id).unwrap_or_default())
    }
}

fn load_assignments(path: &Path) -> HashMap<String, Vec<AssignedPlan>> {
    if !path.exists() {
        tracing::debug!("No plan assignments file found at {:?}", path);
        return HashMap::new();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::warn!(
                "Failed to read plan assignments at {:?}: {}. Ignoring plans.",
                path,
                e
            );
            return HashMap::new();
        }
    };

    match serde_json::from_str::<HashMap<String, Vec<AssignedPlan>>>(&contents) {
        Ok(assignments) => {
            tracing::debug!(
                "Loaded plan assignments for {} athletes from {:?}",
                assignments.len(),
                path
            );
            assignments
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse plan assignments at {:?}: {}. Ignoring plans.",
                path,
                e
            );
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_load_plan_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("plans.json");

        let json = r#"{
            "ath": [{
                "plan_id": "p1",
                "plan_name": "Base Strength",
                "schedule": { "2024-04-01": "w1d1" },
                "structure": { "weeks": [ { "sessions": [
                    { "id": "w1d1", "title": "Squat Day", "blocks": [] }
                ] } ] }
            }]
        }"#;
        std::fs::write(&path, json).unwrap();

        let store = FilePlanStore::new(&path);
        let plans = store.read_assigned_plans("ath").unwrap();
        assert_eq!(plans.len(), 1);

        let date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let session_id = &plans[0].schedule[&date];
        let template = plans[0].structure.find_session(session_id).unwrap();
        assert_eq!(template.title, "Squat Day");

        assert!(store.read_assigned_plans("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_missing_and_malformed_files_mean_no_plans() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = FilePlanStore::new(temp_dir.path().join("none.json"));
        assert!(missing.read_assigned_plans("ath").unwrap().is_empty());

        let path = temp_dir.path().join("bad.json");
        std::fs::write(&path, "[1, 2").unwrap();
        let malformed = FilePlanStore::new(&path);
        assert!(malformed.read_assigned_plans("ath").unwrap().is_empty());
    }
}
