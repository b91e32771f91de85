//! Goal auto-tracking.
//!
//! Completing a block feeds two goal kinds: strength (best load per exercise)
//! and consistency (count of completed training units). Tracking is
//! fire-and-forget; the orchestrator logs failures and moves on.

use crate::locked_file::{self, WriteLock};
use crate::{Block, Result, StrengthResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Receiver of goal progress events
pub trait GoalTracker {
    fn record_strength_result(&mut self, athlete_id: &str, results: &[StrengthResult]) -> Result<()>;
    fn record_consistency_event(&mut self, athlete_id: &str) -> Result<()>;
}

/// Heaviest weight per exercise in a block, actual where logged else target
///
/// Exercises with no positive weight are left out.
pub fn extract_strength_results(block: &Block) -> Vec<StrengthResult> {
    block
        .exercises
        .iter()
        .filter_map(|exercise| {
            let max_weight = exercise
                .sets
                .iter()
                .filter_map(|s| s.actual.weight.or(s.target.weight))
                .fold(None, |max: Option<f64>, w| Some(max.map_or(w, |m| m.max(w))))?;
            (max_weight > 0.0).then(|| StrengthResult {
                exercise_ref: exercise.exercise_ref.clone(),
                max_weight,
            })
        })
        .collect()
}

/// Goal progress for one athlete
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct AthleteGoals {
    /// exercise_ref -> best weight seen
    #[serde(default)]
    pub strength_bests: HashMap<String, f64>,
    #[serde(default)]
    pub consistency_count: u32,
    #[serde(default)]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl AthleteGoals {
    fn apply_strength(&mut self, results: &[StrengthResult]) -> usize {
        let mut improved = 0;
        for result in results {
            let best = self
                .strength_bests
                .entry(result.exercise_ref.clone())
                .or_insert(0.0);
            if result.max_weight > *best {
                *best = result.max_weight;
                improved += 1;
            }
        }
        self.last_event_at = Some(Utc::now());
        improved
    }

    fn apply_consistency(&mut self) {
        self.consistency_count += 1;
        self.last_event_at = Some(Utc::now());
    }
}

/// Goal progress for all athletes
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct GoalState {
    #[serde(default)]
    pub athletes: HashMap<String, AthleteGoals>,
}

impl GoalState {
    /// Load goal state with shared locking
    ///
    /// Returns default state if the file doesn't exist or can't be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match locked_file::read_shared(path) {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                tracing::debug!("No goal state file found, using default state");
                return Ok(Self::default());
            }
            Err(e) => {
                tracing::warn!("Failed to read goal state {:?}: {}. Using defaults.", path, e);
                return Ok(Self::default());
            }
        };

        match serde_json::from_str::<GoalState>(&contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(
                    "Failed to parse goal state {:?}: {}. Using defaults.",
                    path,
                    e
                );
                Ok(Self::default())
            }
        }
    }

    /// Atomically save: temp file, fsync, rename
    pub fn save(&self, path: &Path) -> Result<()> {
        locked_file::write_json_atomic(path, self)?;
        tracing::debug!("Saved goal state to {:?}", path);
        Ok(())
    }

    /// Load, modify and save back under the writer lock
    pub fn update<F>(path: &Path, f: F) -> Result<Self>
    where
        F: FnOnce(&mut GoalState) -> Result<()>,
    {
        let _lock = WriteLock::acquire(path)?;
        let mut state = Self::load(path)?;
        f(&mut state)?;
        state.save(path)?;
        Ok(state)
    }
}

/// Goal tracker persisted to a JSON state file
#[derive(Debug, Clone)]
pub struct GoalLedger {
    path: PathBuf,
}

impl GoalLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn athlete(&self, athlete_id: &str) -> Result<AthleteGoals> {
        Ok(GoalState::load(&self.path)?
            .athletes
            .remove(athlete_id)
            .unwrap_or_default())
    }
}

impl GoalTracker for GoalLedger {
    fn record_strength_result(&mut self, athlete_id: &str, results: &[StrengthResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        GoalState::update(&self.path, |state| {
            let improved = state
                .athletes
                .entry(athlete_id.to_string())
                .or_default()
                .apply_strength(results);
            tracing::info!("Strength goals: {} new bests for {}", improved, athlete_id);
            Ok(())
        })?;
        Ok(())
    }

    fn record_consistency_event(&mut self, athlete_id: &str) -> Result<()> {
        GoalState::update(&self.path, |state| {
            state
                .athletes
                .entry(athlete_id.to_string())
                .or_default()
                .apply_consistency();
            Ok(())
        })?;
        Ok(())
    }
}

/// In-process goal tracker
#[derive(Debug, Default)]
pub struct MemoryGoals {
    pub state: GoalState,
}

impl MemoryGoals {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GoalTracker for MemoryGoals {
    fn record_strength_result(&mut self, athlete_id: &str, results: &[StrengthResult]) -> Result<()> {
        self.state
            .athletes
            .entry(athlete_id.to_string())
            .or_default()
            .apply_strength(results);
        Ok(())
    }

    fn record_consistency_event(&mut self, athlete_id: &str) -> Result<()> {
        self.state
            .athletes
            .entry(athlete_id.to_string())
            .or_default()
            .apply_consistency();
        Ok(())
    }
}
