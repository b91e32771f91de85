//! Core domain types for the Liftplan system.
//!
//! This module defines the workout tree and the records exchanged with stores:
//! - Sessions, blocks, exercises and sets
//! - Metric values (targets prescribed by a coach, actuals logged by an athlete)
//! - Schedule records and assigned plans
//! - Workout log entries used for history and personal bests

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

// ============================================================================
// Metric Types
// ============================================================================

/// A metric an exercise can display and record
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Reps,
    Weight,
    PercentOneRm,
    Rpe,
    Distance,
    Time,
    Tempo,
}

/// A typed value for a single metric
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "metric", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Reps(u32),
    Weight(f64),
    PercentOneRm(f64),
    Rpe(f64),
    Distance(f64),
    /// Seconds
    Time(u32),
    Tempo(String),
}

impl MetricValue {
    pub fn metric(&self) -> Metric {
        match self {
            MetricValue::Reps(_) => Metric::Reps,
            MetricValue::Weight(_) => Metric::Weight,
            MetricValue::PercentOneRm(_) => Metric::PercentOneRm,
            MetricValue::Rpe(_) => Metric::Rpe,
            MetricValue::Distance(_) => Metric::Distance,
            MetricValue::Time(_) => Metric::Time,
            MetricValue::Tempo(_) => Metric::Tempo,
        }
    }
}

/// Optional value per metric, used for both targets and actuals
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct SetValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_one_rm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpe: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<String>,
}

impl SetValues {
    /// Store a value in the slot for its metric
    pub fn put(&mut self, value: MetricValue) {
        match value {
            MetricValue::Reps(v) => self.reps = Some(v),
            MetricValue::Weight(v) => self.weight = Some(v),
            MetricValue::PercentOneRm(v) => self.percent_one_rm = Some(v),
            MetricValue::Rpe(v) => self.rpe = Some(v),
            MetricValue::Distance(v) => self.distance = Some(v),
            MetricValue::Time(v) => self.time_seconds = Some(v),
            MetricValue::Tempo(v) => self.tempo = Some(v),
        }
    }

    /// Clear the slot for a metric
    pub fn clear(&mut self, metric: Metric) {
        match metric {
            Metric::Reps => self.reps = None,
            Metric::Weight => self.weight = None,
            Metric::PercentOneRm => self.percent_one_rm = None,
            Metric::Rpe => self.rpe = None,
            Metric::Distance => self.distance = None,
            Metric::Time => self.time_seconds = None,
            Metric::Tempo => self.tempo = None,
        }
    }

    /// Per-metric fallback: take our value where present, else `other`'s
    pub fn or(&self, other: &SetValues) -> SetValues {
        SetValues {
            reps: self.reps.or(other.reps),
            weight: self.weight.or(other.weight),
            percent_one_rm: self.percent_one_rm.or(other.percent_one_rm),
            rpe: self.rpe.or(other.rpe),
            distance: self.distance.or(other.distance),
            time_seconds: self.time_seconds.or(other.time_seconds),
            tempo: self.tempo.clone().or_else(|| other.tempo.clone()),
        }
    }
}

// ============================================================================
// Workout Tree
// ============================================================================

/// Kind of set
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SetType {
    #[default]
    Normal,
    Warmup,
    Dropset,
    Amrap,
}

/// One prescribed/logged unit of work
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSet {
    pub id: String,
    #[serde(default)]
    pub set_type: SetType,
    #[serde(default)]
    pub target: SetValues,
    #[serde(default)]
    pub actual: SetValues,
    /// Prescribed rest after this set, overrides the shared preset
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub is_completed: bool,
}

impl WorkoutSet {
    pub fn new(target: SetValues) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            set_type: SetType::Normal,
            target,
            actual: SetValues::default(),
            rest_seconds: None,
            is_completed: false,
        }
    }
}

/// An exercise within a block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: String,
    /// Catalog exercise id
    pub exercise_ref: String,
    pub name: String,
    #[serde(default)]
    pub visible_metrics: Vec<Metric>,
    #[serde(default)]
    pub sets: Vec<WorkoutSet>,
}

/// Execution mode shared by a block's exercises
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockMode {
    #[default]
    Sequential,
    Superset,
    Circuit,
}

/// An ordered group of exercises
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mode: BlockMode,
    /// Circuit only
    #[serde(default)]
    pub rounds: Option<u32>,
    /// Circuit only
    #[serde(default)]
    pub rest_between_rounds: Option<u32>,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
    #[serde(default)]
    pub completed: bool,
    /// Seconds timed on this block, as of the last schedule write
    #[serde(default)]
    pub elapsed_seconds: u32,
}

impl Block {
    pub fn new(name: impl Into<String>, mode: BlockMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            mode,
            rounds: None,
            rest_between_rounds: None,
            exercises: Vec::new(),
            completed: false,
            elapsed_seconds: 0,
        }
    }
}

/// Where a session came from, which decides how it is persisted
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOrigin {
    /// Athlete-created session backed by a single schedule record
    Custom { record_id: Uuid },
    /// Scheduled instance of a coach-assigned plan session
    PlanDerived {
        plan_id: String,
        plan_name: String,
        session_id: String,
    },
}

/// One scheduled unit of training
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub origin: SessionOrigin,
    pub date: NaiveDate,
    pub title: String,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Display identifier (`{plan_id}-{session_id}` for plan-derived sessions)
    pub fn id(&self) -> String {
        match &self.origin {
            SessionOrigin::Custom { record_id } => record_id.to_string(),
            SessionOrigin::PlanDerived {
                plan_id,
                session_id,
                ..
            } => format!("{}-{}", plan_id, session_id),
        }
    }

    pub fn is_plan_derived(&self) -> bool {
        matches!(self.origin, SessionOrigin::PlanDerived { .. })
    }

    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == block_id)
    }

    pub fn block_index(&self, block_id: &str) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == block_id)
    }

    /// True iff every block is completed (an empty session is never complete)
    pub fn all_blocks_completed(&self) -> bool {
        !self.blocks.is_empty() && self.blocks.iter().all(|b| b.completed)
    }
}

/// Addresses a single set in the tree
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SetPath {
    pub block_id: String,
    pub exercise_id: String,
    pub set_id: String,
}

impl SetPath {
    pub fn new(
        block_id: impl Into<String>,
        exercise_id: impl Into<String>,
        set_id: impl Into<String>,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            exercise_id: exercise_id.into(),
            set_id: set_id.into(),
        }
    }
}

// ============================================================================
// Schedule and Plan Types
// ============================================================================

/// Natural key of a schedule record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub athlete_id: String,
    pub date: NaiveDate,
}

/// Mutable fields of a schedule record
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ScheduleFields {
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub plan_name: Option<String>,
    #[serde(default)]
    pub session_title: Option<String>,
    /// Workout tree; `None` means the plan template applies unchanged
    #[serde(default)]
    pub workout_data: Option<Vec<Block>>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A durable per-athlete, per-date schedule entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScheduleRecord {
    pub id: Uuid,
    pub athlete_id: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub fields: ScheduleFields,
}

impl ScheduleRecord {
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey {
            athlete_id: self.athlete_id.clone(),
            date: self.date,
        }
    }
}

/// A session template inside a plan
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlanSession {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
}

/// One week of a plan
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct PlanWeek {
    #[serde(default)]
    pub sessions: Vec<PlanSession>,
}

/// Static plan structure
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct PlanStructure {
    #[serde(default)]
    pub weeks: Vec<PlanWeek>,
}

impl PlanStructure {
    pub fn find_session(&self, session_id: &str) -> Option<&PlanSession> {
        self.weeks
            .iter()
            .flat_map(|w| w.sessions.iter())
            .find(|s| s.id == session_id)
    }
}

/// A plan assigned to an athlete with its date schedule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AssignedPlan {
    pub plan_id: String,
    pub plan_name: String,
    /// date -> plan session id
    #[serde(default)]
    pub schedule: BTreeMap<NaiveDate, String>,
    #[serde(default)]
    pub structure: PlanStructure,
}

// ============================================================================
// Workout Log Types
// ============================================================================

/// A set as recorded in the workout log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoggedSet {
    pub set_type: SetType,
    pub values: SetValues,
    pub completed: bool,
}

/// One exercise's result within a completed block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutLogEntry {
    pub id: Uuid,
    pub athlete_id: String,
    pub session_id: String,
    pub date: NaiveDate,
    pub block_id: String,
    pub exercise_ref: String,
    pub exercise_name: String,
    pub sets: Vec<LoggedSet>,
    pub duration_seconds: u32,
    pub logged_at: DateTime<Utc>,
}

/// Strength goal input: heaviest load moved for an exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StrengthResult {
    pub exercise_ref: String,
    pub max_weight: f64,
}
