//! Live session execution.
//!
//! The orchestrator owns the workout tree for one session and drives the
//! block clock and rest timer from it. Every transition is applied to the
//! in-memory state first; durable writes and history reads are queued as
//! commands and executed by [`SessionOrchestrator::flush`]. A failed command
//! is logged and reported but never rolls back the local state.
//!
//! Block lifecycle: `Inactive -> Active -> Completed`, with `Completed ->
//! Active` allowed (the block's timer restarts from zero).

use crate::block_timer::BlockClock;
use crate::goals::{extract_strength_results, GoalTracker};
use crate::history::{self, ExerciseHistory, HistoryStore};
use crate::progression::next_block_to_activate;
use crate::reconciler::{self, ScheduleWrite};
use crate::rest_timer::{AlertSink, RestTick, RestTimer, RestTimerState};
use crate::schedule::ScheduleStore;
use crate::tree::{self, SetEdit, TreeEdit};
use crate::{
    Block, Config, Error, LoggedSet, Result, Session, SetPath, StrengthResult, WorkoutLogEntry,
};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, VecDeque};
use uuid::Uuid;

/// Whether the caller already agreed to run blocks side by side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Consent {
    Ask,
    Proceed,
}

/// Soft guard raised when starting a block while others are active
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipleActiveBlocksWarning {
    pub requested: String,
    pub active: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Activation {
    Started { block_id: String, reactivated: bool },
    AlreadyActive,
    NeedsConfirmation(MultipleActiveBlocksWarning),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    Inactive,
    Active,
    Completed,
}

/// Outcome of toggling a set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetToggle {
    pub completed: bool,
    /// Rest countdown started by this toggle
    pub rest: Option<RestTimerState>,
}

/// Outcome of completing a block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockCompletion {
    pub block_id: String,
    pub elapsed_seconds: u32,
    pub session_completed: bool,
    pub auto_activated: Option<String>,
}

/// Deferred store interaction
#[derive(Clone, Debug, PartialEq)]
pub enum PersistCommand {
    LookupHistory { exercise_refs: Vec<String> },
    AppendLogs { entries: Vec<WorkoutLogEntry> },
    TrackStrength { results: Vec<StrengthResult> },
    TrackConsistency,
    WriteSchedule(ScheduleWrite),
}

impl PersistCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistCommand::LookupHistory { .. } => "history_lookup",
            PersistCommand::AppendLogs { .. } => "append_logs",
            PersistCommand::TrackStrength { .. } => "track_strength",
            PersistCommand::TrackConsistency => "track_consistency",
            PersistCommand::WriteSchedule(_) => "write_schedule",
        }
    }
}

/// Stores the queued commands run against
pub struct Backends<'a> {
    pub schedule: &'a mut dyn ScheduleStore,
    pub history: &'a mut dyn HistoryStore,
    pub goals: &'a mut dyn GoalTracker,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: &'static str,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub executed: usize,
    pub failures: Vec<CommandFailure>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Single writer of a live session's workout tree
#[derive(Debug)]
pub struct SessionOrchestrator {
    athlete_id: String,
    session: Session,
    active: BTreeSet<String>,
    clock: BlockClock,
    rest: RestTimer,
    /// Block time stored before this run, keyed by block id
    banked: HashMap<String, u32>,
    /// Stored duration not attributed to any block
    untracked_seconds: u32,
    outbox: VecDeque<PersistCommand>,
    history: HashMap<String, ExerciseHistory>,
    history_limit: usize,
}

impl SessionOrchestrator {
    pub fn new(athlete_id: impl Into<String>, session: Session) -> Self {
        Self::from_config(athlete_id, session, &Config::default())
    }

    pub fn from_config(athlete_id: impl Into<String>, session: Session, config: &Config) -> Self {
        let banked: HashMap<String, u32> = session
            .blocks
            .iter()
            .filter(|b| b.elapsed_seconds > 0)
            .map(|b| (b.id.clone(), b.elapsed_seconds))
            .collect();
        let untracked_seconds = session
            .duration_seconds
            .saturating_sub(banked.values().sum());

        Self {
            athlete_id: athlete_id.into(),
            banked,
            untracked_seconds,
            session,
            active: BTreeSet::new(),
            clock: BlockClock::new(),
            rest: RestTimer::new(config.rest.default_seconds),
            outbox: VecDeque::new(),
            history: HashMap::new(),
            history_limit: config.history.lookup_limit,
        }
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn athlete_id(&self) -> &str {
        &self.athlete_id
    }

    pub fn block_state(&self, block_id: &str) -> Option<BlockState> {
        let block = self.session.block(block_id)?;
        Some(if self.active.contains(block_id) {
            BlockState::Active
        } else if block.completed {
            BlockState::Completed
        } else {
            BlockState::Inactive
        })
    }

    /// Active block ids in session order
    pub fn active_blocks(&self) -> Vec<&str> {
        self.session
            .blocks
            .iter()
            .filter(|b| self.active.contains(&b.id))
            .map(|b| b.id.as_str())
            .collect()
    }

    /// Whether the shared block tick source is running
    pub fn is_ticking(&self) -> bool {
        self.clock.is_running()
    }

    /// Time on a block across runs; `None` if it was never timed
    pub fn elapsed(&self, block_id: &str) -> Option<u32> {
        let banked = self.banked.get(block_id).copied();
        let live = self.clock.elapsed(block_id);
        if banked.is_none() && live.is_none() {
            return None;
        }
        Some(banked.unwrap_or(0) + live.unwrap_or(0))
    }

    /// Session duration: every block's time plus stored time not tied to a block
    pub fn total_elapsed(&self) -> u32 {
        let ids = || self.session.blocks.iter().map(|b| b.id.as_str());
        let banked: u32 = ids().filter_map(|id| self.banked.get(id)).sum();
        self.untracked_seconds + banked + self.clock.total_elapsed(ids())
    }

    /// Copy block times and the session duration into `session` before a write
    fn stamp_elapsed(&self, session: &mut Session) {
        for block in &mut session.blocks {
            block.elapsed_seconds = self.elapsed(&block.id).unwrap_or(0);
        }
        session.duration_seconds = self.total_elapsed();
    }

    pub fn rest_state(&self) -> RestTimerState {
        self.rest.state()
    }

    pub fn history_for(&self, exercise_ref: &str) -> Option<&ExerciseHistory> {
        self.history.get(exercise_ref)
    }

    pub fn pending_commands(&self) -> impl Iterator<Item = &PersistCommand> {
        self.outbox.iter()
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Start a block
    ///
    /// If another block is active and `consent` is [`Consent::Ask`], nothing
    /// changes and a [`MultipleActiveBlocksWarning`] is returned for the
    /// caller to confirm.
    pub fn activate_block(&mut self, block_id: &str, consent: Consent) -> Result<Activation> {
        if self.session.block(block_id).is_none() {
            return Err(Error::NotFound(format!("block {}", block_id)));
        }
        if self.active.contains(block_id) {
            return Ok(Activation::AlreadyActive);
        }

        let others: Vec<String> = self.active_blocks().into_iter().map(String::from).collect();
        if !others.is_empty() {
            if consent == Consent::Ask {
                return Ok(Activation::NeedsConfirmation(MultipleActiveBlocksWarning {
                    requested: block_id.to_string(),
                    active: others,
                }));
            }
            tracing::info!(
                "Activating block {} alongside {} active block(s)",
                block_id,
                others.len()
            );
        }

        self.start_block(block_id)
    }

    fn start_block(&mut self, block_id: &str) -> Result<Activation> {
        let reactivated = self
            .session
            .block(block_id)
            .map(|b| b.completed)
            .unwrap_or(false);

        if reactivated {
            let mut next = tree::set_block_completed(&self.session, block_id, false)?;
            next.completed_at = None;
            self.session = next;
            self.banked.remove(block_id);
            self.clock.clear(block_id);
            tracing::info!("Re-activating completed block {}", block_id);
        }

        self.clock.activate(block_id, Utc::now());
        self.active.insert(block_id.to_string());

        let mut exercise_refs: Vec<String> = self
            .session
            .block(block_id)
            .map(|b| b.exercises.iter().map(|e| e.exercise_ref.clone()).collect())
            .unwrap_or_default();
        exercise_refs.sort();
        exercise_refs.dedup();
        if !exercise_refs.is_empty() {
            self.outbox
                .push_back(PersistCommand::LookupHistory { exercise_refs });
        }

        tracing::info!("Block {} active", block_id);
        Ok(Activation::Started {
            block_id: block_id.to_string(),
            reactivated,
        })
    }

    /// Toggle a set's completion; completing it starts the rest countdown
    pub fn complete_set(&mut self, block_id: &str, exercise_id: &str, set_id: &str) -> Result<SetToggle> {
        let path = SetPath::new(block_id, exercise_id, set_id);
        let set = tree::find_set(&self.session, &path)
            .ok_or_else(|| Error::NotFound(format!("set {}", set_id)))?;
        let completed = !set.is_completed;
        let prescribed_rest = set.rest_seconds;

        self.session = tree::set_set_completed(&self.session, &path, completed)?;

        let rest = completed.then(|| self.rest.start(set_id, prescribed_rest));
        Ok(SetToggle { completed, rest })
    }

    /// Record an athlete-entered value on a set
    pub fn log_set_value(&mut self, path: &SetPath, edit: SetEdit) -> Result<()> {
        self.session = tree::update_set_actual(&self.session, path, &edit)?;
        Ok(())
    }

    /// Apply a structural or prescription edit and queue the schedule write
    ///
    /// Blocks in progress only accept set values and completion changes.
    pub fn apply_edit(&mut self, edit: TreeEdit) -> Result<()> {
        if let Some(block_id) = edit.target_block() {
            if self.active.contains(block_id) {
                return Err(Error::StructuralEditNotAllowed(format!(
                    "block {} is active",
                    block_id
                )));
            }
        }

        self.session = edit.apply(&self.session)?;
        if let TreeEdit::RemoveBlock { block_id } = &edit {
            self.banked.remove(block_id);
            self.clock.clear(block_id);
        }
        self.enqueue_schedule_write();
        Ok(())
    }

    /// Queue a write of the current tree, e.g. before leaving a session mid-block
    pub fn checkpoint(&mut self) {
        let mut session = self.session.clone();
        self.stamp_elapsed(&mut session);
        self.session = session;
        self.enqueue_schedule_write();
    }

    /// Finish an active block
    ///
    /// Stops the rest countdown, queues the workout log, goal tracking and
    /// schedule write, marks the block done and auto-activates its successor.
    pub fn complete_block(&mut self, block_id: &str) -> Result<BlockCompletion> {
        if !self.active.contains(block_id) {
            return Err(Error::BlockNotActive(block_id.to_string()));
        }
        let block = self
            .session
            .block(block_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("block {}", block_id)))?;

        self.rest.stop();

        let elapsed = self.elapsed(block_id).unwrap_or(0);
        let entries = self.log_entries(&block, elapsed);
        if !entries.is_empty() {
            self.outbox.push_back(PersistCommand::AppendLogs { entries });
        }

        let results = extract_strength_results(&block);
        if !results.is_empty() {
            self.outbox
                .push_back(PersistCommand::TrackStrength { results });
        }
        self.outbox.push_back(PersistCommand::TrackConsistency);

        // session completion is derived from the post-mutation block list
        let mut next = tree::set_block_completed(&self.session, block_id, true)?;
        self.stamp_elapsed(&mut next);
        next.completed_at = next.completed.then(Utc::now);
        self.session = next;

        self.enqueue_schedule_write();

        // the successor starts before this block's timer is dropped, so the
        // shared tick source only stops when no block is left
        let successor = next_block_to_activate(&self.session, block_id)
            .filter(|id| !self.active.contains(*id))
            .map(String::from);
        if let Some(next_id) = &successor {
            self.start_block(next_id)?;
        }

        self.active.remove(block_id);
        self.clock.deactivate(block_id);

        tracing::info!(
            "Block {} completed in {}s (session complete: {})",
            block_id,
            elapsed,
            self.session.completed
        );

        Ok(BlockCompletion {
            block_id: block_id.to_string(),
            elapsed_seconds: elapsed,
            session_completed: self.session.completed,
            auto_activated: successor,
        })
    }

    pub fn stop_rest(&mut self) -> bool {
        self.rest.stop()
    }

    // ------------------------------------------------------------------
    // Ticks
    // ------------------------------------------------------------------

    /// One second of the shared block tick source
    pub fn tick_blocks(&mut self) {
        self.clock.tick();
    }

    /// One second of the rest countdown
    pub fn tick_rest(&mut self, alerts: &mut dyn AlertSink) -> RestTick {
        self.rest.tick(alerts)
    }

    pub fn tick(&mut self, alerts: &mut dyn AlertSink) -> RestTick {
        self.tick_blocks();
        self.tick_rest(alerts)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn enqueue_schedule_write(&mut self) {
        let write = reconciler::build_write(&self.session, &self.athlete_id);
        self.outbox.push_back(PersistCommand::WriteSchedule(write));
    }

    fn log_entries(&self, block: &Block, elapsed: u32) -> Vec<WorkoutLogEntry> {
        let logged_at = Utc::now();
        let session_id = self.session.id();
        block
            .exercises
            .iter()
            .map(|exercise| WorkoutLogEntry {
                id: Uuid::new_v4(),
                athlete_id: self.athlete_id.clone(),
                session_id: session_id.clone(),
                date: self.session.date,
                block_id: block.id.clone(),
                exercise_ref: exercise.exercise_ref.clone(),
                exercise_name: exercise.name.clone(),
                sets: exercise
                    .sets
                    .iter()
                    .map(|set| LoggedSet {
                        set_type: set.set_type,
                        values: set.actual.or(&set.target),
                        completed: set.is_completed,
                    })
                    .collect(),
                duration_seconds: elapsed,
                logged_at,
            })
            .collect()
    }

    /// Execute queued commands in order
    ///
    /// Failures are logged and reported; the in-memory session is kept as is
    /// and nothing is retried.
    pub fn flush(&mut self, backends: &mut Backends<'_>) -> FlushReport {
        let mut report = FlushReport::default();

        while let Some(command) = self.outbox.pop_front() {
            let kind = command.kind();
            let result = match command {
                PersistCommand::LookupHistory { exercise_refs } => history::lookup(
                    &*backends.history,
                    &self.athlete_id,
                    &exercise_refs,
                    self.history_limit,
                )
                .map(|found| self.history.extend(found)),
                PersistCommand::AppendLogs { entries } => backends.history.append_logs(&entries),
                PersistCommand::TrackStrength { results } => backends
                    .goals
                    .record_strength_result(&self.athlete_id, &results),
                PersistCommand::TrackConsistency => {
                    backends.goals.record_consistency_event(&self.athlete_id)
                }
                PersistCommand::WriteSchedule(write) => {
                    reconciler::apply_write(&mut *backends.schedule, &write).map(|_| ())
                }
            };

            match result {
                Ok(()) => report.executed += 1,
                Err(e) => {
                    tracing::warn!("{} failed, keeping local state: {}", kind, e);
                    report.failures.push(CommandFailure {
                        command: kind,
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_default_catalog;
    use crate::goals::MemoryGoals;
    use crate::history::MemoryHistory;
    use crate::logging::init_test;
    use crate::plans::MemoryPlanStore;
    use crate::rest_timer::tests::RecordingAlerts;
    use crate::schedule::MemoryScheduleStore;
    use crate::tree::exercise_from_catalog;
    use crate::{
        AssignedPlan, BlockMode, MetricValue, PlanSession, PlanStructure, PlanWeek,
        ScheduleFields, ScheduleKey, ScheduleRecord, SessionOrigin, SetValues,
    };
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
    }

    fn block(name: &str, exercise: &str, sets: u32) -> Block {
        let catalog = get_default_catalog();
        let mut block = Block::new(name, BlockMode::Sequential);
        block.exercises.push(exercise_from_catalog(
            catalog.get(exercise).unwrap(),
            sets,
            SetValues {
                reps: Some(5),
                weight: Some(60.0),
                ..Default::default()
            },
        ));
        block
    }

    /// Two blocks, one exercise with one set each
    fn two_block_session(store: &mut MemoryScheduleStore) -> Session {
        reconciler::create_custom_session(
            store,
            "ath",
            date(),
            "Full body",
            vec![block("A", "goblet_squat", 1), block("B", "bench_press", 1)],
        )
        .unwrap()
    }

    fn ids(orch: &SessionOrchestrator, idx: usize) -> (String, String, String) {
        let block = &orch.session().blocks[idx];
        let exercise = &block.exercises[0];
        (
            block.id.clone(),
            exercise.id.clone(),
            exercise.sets[0].id.clone(),
        )
    }

    struct Stores {
        schedule: MemoryScheduleStore,
        history: MemoryHistory,
        goals: MemoryGoals,
    }

    impl Stores {
        fn new() -> Self {
            Self {
                schedule: MemoryScheduleStore::new(),
                history: MemoryHistory::new(),
                goals: MemoryGoals::new(),
            }
        }

        fn flush(&mut self, orch: &mut SessionOrchestrator) -> FlushReport {
            orch.flush(&mut Backends {
                schedule: &mut self.schedule,
                history: &mut self.history,
                goals: &mut self.goals,
            })
        }
    }

    #[test]
    fn test_scenario_complete_first_block_auto_progresses() {
        init_test();
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, ex_a, set_a) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&a, Consent::Ask).unwrap();
        assert_eq!(orch.active_blocks(), vec![a.as_str()]);

        let toggle = orch.complete_set(&a, &ex_a, &set_a).unwrap();
        let rest = toggle.rest.unwrap();
        assert!(rest.active);
        assert_eq!(rest.seconds_remaining, 90);

        let done = orch.complete_block(&a).unwrap();
        assert!(!orch.rest_state().active);
        assert_eq!(orch.block_state(&a), Some(BlockState::Completed));
        assert_eq!(orch.active_blocks(), vec![b.as_str()]);
        assert_eq!(done.auto_activated.as_deref(), Some(b.as_str()));
        assert!(!orch.session().completed);
        assert!(orch.is_ticking());
    }

    #[test]
    fn test_scenario_complete_both_blocks() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let mut alerts = RecordingAlerts::default();
        let (a, _, _) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&a, Consent::Ask).unwrap();
        for _ in 0..30 {
            orch.tick(&mut alerts);
        }
        orch.complete_block(&a).unwrap();
        for _ in 0..45 {
            orch.tick(&mut alerts);
        }
        let done = orch.complete_block(&b).unwrap();

        assert!(done.session_completed);
        assert_eq!(done.auto_activated, None);
        assert!(orch.session().completed);
        assert!(orch.session().completed_at.is_some());
        assert_eq!(orch.session().duration_seconds, 75);
        assert_eq!(orch.elapsed(&a), Some(30));
        assert_eq!(orch.elapsed(&b), Some(45));
        assert!(orch.active_blocks().is_empty());
        assert!(!orch.is_ticking());

        let report = stores.flush(&mut orch);
        assert!(report.is_clean(), "{:?}", report.failures);
        let record = &stores.schedule.records()[0];
        assert!(record.fields.completed);
        assert_eq!(record.fields.duration_seconds, 75);
        assert_eq!(stores.history.entries().len(), 2);
        assert_eq!(stores.goals.state.athletes["ath"].consistency_count, 2);
    }

    #[test]
    fn test_scenario_second_block_needs_confirmation() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.tick_blocks();

        let asked = orch.activate_block(&b, Consent::Ask).unwrap();
        assert_eq!(
            asked,
            Activation::NeedsConfirmation(MultipleActiveBlocksWarning {
                requested: b.clone(),
                active: vec![a.clone()],
            })
        );
        assert_eq!(orch.block_state(&b), Some(BlockState::Inactive));

        let started = orch.activate_block(&b, Consent::Proceed).unwrap();
        assert!(matches!(started, Activation::Started { reactivated: false, .. }));
        assert_eq!(orch.active_blocks(), vec![a.as_str(), b.as_str()]);

        orch.tick_blocks();
        orch.tick_blocks();
        assert_eq!(orch.elapsed(&a), Some(3));
        assert_eq!(orch.elapsed(&b), Some(2));
    }

    #[test]
    fn test_activating_active_block_is_noop() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);

        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.tick_blocks();
        assert_eq!(
            orch.activate_block(&a, Consent::Ask).unwrap(),
            Activation::AlreadyActive
        );
        assert_eq!(orch.elapsed(&a), Some(1));
    }

    #[test]
    fn test_auto_progression_keeps_other_timers() {
        let mut stores = Stores::new();
        let session = reconciler::create_custom_session(
            &mut stores.schedule,
            "ath",
            date(),
            "Three",
            vec![
                block("Warmup", "hip_cars", 1),
                block("Main", "back_squat", 1),
                block("Finisher", "kb_swing", 1),
            ],
        )
        .unwrap();
        let mut orch = SessionOrchestrator::new("ath", session);
        let (warmup, _, _) = ids(&orch, 0);
        let (main, _, _) = ids(&orch, 1);
        let (finisher, _, _) = ids(&orch, 2);

        orch.activate_block(&warmup, Consent::Ask).unwrap();
        orch.tick_blocks();
        orch.activate_block(&main, Consent::Proceed).unwrap();
        for _ in 0..4 {
            orch.tick_blocks();
        }

        // main is already running, so completing the warmup starts nothing
        let done = orch.complete_block(&warmup).unwrap();
        assert_eq!(done.auto_activated, None);
        assert_eq!(orch.elapsed(&main), Some(4));

        orch.tick_blocks();
        let done = orch.complete_block(&main).unwrap();
        assert_eq!(done.elapsed_seconds, 5);
        assert_eq!(done.auto_activated.as_deref(), Some(finisher.as_str()));
        assert_eq!(orch.elapsed(&finisher), Some(0));
        assert_eq!(orch.total_elapsed(), 10);
    }

    #[test]
    fn test_completed_successor_is_not_reactivated() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&b, Consent::Ask).unwrap();
        orch.complete_block(&b).unwrap();
        orch.activate_block(&a, Consent::Ask).unwrap();
        let done = orch.complete_block(&a).unwrap();

        assert_eq!(done.auto_activated, None);
        assert!(done.session_completed);
        assert!(!orch.is_ticking());
    }

    #[test]
    fn test_uncompleting_set_leaves_rest_alone() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let mut alerts = RecordingAlerts::default();
        let (a, ex, set) = ids(&orch, 0);

        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.complete_set(&a, &ex, &set).unwrap();
        orch.tick(&mut alerts);

        let toggle = orch.complete_set(&a, &ex, &set).unwrap();
        assert!(!toggle.completed);
        assert!(toggle.rest.is_none());
        let rest = orch.rest_state();
        assert!(rest.active);
        assert_eq!(rest.seconds_remaining, 89);
    }

    #[test]
    fn test_prescribed_rest_overrides_preset() {
        let mut stores = Stores::new();
        let mut session = two_block_session(&mut stores.schedule);
        session.blocks[0].exercises[0].sets[0].rest_seconds = Some(3);
        let mut orch = SessionOrchestrator::new("ath", session);
        let mut alerts = RecordingAlerts::default();
        let (a, ex, set) = ids(&orch, 0);

        orch.activate_block(&a, Consent::Ask).unwrap();
        let toggle = orch.complete_set(&a, &ex, &set).unwrap();
        assert_eq!(toggle.rest.unwrap().seconds_remaining, 3);

        orch.tick(&mut alerts);
        orch.tick(&mut alerts);
        assert!(matches!(orch.tick(&mut alerts), RestTick::Expired { .. }));
        assert_eq!(alerts.chimes.len(), 1);
        assert!(!orch.rest_state().active);
    }

    #[test]
    fn test_complete_block_requires_active() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);

        assert!(matches!(
            orch.complete_block(&a),
            Err(Error::BlockNotActive(_))
        ));
        assert!(matches!(
            orch.activate_block("missing", Consent::Ask),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_reactivating_completed_block_restarts_timer() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&b, Consent::Ask).unwrap();
        orch.tick_blocks();
        orch.complete_block(&b).unwrap();
        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.complete_block(&a).unwrap();
        assert!(orch.session().completed);

        let again = orch.activate_block(&b, Consent::Ask).unwrap();
        assert!(matches!(again, Activation::Started { reactivated: true, .. }));
        assert_eq!(orch.block_state(&b), Some(BlockState::Active));
        assert_eq!(orch.elapsed(&b), Some(0));
        assert!(!orch.session().completed);
        assert!(orch.session().completed_at.is_none());
    }

    #[test]
    fn test_reactivating_after_reload_does_not_double_count() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let mut alerts = RecordingAlerts::default();
        let (a, _, _) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&a, Consent::Ask).unwrap();
        for _ in 0..30 {
            orch.tick(&mut alerts);
        }
        orch.complete_block(&a).unwrap();
        for _ in 0..45 {
            orch.tick(&mut alerts);
        }
        orch.complete_block(&b).unwrap();
        assert!(stores.flush(&mut orch).is_clean());

        let stored = stores.schedule.records()[0].fields.workout_data.clone().unwrap();
        assert_eq!(stored[0].elapsed_seconds, 30);
        assert_eq!(stored[1].elapsed_seconds, 45);

        // a later run picks the session up from its stored state
        let mut reloaded = orch.session().clone();
        reloaded.blocks = stored;
        let mut orch = SessionOrchestrator::new("ath", reloaded);
        assert_eq!(orch.total_elapsed(), 75);
        assert_eq!(orch.elapsed(&b), Some(45));

        orch.activate_block(&b, Consent::Ask).unwrap();
        assert_eq!(orch.elapsed(&b), Some(0));
        for _ in 0..10 {
            orch.tick(&mut alerts);
        }
        let done = orch.complete_block(&b).unwrap();

        assert_eq!(done.elapsed_seconds, 10);
        assert_eq!(orch.session().duration_seconds, 40);
        assert_eq!(orch.session().blocks[1].elapsed_seconds, 10);
    }

    #[test]
    fn test_resumed_block_keeps_earlier_time() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);

        orch.activate_block(&a, Consent::Ask).unwrap();
        for _ in 0..20 {
            orch.tick_blocks();
        }
        orch.checkpoint();
        assert_eq!(orch.session().duration_seconds, 20);

        let mut orch = SessionOrchestrator::new("ath", orch.session().clone());
        orch.activate_block(&a, Consent::Ask).unwrap();
        for _ in 0..5 {
            orch.tick_blocks();
        }
        let done = orch.complete_block(&a).unwrap();

        assert_eq!(done.elapsed_seconds, 25);
        assert_eq!(orch.session().duration_seconds, 25);
    }

    #[test]
    fn test_log_entries_fall_back_to_target() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, ex, set) = ids(&orch, 0);
        let path = SetPath::new(&a, &ex, &set);

        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.log_set_value(&path, SetEdit::Put(MetricValue::Reps(7)))
            .unwrap();
        orch.complete_set(&a, &ex, &set).unwrap();
        orch.tick_blocks();
        orch.complete_block(&a).unwrap();

        let entries = orch
            .pending_commands()
            .find_map(|c| match c {
                PersistCommand::AppendLogs { entries } => Some(entries.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(entries.len(), 1);
        let logged = &entries[0].sets[0];
        assert_eq!(logged.values.reps, Some(7));
        assert_eq!(logged.values.weight, Some(60.0));
        assert!(logged.completed);
        assert_eq!(entries[0].duration_seconds, 1);

        let kinds: Vec<_> = orch.pending_commands().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "history_lookup",
                "append_logs",
                "track_strength",
                "track_consistency",
                "write_schedule",
                "history_lookup",
            ]
        );
    }

    #[test]
    fn test_structural_edit_rejected_while_block_active() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, ex, _) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&a, Consent::Ask).unwrap();
        let add_set = |block_id: &str| TreeEdit::AddSet {
            block_id: block_id.to_string(),
            exercise_id: ex.clone(),
            set: crate::WorkoutSet::new(SetValues::default()),
        };
        assert!(matches!(
            orch.apply_edit(add_set(&a)),
            Err(Error::StructuralEditNotAllowed(_))
        ));

        let catalog = get_default_catalog();
        let exercise = exercise_from_catalog(catalog.get("pullup").unwrap(), 2, SetValues::default());
        orch.apply_edit(TreeEdit::AddExercise {
            block_id: b.clone(),
            exercise,
        })
        .unwrap();
        assert_eq!(orch.session().blocks[1].exercises.len(), 2);
        assert!(orch
            .pending_commands()
            .any(|c| matches!(c, PersistCommand::WriteSchedule(_))));
    }

    struct FailingSchedule;

    impl ScheduleStore for FailingSchedule {
        fn read_range(
            &self,
            _athlete_id: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<ScheduleRecord>> {
            Err(Error::Persistence("offline".into()))
        }
        fn upsert(&mut self, _key: &ScheduleKey, _fields: ScheduleFields) -> Result<Uuid> {
            Err(Error::Persistence("offline".into()))
        }
        fn update(&mut self, _record_id: Uuid, _fields: ScheduleFields) -> Result<()> {
            Err(Error::Persistence("offline".into()))
        }
        fn insert(&mut self, _key: &ScheduleKey, _fields: ScheduleFields) -> Result<Uuid> {
            Err(Error::Persistence("offline".into()))
        }
        fn delete(&mut self, _record_id: Uuid) -> Result<()> {
            Err(Error::Persistence("offline".into()))
        }
    }

    #[test]
    fn test_persistence_failure_keeps_local_completion() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);

        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.complete_block(&a).unwrap();

        let mut failing = FailingSchedule;
        let report = orch.flush(&mut Backends {
            schedule: &mut failing,
            history: &mut stores.history,
            goals: &mut stores.goals,
        });

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].command, "write_schedule");
        assert!(report.executed > 0);
        assert_eq!(orch.block_state(&a), Some(BlockState::Completed));
        assert_eq!(orch.pending_commands().count(), 0);
        // history lookup ran against the working store
        assert!(orch.history_for("goblet_squat").is_some());
    }

    #[test]
    fn test_history_annotations_after_activation() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut first = SessionOrchestrator::new("ath", session.clone());
        let (a, _, _) = ids(&first, 0);
        first.activate_block(&a, Consent::Ask).unwrap();
        first.complete_block(&a).unwrap();
        stores.flush(&mut first);

        let mut second = SessionOrchestrator::new("ath", session);
        second.activate_block(&a, Consent::Ask).unwrap();
        stores.flush(&mut second);

        let annotation = second.history_for("goblet_squat").unwrap();
        assert_eq!(annotation.personal_best.as_ref().unwrap().weight, 60.0);
        assert_eq!(annotation.last_sets.len(), 1);
    }

    fn plan_session(stores: &Stores) -> Session {
        let mut schedule = BTreeMap::new();
        schedule.insert(date(), "d1".to_string());
        let mut plans = MemoryPlanStore::new();
        plans.assign(
            "ath",
            AssignedPlan {
                plan_id: "plan".into(),
                plan_name: "Block 1".into(),
                schedule,
                structure: PlanStructure {
                    weeks: vec![PlanWeek {
                        sessions: vec![PlanSession {
                            id: "d1".into(),
                            title: "Day 1".into(),
                            blocks: vec![block("A", "deadlift", 1), block("B", "pullup", 1)],
                        }],
                    }],
                },
            },
        );
        reconciler::load_range(&stores.schedule, &plans, "ath", date(), date())
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_plan_session_upserts_single_record() {
        let mut stores = Stores::new();
        let session = plan_session(&stores);
        assert!(matches!(session.origin, SessionOrigin::PlanDerived { .. }));
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, _, _) = ids(&orch, 0);
        let (b, _, _) = ids(&orch, 1);

        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.complete_block(&a).unwrap();
        stores.flush(&mut orch);
        orch.complete_block(&b).unwrap();
        stores.flush(&mut orch);

        assert_eq!(stores.schedule.records().len(), 1);
        let record = &stores.schedule.records()[0];
        assert_eq!(record.fields.plan_id.as_deref(), Some("plan"));
        assert!(record.fields.completed);
    }

    #[test]
    fn test_plan_session_rejects_structure_edits() {
        let stores = Stores::new();
        let mut orch = SessionOrchestrator::new("ath", plan_session(&stores));
        let (a, _, _) = ids(&orch, 0);

        let result = orch.apply_edit(TreeEdit::RemoveBlock { block_id: a });
        assert!(matches!(result, Err(Error::StructuralEditNotAllowed(_))));
        assert_eq!(orch.pending_commands().count(), 0);
    }

    #[test]
    fn test_checkpoint_persists_progress() {
        let mut stores = Stores::new();
        let session = two_block_session(&mut stores.schedule);
        let mut orch = SessionOrchestrator::new("ath", session);
        let (a, ex, set) = ids(&orch, 0);

        orch.activate_block(&a, Consent::Ask).unwrap();
        orch.complete_set(&a, &ex, &set).unwrap();
        orch.tick_blocks();
        orch.checkpoint();
        stores.flush(&mut orch);

        let record = &stores.schedule.records()[0];
        let blocks = record.fields.workout_data.as_ref().unwrap();
        assert!(blocks[0].exercises[0].sets[0].is_completed);
        assert!(!record.fields.completed);
        assert_eq!(record.fields.duration_seconds, 1);
    }
}
