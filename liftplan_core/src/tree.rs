//! Pure mutations over the workout tree.
//!
//! Every operation takes the current session by reference and returns a new
//! session, so callers can apply a change and persist the result as one step.
//! Plan-derived sessions only accept set actual values and completion flags;
//! everything else fails with [`Error::StructuralEditNotAllowed`].

use crate::catalog::CatalogExercise;
use crate::{
    Block, BlockMode, Error, Exercise, Metric, MetricValue, Result, Session, SetPath, SetValues,
    WorkoutSet,
};
use uuid::Uuid;

/// Change to a single metric slot
#[derive(Clone, Debug, PartialEq)]
pub enum SetEdit {
    Put(MetricValue),
    Clear(Metric),
}

impl SetEdit {
    fn apply_to(&self, values: &mut SetValues) {
        match self {
            SetEdit::Put(value) => values.put(value.clone()),
            SetEdit::Clear(metric) => values.clear(*metric),
        }
    }
}

/// Block metadata update; `None` leaves a field unchanged
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockPatch {
    pub name: Option<String>,
    pub mode: Option<BlockMode>,
    pub rounds: Option<Option<u32>>,
    pub rest_between_rounds: Option<Option<u32>>,
}

/// Structural or prescription edit, applied through the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub enum TreeEdit {
    AddBlock {
        block: Block,
    },
    RemoveBlock {
        block_id: String,
    },
    AddExercise {
        block_id: String,
        exercise: Exercise,
    },
    RemoveExercise {
        block_id: String,
        exercise_id: String,
    },
    ReorderExercise {
        block_id: String,
        from: usize,
        to: usize,
    },
    AddSet {
        block_id: String,
        exercise_id: String,
        set: WorkoutSet,
    },
    RemoveSet {
        path: SetPath,
    },
    UpdateSetTarget {
        path: SetPath,
        edit: SetEdit,
    },
    UpdateBlock {
        block_id: String,
        patch: BlockPatch,
    },
}

impl TreeEdit {
    /// Block the edit touches, if it addresses an existing one
    pub fn target_block(&self) -> Option<&str> {
        match self {
            TreeEdit::AddBlock { .. } => None,
            TreeEdit::RemoveBlock { block_id }
            | TreeEdit::AddExercise { block_id, .. }
            | TreeEdit::RemoveExercise { block_id, .. }
            | TreeEdit::ReorderExercise { block_id, .. }
            | TreeEdit::AddSet { block_id, .. }
            | TreeEdit::UpdateBlock { block_id, .. } => Some(block_id),
            TreeEdit::RemoveSet { path } | TreeEdit::UpdateSetTarget { path, .. } => {
                Some(&path.block_id)
            }
        }
    }

    pub fn apply(&self, session: &Session) -> Result<Session> {
        match self {
            TreeEdit::AddBlock { block } => add_block(session, block.clone()),
            TreeEdit::RemoveBlock { block_id } => remove_block(session, block_id),
            TreeEdit::AddExercise { block_id, exercise } => {
                add_exercise(session, block_id, exercise.clone())
            }
            TreeEdit::RemoveExercise {
                block_id,
                exercise_id,
            } => remove_exercise(session, block_id, exercise_id),
            TreeEdit::ReorderExercise { block_id, from, to } => {
                reorder_exercise(session, block_id, *from, *to)
            }
            TreeEdit::AddSet {
                block_id,
                exercise_id,
                set,
            } => add_set(session, block_id, exercise_id, set.clone()),
            TreeEdit::RemoveSet { path } => remove_set(session, path),
            TreeEdit::UpdateSetTarget { path, edit } => update_set_target(session, path, edit),
            TreeEdit::UpdateBlock { block_id, patch } => update_block(session, block_id, patch),
        }
    }
}

/// Build a workout exercise from a catalog entry with `sets` copies of `target`
pub fn exercise_from_catalog(entry: &CatalogExercise, sets: u32, target: SetValues) -> Exercise {
    Exercise {
        id: Uuid::new_v4().to_string(),
        exercise_ref: entry.id.clone(),
        name: entry.name.clone(),
        visible_metrics: entry.default_metrics.clone(),
        sets: (0..sets).map(|_| WorkoutSet::new(target.clone())).collect(),
    }
}

fn ensure_structural(session: &Session, what: &str) -> Result<()> {
    if session.is_plan_derived() {
        return Err(Error::StructuralEditNotAllowed(format!(
            "cannot {} on plan-derived session {}",
            what,
            session.id()
        )));
    }
    Ok(())
}

fn block_mut<'a>(session: &'a mut Session, block_id: &str) -> Result<&'a mut Block> {
    session
        .blocks
        .iter_mut()
        .find(|b| b.id == block_id)
        .ok_or_else(|| Error::NotFound(format!("block {}", block_id)))
}

fn exercise_mut<'a>(
    session: &'a mut Session,
    block_id: &str,
    exercise_id: &str,
) -> Result<&'a mut Exercise> {
    block_mut(session, block_id)?
        .exercises
        .iter_mut()
        .find(|e| e.id == exercise_id)
        .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise_id)))
}

fn set_mut<'a>(session: &'a mut Session, path: &SetPath) -> Result<&'a mut WorkoutSet> {
    exercise_mut(session, &path.block_id, &path.exercise_id)?
        .sets
        .iter_mut()
        .find(|s| s.id == path.set_id)
        .ok_or_else(|| Error::NotFound(format!("set {}", path.set_id)))
}

/// Look up a set without cloning the session
pub fn find_set<'a>(session: &'a Session, path: &SetPath) -> Option<&'a WorkoutSet> {
    session
        .block(&path.block_id)?
        .exercises
        .iter()
        .find(|e| e.id == path.exercise_id)?
        .sets
        .iter()
        .find(|s| s.id == path.set_id)
}

pub fn add_block(session: &Session, block: Block) -> Result<Session> {
    ensure_structural(session, "add a block")?;
    let mut next = session.clone();
    next.blocks.push(block);
    next.completed = next.all_blocks_completed();
    Ok(next)
}

pub fn remove_block(session: &Session, block_id: &str) -> Result<Session> {
    ensure_structural(session, "remove a block")?;
    let mut next = session.clone();
    let idx = next
        .block_index(block_id)
        .ok_or_else(|| Error::NotFound(format!("block {}", block_id)))?;
    next.blocks.remove(idx);
    next.completed = next.all_blocks_completed();
    Ok(next)
}

pub fn add_exercise(session: &Session, block_id: &str, exercise: Exercise) -> Result<Session> {
    ensure_structural(session, "add an exercise")?;
    let mut next = session.clone();
    block_mut(&mut next, block_id)?.exercises.push(exercise);
    Ok(next)
}

pub fn remove_exercise(session: &Session, block_id: &str, exercise_id: &str) -> Result<Session> {
    ensure_structural(session, "remove an exercise")?;
    let mut next = session.clone();
    let block = block_mut(&mut next, block_id)?;
    let idx = block
        .exercises
        .iter()
        .position(|e| e.id == exercise_id)
        .ok_or_else(|| Error::NotFound(format!("exercise {}", exercise_id)))?;
    block.exercises.remove(idx);
    Ok(next)
}

/// Move the exercise at `from` so it ends up at index `to`
pub fn reorder_exercise(session: &Session, block_id: &str, from: usize, to: usize) -> Result<Session> {
    ensure_structural(session, "reorder exercises")?;
    let mut next = session.clone();
    let block = block_mut(&mut next, block_id)?;
    let len = block.exercises.len();
    if from >= len || to >= len {
        return Err(Error::InvalidEdit(format!(
            "exercise move {} -> {} out of range for {} exercises",
            from, to, len
        )));
    }
    let exercise = block.exercises.remove(from);
    block.exercises.insert(to, exercise);
    Ok(next)
}

pub fn add_set(
    session: &Session,
    block_id: &str,
    exercise_id: &str,
    set: WorkoutSet,
) -> Result<Session> {
    ensure_structural(session, "add a set")?;
    let mut next = session.clone();
    exercise_mut(&mut next, block_id, exercise_id)?.sets.push(set);
    Ok(next)
}

pub fn remove_set(session: &Session, path: &SetPath) -> Result<Session> {
    ensure_structural(session, "remove a set")?;
    let mut next = session.clone();
    let exercise = exercise_mut(&mut next, &path.block_id, &path.exercise_id)?;
    let idx = exercise
        .sets
        .iter()
        .position(|s| s.id == path.set_id)
        .ok_or_else(|| Error::NotFound(format!("set {}", path.set_id)))?;
    exercise.sets.remove(idx);
    Ok(next)
}

/// Change a prescribed value; plan prescriptions are fixed once scheduled
pub fn update_set_target(session: &Session, path: &SetPath, edit: &SetEdit) -> Result<Session> {
    ensure_structural(session, "change a set target")?;
    let mut next = session.clone();
    edit.apply_to(&mut set_mut(&mut next, path)?.target);
    Ok(next)
}

/// Record an athlete-logged value; allowed on every session
pub fn update_set_actual(session: &Session, path: &SetPath, edit: &SetEdit) -> Result<Session> {
    let mut next = session.clone();
    edit.apply_to(&mut set_mut(&mut next, path)?.actual);
    Ok(next)
}

pub fn set_set_completed(session: &Session, path: &SetPath, completed: bool) -> Result<Session> {
    let mut next = session.clone();
    set_mut(&mut next, path)?.is_completed = completed;
    Ok(next)
}

pub fn update_block(session: &Session, block_id: &str, patch: &BlockPatch) -> Result<Session> {
    ensure_structural(session, "change block settings")?;
    let mut next = session.clone();
    let block = block_mut(&mut next, block_id)?;

    if let Some(name) = &patch.name {
        block.name = name.clone();
    }
    if let Some(mode) = patch.mode {
        block.mode = mode;
    }
    if let Some(rounds) = patch.rounds {
        block.rounds = rounds;
    }
    if let Some(rest) = patch.rest_between_rounds {
        block.rest_between_rounds = rest;
    }

    if block.mode != BlockMode::Circuit {
        let sets_circuit_field = matches!(patch.rounds, Some(Some(_)))
            || matches!(patch.rest_between_rounds, Some(Some(_)));
        if sets_circuit_field {
            return Err(Error::InvalidEdit(format!(
                "rounds only apply to circuit blocks, block {} is {:?}",
                block_id, block.mode
            )));
        }
        block.rounds = None;
        block.rest_between_rounds = None;
    }
    Ok(next)
}

/// Mark a block complete or not and recompute the session flag from the result
pub fn set_block_completed(session: &Session, block_id: &str, completed: bool) -> Result<Session> {
    let mut next = session.clone();
    block_mut(&mut next, block_id)?.completed = completed;
    next.completed = next.all_blocks_completed();
    Ok(next)
}
