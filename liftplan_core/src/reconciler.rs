//! Reconciles in-memory sessions with schedule storage.
//!
//! Custom sessions own a schedule record addressed by id. Plan-derived
//! sessions are written by upsert on `(athlete, date)` so repeated writes for
//! the same day land on one record. On read, a plan's static template is
//! overridden by its schedule record when one exists.

use crate::plans::AssignedPlanStore;
use crate::schedule::ScheduleStore;
use crate::{
    Block, Result, ScheduleFields, ScheduleKey, ScheduleRecord, Session, SessionOrigin,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use uuid::Uuid;

/// A schedule write derived from a session
#[derive(Clone, Debug, PartialEq)]
pub enum ScheduleWrite {
    Update {
        record_id: Uuid,
        fields: ScheduleFields,
    },
    Upsert {
        key: ScheduleKey,
        fields: ScheduleFields,
    },
}

impl ScheduleWrite {
    pub fn fields(&self) -> &ScheduleFields {
        match self {
            ScheduleWrite::Update { fields, .. } | ScheduleWrite::Upsert { fields, .. } => fields,
        }
    }
}

/// Choose the write strategy for a session by its origin
pub fn build_write(session: &Session, athlete_id: &str) -> ScheduleWrite {
    match &session.origin {
        SessionOrigin::Custom { record_id } => ScheduleWrite::Update {
            record_id: *record_id,
            fields: ScheduleFields {
                plan_id: None,
                plan_name: None,
                session_title: Some(session.title.clone()),
                workout_data: Some(session.blocks.clone()),
                completed: session.completed,
                duration_seconds: session.duration_seconds,
                completed_at: session.completed_at,
            },
        },
        SessionOrigin::PlanDerived {
            plan_id, plan_name, ..
        } => ScheduleWrite::Upsert {
            key: ScheduleKey {
                athlete_id: athlete_id.to_string(),
                date: session.date,
            },
            fields: ScheduleFields {
                plan_id: Some(plan_id.clone()),
                plan_name: Some(plan_name.clone()),
                session_title: Some(session.title.clone()),
                workout_data: Some(session.blocks.clone()),
                completed: session.completed,
                duration_seconds: session.duration_seconds,
                completed_at: session.completed_at,
            },
        },
    }
}

/// Execute a write; returns the id of the record written
pub fn apply_write(store: &mut dyn ScheduleStore, write: &ScheduleWrite) -> Result<Uuid> {
    match write {
        ScheduleWrite::Update { record_id, fields } => {
            store.update(*record_id, fields.clone())?;
            tracing::debug!("Updated custom session record {}", record_id);
            Ok(*record_id)
        }
        ScheduleWrite::Upsert { key, fields } => {
            let id = store.upsert(key, fields.clone())?;
            tracing::debug!(
                "Upserted plan session record {} for {} on {}",
                id,
                key.athlete_id,
                key.date
            );
            Ok(id)
        }
    }
}

/// Persist a session in one call
pub fn persist(store: &mut dyn ScheduleStore, session: &Session, athlete_id: &str) -> Result<Uuid> {
    apply_write(store, &build_write(session, athlete_id))
}

/// Create an athlete-owned session on a date
pub fn create_custom_session(
    store: &mut dyn ScheduleStore,
    athlete_id: &str,
    date: NaiveDate,
    title: &str,
    blocks: Vec<Block>,
) -> Result<Session> {
    let key = ScheduleKey {
        athlete_id: athlete_id.to_string(),
        date,
    };
    let fields = ScheduleFields {
        session_title: Some(title.to_string()),
        workout_data: Some(blocks.clone()),
        ..Default::default()
    };
    let record_id = store.insert(&key, fields)?;
    tracing::info!("Created custom session {} on {}", record_id, date);

    Ok(Session {
        origin: SessionOrigin::Custom { record_id },
        date,
        title: title.to_string(),
        blocks,
        completed: false,
        duration_seconds: 0,
        completed_at: None,
    })
}

/// Remove a session from the schedule
///
/// Custom sessions are hard-deleted. Plan-derived sessions are never deleted;
/// their completion record is cleared so the plan template applies again.
pub fn remove_session(store: &mut dyn ScheduleStore, athlete_id: &str, session: &Session) -> Result<()> {
    match &session.origin {
        SessionOrigin::Custom { record_id } => {
            store.delete(*record_id)?;
            tracing::info!("Deleted custom session {}", record_id);
        }
        SessionOrigin::PlanDerived {
            plan_id, plan_name, ..
        } => {
            let record = store
                .read_range(athlete_id, session.date, session.date)?
                .into_iter()
                .find(|r| r.fields.plan_id.as_deref() == Some(plan_id.as_str()));
            match record {
                Some(record) => {
                    store.update(
                        record.id,
                        ScheduleFields {
                            plan_id: Some(plan_id.clone()),
                            plan_name: Some(plan_name.clone()),
                            session_title: record.fields.session_title.clone(),
                            ..Default::default()
                        },
                    )?;
                    tracing::info!("Cleared completion record for {}", session.id());
                }
                None => {
                    tracing::debug!("No completion record to clear for {}", session.id());
                }
            }
        }
    }
    Ok(())
}

fn custom_session(record: ScheduleRecord) -> Session {
    let title = record
        .fields
        .session_title
        .unwrap_or_else(|| "Workout".to_string());
    Session {
        origin: SessionOrigin::Custom {
            record_id: record.id,
        },
        date: record.date,
        title,
        blocks: record.fields.workout_data.unwrap_or_default(),
        completed: record.fields.completed,
        duration_seconds: record.fields.duration_seconds,
        completed_at: record.fields.completed_at,
    }
}

/// Sessions for an athlete between two dates (inclusive), ordered by date
///
/// Schedule records without a plan become custom sessions. Each assigned
/// plan's scheduled dates become plan-derived sessions from the template, with
/// the record for `(plan_id, date)` winning over the template when present.
pub fn load_range(
    schedule: &dyn ScheduleStore,
    plans: &dyn AssignedPlanStore,
    athlete_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Session>> {
    let records = schedule.read_range(athlete_id, from, to)?;
    let assigned = plans.read_assigned_plans(athlete_id)?;

    let mut sessions = Vec::new();
    let mut plan_records: HashMap<(String, NaiveDate), ScheduleRecord> = HashMap::new();

    for record in records {
        match record.fields.plan_id.clone() {
            Some(plan_id) => {
                plan_records.insert((plan_id, record.date), record);
            }
            None => sessions.push(custom_session(record)),
        }
    }

    for plan in &assigned {
        for (date, session_id) in plan.schedule.range(from..=to) {
            let Some(template) = plan.structure.find_session(session_id) else {
                tracing::warn!(
                    "Plan {} schedules unknown session {} on {}",
                    plan.plan_id,
                    session_id,
                    date
                );
                continue;
            };

            let mut session = Session {
                origin: SessionOrigin::PlanDerived {
                    plan_id: plan.plan_id.clone(),
                    plan_name: plan.plan_name.clone(),
                    session_id: session_id.clone(),
                },
                date: *date,
                title: template.title.clone(),
                blocks: template.blocks.clone(),
                completed: false,
                duration_seconds: 0,
                completed_at: None,
            };

            if let Some(record) = plan_records.remove(&(plan.plan_id.clone(), *date)) {
                if let Some(blocks) = record.fields.workout_data {
                    session.blocks = blocks;
                }
                session.completed = record.fields.completed;
                session.duration_seconds = record.fields.duration_seconds;
                session.completed_at = record.fields.completed_at;
            }

            sessions.push(session);
        }
    }

    for ((plan_id, date), _) in plan_records {
        tracing::debug!(
            "Schedule record for plan {} on {} has no current assignment",
            plan_id,
            date
        );
    }

    sessions.sort_by_key(|s| s.date);
    tracing::debug!(
        "Loaded {} sessions for {} between {} and {}",
        sessions.len(),
        athlete_id,
        from,
        to
    );
    Ok(sessions)
}
