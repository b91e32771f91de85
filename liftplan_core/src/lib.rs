#![forbid(unsafe_code)]

//! Core domain model and business logic for the Liftplan workout engine.
//!
//! This crate provides:
//! - Domain types (sessions, blocks, exercises, sets, schedule records)
//! - Pure workout tree edits
//! - Block clock and rest timer
//! - Session orchestration with a persistence command outbox
//! - Persistence (schedule file, WAL, CSV archive, goal ledger)
//! - History and personal best lookup

pub mod types;
pub mod error;
pub mod catalog;
pub mod config;
pub mod logging;
pub mod tree;
pub mod block_timer;
pub mod rest_timer;
pub mod progression;
mod locked_file;
pub mod schedule;
pub mod plans;
pub mod wal;
pub mod csv_rollup;
pub mod history;
pub mod goals;
pub mod reconciler;
pub mod orchestrator;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use catalog::{build_default_catalog, get_default_catalog};
pub use config::Config;
pub use history::{FileHistory, HistoryStore, MemoryHistory};
pub use goals::{GoalLedger, GoalTracker, MemoryGoals};
pub use plans::{AssignedPlanStore, FilePlanStore, MemoryPlanStore};
pub use schedule::{JsonScheduleStore, MemoryScheduleStore, ScheduleStore};
pub use rest_timer::{AlertSink, LogAlertSink, RestTick};
pub use orchestrator::{
    Activation, Backends, BlockState, Consent, FlushReport, SessionOrchestrator,
};
