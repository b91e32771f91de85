//! Elapsed-time tracking for active blocks.
//!
//! One shared 1-second tick source drives every tracked block. Timers are
//! keyed by block id; start and stop are idempotent and decided purely by
//! presence in the map. The tick source runs exactly while at least one
//! timer is tracked.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Live timer for one active block
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTimer {
    pub started_at: DateTime<Utc>,
    pub elapsed: u32,
}

/// Scheduler owning all block timers
#[derive(Debug, Default)]
pub struct BlockClock {
    timers: BTreeMap<String, BlockTimer>,
    /// Elapsed of blocks completed but not yet cleared
    recorded: HashMap<String, u32>,
    running: bool,
}

impl BlockClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a block from zero
    ///
    /// Returns false if the block was already tracked (its timer keeps running).
    pub fn activate(&mut self, block_id: &str, now: DateTime<Utc>) -> bool {
        if self.timers.contains_key(block_id) {
            return false;
        }
        self.recorded.remove(block_id);
        self.timers.insert(
            block_id.to_string(),
            BlockTimer {
                started_at: now,
                elapsed: 0,
            },
        );
        if !self.running {
            self.running = true;
            tracing::debug!("Block tick source started");
        }
        true
    }

    /// Stop tracking a block, keeping its elapsed time as a recorded value
    pub fn deactivate(&mut self, block_id: &str) -> Option<u32> {
        let timer = self.timers.remove(block_id)?;
        self.recorded.insert(block_id.to_string(), timer.elapsed);
        if self.timers.is_empty() && self.running {
            self.running = false;
            tracing::debug!("Block tick source stopped");
        }
        Some(timer.elapsed)
    }

    /// Advance every tracked timer by one second
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        for timer in self.timers.values_mut() {
            timer.elapsed += 1;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_tracking(&self, block_id: &str) -> bool {
        self.timers.contains_key(block_id)
    }

    pub fn timer(&self, block_id: &str) -> Option<&BlockTimer> {
        self.timers.get(block_id)
    }

    /// Live elapsed if tracked, else the recorded value
    pub fn elapsed(&self, block_id: &str) -> Option<u32> {
        self.timers
            .get(block_id)
            .map(|t| t.elapsed)
            .or_else(|| self.recorded.get(block_id).copied())
    }

    /// Sum of live and recorded elapsed over the given blocks
    pub fn total_elapsed<'a>(&self, block_ids: impl IntoIterator<Item = &'a str>) -> u32 {
        block_ids
            .into_iter()
            .filter_map(|id| self.elapsed(id))
            .sum()
    }

    /// Forget a recorded value
    pub fn clear(&mut self, block_id: &str) {
        self.recorded.remove(block_id);
    }
}
