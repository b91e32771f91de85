//! Block auto-progression policy.
//!
//! Decides which block, if any, starts automatically after a block completes.
//! Kept apart from the completion transition so the selection rule can be
//! checked without timers or stores.

use crate::Session;

/// The block to activate after `completed_block_id` finishes
///
/// Only the immediate successor by order is considered, and only if it has
/// not been completed already. Returns `None` for the last block or an
/// unknown id.
pub fn next_block_to_activate<'a>(session: &'a Session, completed_block_id: &str) -> Option<&'a str> {
    let idx = session.block_index(completed_block_id)?;
    let next = session.blocks.get(idx + 1)?;
    if next.completed {
        tracing::debug!("Next block {} already completed, not auto-activating", next.id);
        return None;
    }
    Some(next.id.as_str())
}
