//! Recommendation and action history
//!
//! Targets only move forward in time: a recommendation generated before the
//! recorded one is rejected. Horizontal actions are kept oldest first and
//! capped at `MAX_HORIZONTAL_ACTIONS`.

use chrono::{DateTime, Utc};
use crds::{
    HorizontalAction, HorizontalStatus, HorizontalTargetStatus, MAX_HORIZONTAL_ACTIONS, VerticalAction,
    VerticalStatus, VerticalTargetStatus,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The incoming recommendation is older than the recorded one
    #[error("recommendation generated at {incoming} is older than the recorded one ({recorded})")]
    Stale {
        recorded: DateTime<Utc>,
        incoming: DateTime<Utc>,
    },
}

fn check_fresh(recorded: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> Result<(), HistoryError> {
    match (recorded, incoming) {
        (Some(recorded), Some(incoming)) if incoming < recorded => Err(HistoryError::Stale { recorded, incoming }),
        _ => Ok(()),
    }
}

/// Record a horizontal target; returns whether the status changed
///
/// # Errors
///
/// Returns `HistoryError::Stale` when `target` is older than the recorded one.
pub fn record_horizontal_target(
    status: &mut HorizontalStatus,
    target: HorizontalTargetStatus,
) -> Result<bool, HistoryError> {
    check_fresh(status.target.as_ref().and_then(|t| t.generated_at), target.generated_at)?;
    if status.target.as_ref() == Some(&target) {
        return Ok(false);
    }
    status.target = Some(target);
    Ok(true)
}

/// Append an action, evicting the oldest beyond the cap
pub fn append_horizontal_action(status: &mut HorizontalStatus, action: HorizontalAction) {
    status.last_actions.push(action);
    if status.last_actions.len() > MAX_HORIZONTAL_ACTIONS {
        let excess = status.last_actions.len() - MAX_HORIZONTAL_ACTIONS;
        status.last_actions.drain(..excess);
    }
}

/// Record a vertical target; returns whether the status changed
///
/// # Errors
///
/// Returns `HistoryError::Stale` when `target` is older than the recorded one.
pub fn record_vertical_target(status: &mut VerticalStatus, target: VerticalTargetStatus) -> Result<bool, HistoryError> {
    check_fresh(status.target.as_ref().and_then(|t| t.generated_at), target.generated_at)?;
    if status.target.as_ref() == Some(&target) {
        return Ok(false);
    }
    status.target = Some(target);
    Ok(true)
}

/// Replace the last vertical action
pub fn record_vertical_action(status: &mut VerticalStatus, action: VerticalAction) {
    status.last_action = Some(action);
}
