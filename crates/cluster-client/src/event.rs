//! Kubernetes events emitted by the operator

use std::fmt;

/// Severity of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Expected transition
    Normal,
    /// Failure or anomaly
    Warning,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

/// An event attached to one of the operator's custom resources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEvent {
    /// Severity
    pub kind: EventKind,
    /// Short machine readable reason (e.g. "CreateDeployment")
    pub reason: String,
    /// Human readable note
    pub note: String,
    /// Action taken ("Create", "Update", "Delete", "Scale", "Rollout")
    pub action: String,
}

impl ClusterEvent {
    /// A `Normal` event
    #[must_use]
    pub fn normal(action: &str, reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.into(),
            note: note.into(),
            action: action.to_string(),
        }
    }

    /// A `Warning` event
    #[must_use]
    pub fn warning(action: &str, reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.into(),
            note: note.into(),
            action: action.to_string(),
        }
    }
}
