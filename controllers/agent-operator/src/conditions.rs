//! Status condition tracker
//!
//! Upsert-by-type operations on an owned condition list. A list never holds
//! two conditions of the same type, and `lastTransitionTime` only moves when
//! the status changes.

use chrono::{DateTime, Utc};
use crds::{Condition, ConditionStatus, ConditionType};

/// Insert or update the condition of `condition_type`
///
/// A condition that is not in the list yet is only added when its status is
/// `True` or `force` is set; this keeps never-raised conditions out of the
/// status. Returns whether the list changed.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
    force: bool,
) -> bool {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let mut changed = false;
        if existing.status != status {
            existing.status = status;
            existing.last_transition_time = Some(now);
            changed = true;
        }
        if existing.reason != reason {
            existing.reason = reason.to_string();
            changed = true;
        }
        if existing.message != message {
            existing.message = message.to_string();
            changed = true;
        }
        return changed;
    }

    if status != ConditionStatus::True && !force {
        return false;
    }
    conditions.push(Condition {
        r#type: condition_type,
        status,
        last_transition_time: Some(now),
        reason: reason.to_string(),
        message: message.to_string(),
    });
    true
}

/// Shorthand for a forced `True`/`False` condition
pub fn set_bool(
    conditions: &mut Vec<Condition>,
    condition_type: ConditionType,
    value: bool,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> bool {
    set_condition(conditions, condition_type, value.into(), reason, message, now, true)
}

/// Remove the condition of `condition_type`; returns whether it was present
pub fn remove_condition(conditions: &mut Vec<Condition>, condition_type: ConditionType) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.r#type != condition_type);
    conditions.len() != before
}

/// Find the condition of `condition_type`
#[must_use]
pub fn find_condition(conditions: &[Condition], condition_type: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Whether the condition of `condition_type` is `True`
#[must_use]
pub fn is_true(conditions: &[Condition], condition_type: ConditionType) -> bool {
    find_condition(conditions, condition_type).is_some_and(|c| c.status == ConditionStatus::True)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_transition_time_moves_only_on_status_change() {
        let mut conditions = Vec::new();
        assert!(set_bool(&mut conditions, ConditionType::Active, true, "", "", t0()));

        let later = t0() + Duration::minutes(5);
        assert!(set_bool(&mut conditions, ConditionType::Active, true, "Reason", "msg", later));
        assert_eq!(conditions[0].last_transition_time, Some(t0()));
        assert_eq!(conditions[0].reason, "Reason");

        assert!(set_bool(&mut conditions, ConditionType::Active, false, "Reason", "msg", later));
        assert_eq!(conditions[0].last_transition_time, Some(later));
    }

    #[test]
    fn test_no_duplicate_types() {
        let mut conditions = Vec::new();
        for i in 0..5 {
            set_bool(&mut conditions, ConditionType::Error, i % 2 == 0, "", "", t0());
            set_bool(&mut conditions, ConditionType::Active, i % 2 == 1, "", "", t0());
        }
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn test_unforced_false_is_not_added() {
        let mut conditions = Vec::new();
        let added = set_condition(
            &mut conditions,
            ConditionType::HorizontalScalingLimited,
            ConditionStatus::False,
            "",
            "",
            t0(),
            false,
        );
        assert!(!added);
        assert!(conditions.is_empty());

        set_bool(&mut conditions, ConditionType::HorizontalScalingLimited, true, "ScalingLimited", "", t0());
        set_condition(
            &mut conditions,
            ConditionType::HorizontalScalingLimited,
            ConditionStatus::False,
            "",
            "",
            t0(),
            false,
        );
        assert!(!is_true(&conditions, ConditionType::HorizontalScalingLimited));
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_unchanged_upsert_reports_no_change() {
        let mut conditions = Vec::new();
        set_bool(&mut conditions, ConditionType::ClusterAgentReconcile, true, "", "", t0());
        assert!(!set_bool(&mut conditions, ConditionType::ClusterAgentReconcile, true, "", "", t0()));
    }

    #[test]
    fn test_remove() {
        let mut conditions = Vec::new();
        set_bool(&mut conditions, ConditionType::ClusterAgentReconcile, true, "", "", t0());
        assert!(remove_condition(&mut conditions, ConditionType::ClusterAgentReconcile));
        assert!(!remove_condition(&mut conditions, ConditionType::ClusterAgentReconcile));
        assert!(find_condition(&conditions, ConditionType::ClusterAgentReconcile).is_none());
    }
}
