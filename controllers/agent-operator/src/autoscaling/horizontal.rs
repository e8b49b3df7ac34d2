//! Horizontal bounding
//!
//! Order of evaluation:
//! 1. stabilization over the recorded actions
//! 2. direction of change, `Disabled` short-circuit
//! 3. rules whose period elapsed since the last action, each capped by the recommendation
//! 4. `Max`/`Min` selection, first listed rule on ties
//! 5. clamp to `[minReplicas, maxReplicas]`

use chrono::{DateTime, Utc};
use crds::{ApplyPolicy, Constraints, HorizontalAction, ScalingPolicy, ScalingRule, ScalingRuleType, ScalingStrategy};
use tracing::debug;

pub const REASON_DISABLED: &str = "scaling disabled in this direction";
pub const REASON_PERIOD: &str = "scaling rules period not elapsed";
pub const REASON_STABILIZATION: &str = "limited by stabilization window";
pub const REASON_MAX: &str = "capped by maxReplicas";
pub const REASON_MIN: &str = "raised to minReplicas";

/// Bounded horizontal target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizontalDecision {
    /// Replicas to apply
    pub target: i32,
    /// Replicas allowed by the rules, before min/max clamping
    pub recommended: i32,
    /// Why `target` differs from the raw recommendation
    pub limited_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Bound a raw replica recommendation
///
/// `history` holds the recorded actions, oldest first.
#[must_use]
pub fn bound(
    raw: i32,
    current: i32,
    policy: &ApplyPolicy,
    constraints: Option<&Constraints>,
    history: &[HorizontalAction],
    now: DateTime<Utc>,
) -> HorizontalDecision {
    let (stabilized, mut reason) = stabilize(raw, current, policy, history, now);

    let recommended = if stabilized == current {
        current
    } else {
        let direction = if stabilized > current { Direction::Up } else { Direction::Down };
        let directional = match direction {
            Direction::Up => policy.scale_up.as_ref(),
            Direction::Down => policy.scale_down.as_ref(),
        };
        match directional {
            None => stabilized,
            Some(p) if p.strategy() == ScalingStrategy::Disabled => {
                reason = Some(REASON_DISABLED.to_string());
                current
            }
            Some(p) => match apply_rules(p, stabilized, current, direction, history, now) {
                Some((value, rule)) => {
                    if value != stabilized {
                        reason = Some(format!("limited by {} rule", rule.r#type));
                    }
                    value
                }
                None => {
                    reason = Some(REASON_PERIOD.to_string());
                    current
                }
            },
        }
    };

    let (min, max) = constraints.map_or((1, i32::MAX), |c| (c.min_replicas(), c.max_replicas));
    let target = if recommended > max {
        reason = Some(REASON_MAX.to_string());
        max
    } else if recommended < min {
        reason = Some(REASON_MIN.to_string());
        min
    } else {
        recommended
    };

    debug!(raw, current, recommended, target, reason = ?reason, "bounded horizontal recommendation");
    HorizontalDecision {
        target,
        recommended,
        limited_reason: reason,
    }
}

/// Dampen the raw value with the recommendations recorded inside each window
///
/// Scaling up goes no higher than the lowest recommendation of the up
/// window; scaling down goes no lower than the highest of the down window.
fn stabilize(
    raw: i32,
    current: i32,
    policy: &ApplyPolicy,
    history: &[HorizontalAction],
    now: DateTime<Utc>,
) -> (i32, Option<String>) {
    let window = |p: Option<&ScalingPolicy>| i64::from(p.map_or(0, |p| p.stabilization_window_seconds));
    let up_window = window(policy.scale_up.as_ref());
    let down_window = window(policy.scale_down.as_ref());

    let mut up_floor = raw;
    let mut down_ceiling = raw;
    for action in history {
        let age = (now - action.time).num_seconds();
        let value = action.recommended_replicas.unwrap_or(action.to_replicas);
        if age < up_window {
            up_floor = up_floor.min(value);
        }
        if age < down_window {
            down_ceiling = down_ceiling.max(value);
        }
    }

    let stabilized = if current < up_floor {
        up_floor
    } else if current > down_ceiling {
        down_ceiling
    } else {
        current
    };
    let reason = (stabilized != raw).then(|| REASON_STABILIZATION.to_string());
    (stabilized, reason)
}

/// Pick the eligible rule per strategy; `None` when no rule is eligible
fn apply_rules<'a>(
    policy: &'a ScalingPolicy,
    recommendation: i32,
    current: i32,
    direction: Direction,
    history: &[HorizontalAction],
    now: DateTime<Utc>,
) -> Option<(i32, &'a ScalingRule)> {
    let last_action = history.iter().map(|a| a.time).max();
    let strategy = policy.strategy();

    let mut selected: Option<(i32, &ScalingRule)> = None;
    for rule in &policy.rules {
        let elapsed = last_action.is_none_or(|t| (now - t).num_seconds() >= i64::from(rule.period_seconds));
        if !elapsed {
            continue;
        }
        let limit = rule_limit(rule, current, direction);
        let candidate = match direction {
            Direction::Up => limit.min(recommendation),
            Direction::Down => limit.max(recommendation),
        };
        let change = (candidate - current).abs();
        let better = match selected {
            None => true,
            Some((best, _)) => {
                let best_change = (best - current).abs();
                match strategy {
                    ScalingStrategy::Min => change < best_change,
                    ScalingStrategy::Max | ScalingStrategy::Disabled => change > best_change,
                }
            }
        };
        if better {
            selected = Some((candidate, rule));
        }
    }
    selected
}

/// Furthest replica count a rule allows from `current`
fn rule_limit(rule: &ScalingRule, current: i32, direction: Direction) -> i32 {
    let current = i64::from(current);
    let value = i64::from(rule.value);
    let limit = match (rule.r#type, direction) {
        (ScalingRuleType::Pods, Direction::Up) => current + value,
        (ScalingRuleType::Pods, Direction::Down) => current - value,
        // ceil on the way up, floor on the way down
        (ScalingRuleType::Percent, Direction::Up) => (current * (100 + value) + 99).div_euclid(100),
        (ScalingRuleType::Percent, Direction::Down) => (current * (100 - value)).div_euclid(100),
    };
    i32::try_from(limit.max(0)).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::t0;
    use chrono::Duration;

    fn rule(r#type: ScalingRuleType, value: i32, period: i32) -> ScalingRule {
        ScalingRule {
            r#type,
            value,
            period_seconds: period,
        }
    }

    fn policy(strategy: ScalingStrategy, rules: Vec<ScalingRule>) -> ScalingPolicy {
        ScalingPolicy {
            strategy: Some(strategy),
            rules,
            stabilization_window_seconds: 0,
        }
    }

    fn up(p: ScalingPolicy) -> ApplyPolicy {
        ApplyPolicy {
            scale_up: Some(p),
            ..Default::default()
        }
    }

    fn down(p: ScalingPolicy) -> ApplyPolicy {
        ApplyPolicy {
            scale_down: Some(p),
            ..Default::default()
        }
    }

    fn bounds(min: i32, max: i32) -> Constraints {
        Constraints {
            min_replicas: Some(min),
            max_replicas: max,
            containers: vec![],
        }
    }

    fn action(seconds_ago: i64, from: i32, to: i32, recommended: Option<i32>) -> HorizontalAction {
        HorizontalAction {
            time: t0() - Duration::seconds(seconds_ago),
            from_replicas: from,
            to_replicas: to,
            recommended_replicas: recommended,
            limited_reason: None,
        }
    }

    #[test]
    fn test_percent_rule_within_bounds() {
        let p = up(policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Percent, 50, 60)]));
        let decision = bound(8, 5, &p, Some(&bounds(2, 10)), &[], t0());
        assert_eq!(
            decision,
            HorizontalDecision {
                target: 8,
                recommended: 8,
                limited_reason: None
            }
        );
    }

    #[test]
    fn test_percent_rule_capped_by_max_replicas() {
        let p = up(policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Percent, 50, 60)]));
        let decision = bound(8, 5, &p, Some(&bounds(2, 6)), &[], t0());
        assert_eq!(decision.target, 6);
        assert_eq!(decision.recommended, 8);
        assert_eq!(decision.limited_reason.as_deref(), Some(REASON_MAX));
    }

    #[test]
    fn test_rule_caps_recommendation() {
        let p = up(policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Pods, 2, 60)]));
        let decision = bound(20, 5, &p, None, &[], t0());
        assert_eq!(decision.target, 7);
        assert_eq!(decision.limited_reason.as_deref(), Some("limited by Pods rule"));
    }

    #[test]
    fn test_percent_rounding() {
        let p = down(policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Percent, 50, 60)]));
        // floor(5 * 0.5) = 2
        assert_eq!(bound(1, 5, &p, None, &[], t0()).target, 2);
        let p = up(policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Percent, 10, 60)]));
        // ceil(3 * 1.1) = 4
        assert_eq!(bound(10, 3, &p, None, &[], t0()).target, 4);
    }

    #[test]
    fn test_disabled_direction_keeps_current() {
        let p = ApplyPolicy {
            scale_up: Some(policy(ScalingStrategy::Disabled, vec![])),
            scale_down: Some(policy(ScalingStrategy::Disabled, vec![])),
            ..Default::default()
        };
        for raw in [1, 4, 5, 6, 50] {
            let decision = bound(raw, 5, &p, Some(&bounds(1, 100)), &[], t0());
            assert_eq!(decision.target, 5);
        }
        assert_eq!(
            bound(9, 5, &p, None, &[], t0()).limited_reason.as_deref(),
            Some(REASON_DISABLED)
        );
    }

    #[test]
    fn test_max_and_min_strategies() {
        let rules = vec![
            rule(ScalingRuleType::Pods, 1, 60),
            rule(ScalingRuleType::Percent, 100, 60),
            rule(ScalingRuleType::Pods, 3, 60),
        ];
        let max = up(policy(ScalingStrategy::Max, rules.clone()));
        let min = up(policy(ScalingStrategy::Min, rules));
        // Candidates from 4: 5, 8, 7
        assert_eq!(bound(100, 4, &max, None, &[], t0()).target, 8);
        assert_eq!(bound(100, 4, &min, None, &[], t0()).target, 5);
    }

    #[test]
    fn test_max_strategy_dominates_every_eligible_rule() {
        let rules = vec![
            rule(ScalingRuleType::Pods, 2, 60),
            rule(ScalingRuleType::Percent, 30, 60),
            rule(ScalingRuleType::Pods, 5, 60),
            rule(ScalingRuleType::Percent, 80, 60),
        ];
        for current in 1..30 {
            let max = bound(1000, current, &up(policy(ScalingStrategy::Max, rules.clone())), None, &[], t0());
            let min = bound(1000, current, &up(policy(ScalingStrategy::Min, rules.clone())), None, &[], t0());
            for r in &rules {
                let change = rule_limit(r, current, Direction::Up) - current;
                assert!(max.target - current >= change);
                assert!(min.target - current <= change);
            }
        }
    }

    #[test]
    fn test_tie_prefers_first_rule() {
        // Both allow +2 from 4
        let p = up(policy(
            ScalingStrategy::Max,
            vec![rule(ScalingRuleType::Percent, 50, 60), rule(ScalingRuleType::Pods, 2, 60)],
        ));
        let decision = bound(10, 4, &p, None, &[], t0());
        assert_eq!(decision.target, 6);
        assert_eq!(decision.limited_reason.as_deref(), Some("limited by Percent rule"));
    }

    #[test]
    fn test_period_not_elapsed() {
        let p = up(policy(
            ScalingStrategy::Max,
            vec![rule(ScalingRuleType::Pods, 4, 120), rule(ScalingRuleType::Pods, 1, 30)],
        ));
        let history = [action(60, 3, 5, Some(5))];
        // Only the 30s rule is eligible
        assert_eq!(bound(10, 5, &p, None, &history, t0()).target, 6);

        let history = [action(10, 3, 5, Some(5))];
        let decision = bound(10, 5, &p, None, &history, t0());
        assert_eq!(decision.target, 5);
        assert_eq!(decision.limited_reason.as_deref(), Some(REASON_PERIOD));
    }

    #[test]
    fn test_stabilization_window_holds_scale_down() {
        let mut scale_down = policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Pods, 10, 1)]);
        scale_down.stabilization_window_seconds = 300;
        let p = down(scale_down);

        let history = [action(120, 4, 8, Some(8))];
        let decision = bound(3, 8, &p, None, &history, t0());
        assert_eq!(decision.target, 8);
        assert_eq!(decision.limited_reason.as_deref(), Some(REASON_STABILIZATION));

        // Outside the window the recommendation goes through
        let history = [action(400, 4, 8, Some(8))];
        assert_eq!(bound(3, 8, &p, None, &history, t0()).target, 3);
    }

    #[test]
    fn test_stabilization_never_reexpands_within_window() {
        let mut scale_up = policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Pods, 10, 1)]);
        scale_up.stabilization_window_seconds = 300;
        let p = up(scale_up);
        // A dampened step to 6 was recorded a minute ago
        let history = [action(60, 5, 6, Some(6))];
        let decision = bound(12, 5, &p, None, &history, t0());
        assert_eq!(decision.target, 6);
    }

    #[test]
    fn test_stabilization_takes_one_rule_step_per_window() {
        let mut scale_up = policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Pods, 2, 60)]);
        scale_up.stabilization_window_seconds = 300;
        let p = up(scale_up);

        assert_eq!(bound(20, 5, &p, None, &[], t0()).target, 7);

        // The rule period has passed but the recorded step still caps the window
        let history = [action(120, 5, 7, Some(7))];
        let decision = bound(20, 7, &p, None, &history, t0());
        assert_eq!(decision.target, 7);
        assert_eq!(decision.limited_reason.as_deref(), Some(REASON_STABILIZATION));

        let history = [action(360, 5, 7, Some(7))];
        assert_eq!(bound(20, 7, &p, None, &history, t0()).target, 9);
    }

    #[test]
    fn test_target_always_within_bounds() {
        let policies = [
            ApplyPolicy::default(),
            up(policy(ScalingStrategy::Max, vec![rule(ScalingRuleType::Percent, 200, 60)])),
            down(policy(ScalingStrategy::Min, vec![rule(ScalingRuleType::Pods, 1, 60)])),
        ];
        for p in &policies {
            for current in 0..15 {
                for raw in 0..15 {
                    let decision = bound(raw, current, p, Some(&bounds(2, 9)), &[], t0());
                    assert!((2..=9).contains(&decision.target), "raw={raw} current={current}");
                }
            }
        }
    }

    #[test]
    fn test_no_policy_is_unlimited() {
        let decision = bound(40, 2, &ApplyPolicy::default(), None, &[], t0());
        assert_eq!(decision.target, 40);
        assert_eq!(decision.limited_reason, None);
    }
}
