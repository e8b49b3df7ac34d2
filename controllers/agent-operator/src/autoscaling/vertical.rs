//! Vertical bounding
//!
//! Requests are clamped per container into `[minAllowed, maxAllowed]` of the
//! matching constraint entry. An exact container name takes precedence over
//! the `"*"` entry. Containers that are disabled, or not covered by any entry
//! while entries exist, are left out of the resize.

use crds::quantity::{self, CPU, MEMORY};
use crds::{Constraints, ContainerConstraints, ContainerResources, ResourceList, WILDCARD_CONTAINER};

/// Bounded vertical target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerticalDecision {
    /// Containers to resize, with bounded requests
    pub containers: Vec<ContainerResources>,
    /// Containers left out of the resize
    pub excluded: Vec<String>,
    /// Sum of the bounded CPU requests
    pub pod_cpu_request: String,
    /// Sum of the bounded memory requests
    pub pod_memory_request: String,
}

/// Constraint entry governing a container
#[must_use]
pub fn constraint_for<'a>(constraints: &'a Constraints, container: &str) -> Option<&'a ContainerConstraints> {
    constraints
        .containers
        .iter()
        .find(|c| c.name == container)
        .or_else(|| constraints.containers.iter().find(|c| c.name == WILDCARD_CONTAINER))
}

/// Bound the recommended resources of every container
#[must_use]
pub fn bound_containers(recommended: &[ContainerResources], constraints: Option<&Constraints>) -> VerticalDecision {
    let mut decision = VerticalDecision::default();

    for container in recommended {
        let entry = match constraints {
            Some(c) if !c.containers.is_empty() => match constraint_for(c, &container.name) {
                Some(entry) if entry.is_enabled() => Some(entry),
                _ => {
                    decision.excluded.push(container.name.clone());
                    continue;
                }
            },
            _ => None,
        };

        let mut bounded = container.clone();
        if let Some(requests) = entry.and_then(|e| e.requests.as_ref()) {
            for (resource, value) in &mut bounded.requests {
                if let Some(clamped) = clamp(resource, value, &requests.min_allowed, &requests.max_allowed) {
                    *value = clamped;
                }
            }
        }
        raise_limits(&mut bounded);
        decision.containers.push(bounded);
    }

    let requests = decision.containers.iter().map(|c| &c.requests);
    decision.pod_cpu_request = quantity::format_cpu(quantity::sum(requests.clone(), CPU));
    decision.pod_memory_request = quantity::format_memory(quantity::sum(requests, MEMORY));
    decision
}

/// Clamped quantity, or `None` when the value is already within bounds or unparsable
fn clamp(resource: &str, value: &str, min: &ResourceList, max: &ResourceList) -> Option<String> {
    let v = quantity::parse(value).ok()?;
    let bound = |list: &ResourceList| {
        list.get(resource)
            .and_then(|q| quantity::parse(q).ok().map(|parsed| (parsed, q.clone())))
    };

    match (bound(min), bound(max)) {
        (_, Some((max_v, max_q))) if v > max_v => Some(max_q),
        (Some((min_v, min_q)), _) if v < min_v => Some(min_q),
        _ => None,
    }
}

/// A limit below its request is raised to the request
fn raise_limits(container: &mut ContainerResources) {
    for (resource, request) in &container.requests {
        let Some(limit) = container.limits.get_mut(resource) else {
            continue;
        };
        match (quantity::parse(request), quantity::parse(limit)) {
            (Ok(r), Ok(l)) if l < r => *limit = request.clone(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::ContainerResourceConstraints;

    fn resources(name: &str, requests: &[(&str, &str)], limits: &[(&str, &str)]) -> ContainerResources {
        let list = |pairs: &[(&str, &str)]| pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ContainerResources {
            name: name.to_string(),
            requests: list(requests),
            limits: list(limits),
        }
    }

    fn entry(name: &str, min: &[(&str, &str)], max: &[(&str, &str)]) -> ContainerConstraints {
        let list = |pairs: &[(&str, &str)]| pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ContainerConstraints {
            name: name.to_string(),
            enabled: None,
            requests: Some(ContainerResourceConstraints {
                min_allowed: list(min),
                max_allowed: list(max),
            }),
        }
    }

    fn constraints(containers: Vec<ContainerConstraints>) -> Constraints {
        Constraints {
            min_replicas: None,
            max_replicas: 10,
            containers,
        }
    }

    #[test]
    fn test_exact_entry_overrides_wildcard() {
        let c = constraints(vec![entry("*", &[], &[("cpu", "2")]), entry("app", &[], &[("cpu", "4")])]);
        let decision = bound_containers(
            &[
                resources("app", &[("cpu", "5")], &[]),
                resources("sidecar", &[("cpu", "3")], &[]),
            ],
            Some(&c),
        );
        assert_eq!(decision.containers[0].requests["cpu"], "4");
        assert_eq!(decision.containers[1].requests["cpu"], "2");
        assert_eq!(decision.pod_cpu_request, "6");
    }

    #[test]
    fn test_raised_to_min_allowed_and_limits_follow() {
        let c = constraints(vec![entry("app", &[("memory", "256Mi")], &[])]);
        let decision = bound_containers(
            &[resources("app", &[("memory", "64Mi")], &[("memory", "128Mi")])],
            Some(&c),
        );
        let app = &decision.containers[0];
        assert_eq!(app.requests["memory"], "256Mi");
        assert_eq!(app.limits["memory"], "256Mi");
        assert_eq!(decision.pod_memory_request, "256Mi");
    }

    #[test]
    fn test_disabled_and_uncovered_containers_are_excluded() {
        let mut disabled = entry("sidecar", &[], &[]);
        disabled.enabled = Some(false);
        let c = constraints(vec![entry("app", &[], &[]), disabled]);
        let decision = bound_containers(
            &[
                resources("app", &[("cpu", "500m")], &[]),
                resources("sidecar", &[("cpu", "1")], &[]),
                resources("other", &[("cpu", "1")], &[]),
            ],
            Some(&c),
        );
        assert_eq!(decision.containers.len(), 1);
        assert_eq!(decision.excluded, vec!["sidecar".to_string(), "other".to_string()]);
        assert_eq!(decision.pod_cpu_request, "500m");
    }

    #[test]
    fn test_no_constraints_passes_through() {
        let decision = bound_containers(&[resources("app", &[("cpu", "750m"), ("memory", "1Gi")], &[])], None);
        assert_eq!(decision.containers[0].requests["cpu"], "750m");
        assert_eq!(decision.pod_cpu_request, "750m");
        assert_eq!(decision.pod_memory_request, "1Gi");
    }
}
