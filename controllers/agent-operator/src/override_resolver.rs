//! User overrides
//!
//! An override always wins over what the features require. When it disables
//! a component the features need, the decision carries a conflict message that
//! ends up in the `OverrideReconcileConflict` condition.

use crate::component::{DEFAULT_TAG, container_name, default_image_name};
use crate::feature::PodTemplateManager;
use crds::{ComponentName, ComponentOverride, ImageOverride, ResourceList};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Reason of the conflict condition
pub const CONFLICT_REASON: &str = "OverrideConflict";

/// Outcome of override resolution for one component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the component should exist
    pub enabled: bool,
    /// Set when the override disabled a required component
    pub conflict: Option<String>,
}

/// Decide whether a component is enabled
///
/// - a disabling override wins, and conflicts when the component is required
/// - a non-disabling override enables the component
/// - without override, the requirement is followed as is
#[must_use]
pub fn resolve(required: Option<bool>, override_: Option<&ComponentOverride>, component: ComponentName) -> Decision {
    match override_ {
        Some(o) if o.is_disabled() => Decision {
            enabled: false,
            conflict: (required == Some(true)).then(|| format!("{component} component is set to disabled")),
        },
        Some(_) => Decision {
            enabled: true,
            conflict: None,
        },
        None => Decision {
            enabled: required == Some(true),
            conflict: None,
        },
    }
}

/// Patch a feature-mutated Deployment with a user override
///
/// Labels that are part of the Deployment selector are never overwritten.
pub fn apply_override(deployment: &mut Deployment, o: &ComponentOverride, component: ComponentName, registry: &str) {
    if let Some(name) = o.name_override() {
        deployment.metadata.name = Some(name.to_string());
    }

    let spec = deployment.spec.get_or_insert_with(Default::default);
    if let Some(replicas) = o.replicas {
        spec.replicas = Some(replicas);
    }
    let protected: Vec<String> = spec
        .selector
        .match_labels
        .as_ref()
        .map(|l| l.keys().cloned().collect())
        .unwrap_or_default();

    let mut manager = PodTemplateManager::new(std::mem::take(&mut spec.template));
    for var in &o.env {
        manager.add_env_var(&var.name, var.value.as_str());
    }
    for (key, value) in &o.labels {
        if !protected.contains(key) {
            manager.add_label(key, value);
        }
    }
    for (key, value) in &o.annotations {
        manager.add_annotation(key, value);
    }
    for (container, patch) in &o.containers {
        for var in &patch.env {
            manager.add_env_var_to_container(container, &var.name, var.value.as_str());
        }
    }
    spec.template = manager.into_inner();

    let Some(pod) = spec.template.spec.as_mut() else {
        return;
    };
    if !o.node_selector.is_empty() {
        pod.node_selector = Some(o.node_selector.clone());
    }
    if let Some(class) = &o.priority_class_name {
        pod.priority_class_name = Some(class.clone());
    }
    if let Some(account) = &o.service_account_name {
        pod.service_account_name = Some(account.clone());
    }

    for container in &mut pod.containers {
        if let Some(image) = o.image.as_ref().filter(|_| container.name == container_name(component)) {
            container.image = Some(image_reference(image, component, registry));
        }
        let Some(patch) = o.containers.get(&container.name) else {
            continue;
        };
        if let Some(resources) = &patch.resources {
            container.resources = Some(ResourceRequirements {
                limits: quantities(&resources.limits),
                requests: quantities(&resources.requests),
                ..Default::default()
            });
        }
        if let Some(args) = &patch.args {
            container.args = Some(args.clone());
        }
    }
}

/// Full image reference for an image override
///
/// A name containing `/` is a repository and skips the registry; a name
/// containing a tag after its last `/` is used as is.
#[must_use]
pub fn image_reference(image: &ImageOverride, component: ComponentName, registry: &str) -> String {
    let name = image
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| default_image_name(component));
    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("{registry}/{name}")
    };
    let last_segment = name.rsplit('/').next().unwrap_or(name);
    if last_segment.contains(':') {
        return repository;
    }
    let tag = image.tag.as_deref().filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TAG);
    format!("{repository}:{tag}")
}

fn quantities(list: &ResourceList) -> Option<BTreeMap<String, Quantity>> {
    if list.is_empty() {
        return None;
    }
    Some(list.iter().map(|(k, v)| (k.clone(), Quantity(v.clone()))).collect())
}
