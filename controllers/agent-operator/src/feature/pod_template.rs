//! Mutation helpers for a component pod template
//!
//! Feature modules never touch the `PodTemplateSpec` directly: every change
//! goes through `PodTemplateManager` so that environment variables replace by
//! name and container ports are checked for collisions.

use k8s_openapi::api::core::v1::{Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec};
use std::collections::BTreeMap;

/// A container port number already claimed under another name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInUse {
    /// The contested port number
    pub port: i32,
    /// Name of the port that holds it
    pub owner: String,
}

/// Owns a pod template while feature modules mutate it
#[derive(Debug, Clone, Default)]
pub struct PodTemplateManager {
    template: PodTemplateSpec,
}

impl PodTemplateManager {
    #[must_use]
    pub fn new(template: PodTemplateSpec) -> Self {
        Self { template }
    }

    /// Give the mutated template back
    #[must_use]
    pub fn into_inner(self) -> PodTemplateSpec {
        self.template
    }

    fn containers_mut(&mut self) -> &mut Vec<Container> {
        &mut self.template.spec.get_or_insert_with(PodSpec::default).containers
    }

    /// Set an environment variable on every container, replacing a previous value
    pub fn add_env_var(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        for container in self.containers_mut() {
            set_env(container, name, &value);
        }
    }

    /// Set an environment variable on one container; unknown containers are ignored
    pub fn add_env_var_to_container(&mut self, container_name: &str, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(container) = self.containers_mut().iter_mut().find(|c| c.name == container_name) {
            set_env(container, name, &value);
        }
    }

    /// Expose a port on the first container
    ///
    /// A port with the same name is replaced. A port with another name on the
    /// same number and protocol is a collision.
    ///
    /// # Errors
    ///
    /// Returns `PortInUse` with the name of the port already holding the number.
    pub fn add_port(&mut self, port: ContainerPort) -> Result<(), PortInUse> {
        let Some(container) = self.containers_mut().first_mut() else {
            return Ok(());
        };
        let ports = container.ports.get_or_insert_with(Vec::new);
        let protocol = |p: &ContainerPort| p.protocol.clone().unwrap_or_else(|| "TCP".to_string());

        if let Some(existing) = ports.iter().find(|p| {
            p.container_port == port.container_port && protocol(p) == protocol(&port) && p.name != port.name
        }) {
            return Err(PortInUse {
                port: port.container_port,
                owner: existing.name.clone().unwrap_or_default(),
            });
        }

        match ports.iter_mut().find(|p| p.name.is_some() && p.name == port.name) {
            Some(slot) => *slot = port,
            None => ports.push(port),
        }
        Ok(())
    }

    /// Add a pod label
    pub fn add_label(&mut self, key: &str, value: &str) {
        self.template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    /// Add a pod annotation
    pub fn add_annotation(&mut self, key: &str, value: &str) {
        self.template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    /// Value of an environment variable on a container
    #[must_use]
    pub fn env_value(&self, container_name: &str, name: &str) -> Option<&str> {
        env_value(&self.template, container_name, name)
    }
}

fn set_env(container: &mut Container, name: &str, value: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == name) {
        Some(var) => {
            var.value = Some(value.to_string());
            var.value_from = None;
        }
        None => env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }),
    }
}

/// Literal value of an environment variable on a container of `template`
#[must_use]
pub fn env_value<'a>(template: &'a PodTemplateSpec, container_name: &str, name: &str) -> Option<&'a str> {
    template
        .spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == container_name)?
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)?
        .value
        .as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PodTemplateManager {
        PodTemplateManager::new(PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "agent".to_string(),
                        ..Default::default()
                    },
                    Container {
                        name: "init".to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
        })
    }

    fn port(name: &str, number: i32, protocol: &str) -> ContainerPort {
        ContainerPort {
            name: Some(name.to_string()),
            container_port: number,
            protocol: Some(protocol.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_env_var_replaces_by_name() {
        let mut m = manager();
        m.add_env_var("DD_LOG_LEVEL", "info");
        m.add_env_var("DD_LOG_LEVEL", "debug");
        assert_eq!(m.env_value("agent", "DD_LOG_LEVEL"), Some("debug"));
        assert_eq!(m.env_value("init", "DD_LOG_LEVEL"), Some("debug"));

        let template = m.into_inner();
        let env = template.spec.unwrap().containers[0].env.clone().unwrap();
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_env_var_on_single_container() {
        let mut m = manager();
        m.add_env_var_to_container("init", "ONLY_INIT", "1");
        m.add_env_var_to_container("ghost", "IGNORED", "1");
        assert_eq!(m.env_value("init", "ONLY_INIT"), Some("1"));
        assert_eq!(m.env_value("agent", "ONLY_INIT"), None);
    }

    #[test]
    fn test_port_collision() {
        let mut m = manager();
        m.add_port(port("dogstatsdport", 8125, "UDP")).unwrap();
        // Same name replaces
        m.add_port(port("dogstatsdport", 8125, "UDP")).unwrap();
        // Same number, other protocol is fine
        m.add_port(port("metrics", 8125, "TCP")).unwrap();

        let err = m.add_port(port("statsd", 8125, "UDP")).unwrap_err();
        assert_eq!(
            err,
            PortInUse {
                port: 8125,
                owner: "dogstatsdport".to_string()
            }
        );

        let template = m.into_inner();
        assert_eq!(template.spec.unwrap().containers[0].ports.as_ref().unwrap().len(), 2);
    }
}
