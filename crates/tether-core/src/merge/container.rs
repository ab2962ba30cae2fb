//! Container ports and security-context capabilities

use k8s_openapi::api::core::v1::{Capabilities, Container, ContainerPort, SecurityContext};

use super::{MergeError, MergeFunction, merge_keyed_opt};

/// Key of a container port: its name, or number and protocol when unnamed
#[derive(Debug, Clone, PartialEq, Eq)]
enum PortKey {
    Named(String),
    Number(i32, String),
}

fn port_key(port: &ContainerPort) -> PortKey {
    match &port.name {
        Some(name) if !name.is_empty() => PortKey::Named(name.clone()),
        _ => PortKey::Number(
            port.container_port,
            port.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
        ),
    }
}

/// Add a port to a container
pub fn add_port_to_container(
    container: &mut Container,
    port: ContainerPort,
    merge: MergeFunction<ContainerPort>,
) -> Result<(), MergeError> {
    merge_keyed_opt(&mut container.ports, port, port_key, merge)
}

/// Add capabilities to a container's security context
///
/// Capabilities form a set: already present entries are not repeated.
pub fn add_capabilities_to_container(container: &mut Container, capabilities: &[String]) {
    let added = container
        .security_context
        .get_or_insert_with(SecurityContext::default)
        .capabilities
        .get_or_insert_with(Capabilities::default)
        .add
        .get_or_insert_with(Vec::new);

    for capability in capabilities {
        if !added.contains(capability) {
            added.push(capability.clone());
        }
    }
}
