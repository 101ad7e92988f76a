//! Interface resolution for network-attached program kinds
//!
//! An interface selector names an interface explicitly or asks for the node's
//! primary interface: the local interface carrying one of the node's
//! `InternalIP` addresses.

use std::net::IpAddr;

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::InterfaceSelector;
use crate::{Error, Result};

/// Discovers network interfaces on the local host
#[cfg_attr(test, automock)]
pub trait InterfaceDiscovery: Send + Sync {
    /// Name of the interface that carries the node's primary address
    fn primary_interface(&self, node: &Node) -> Result<String>;
}

/// Resolve an interface selector to the interfaces to attach to
///
/// A selector with neither field set is rejected: it would otherwise resolve
/// to no interfaces and silently load nothing.
pub fn resolve_interfaces(
    selector: &InterfaceSelector,
    node: &Node,
    discovery: &dyn InterfaceDiscovery,
) -> Result<Vec<String>> {
    if let Some(name) = &selector.interface {
        return Ok(vec![name.clone()]);
    }

    if selector.primary_node_interface == Some(true) {
        let iface = discovery.primary_interface(node)?;
        debug!(node = %node.name_any(), %iface, "Resolved primary node interface");
        return Ok(vec![iface]);
    }

    Err(Error::validation(
        "no interfaces selected: interfaceselector needs interface or primarynodeinterface",
    ))
}

/// Internal IP addresses the API server reports for a node
pub fn node_internal_ips(node: &Node) -> Vec<IpAddr> {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .map(|addrs| {
            addrs
                .iter()
                .filter(|a| a.type_ == "InternalIP")
                .filter_map(|a| a.address.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// [`InterfaceDiscovery`] reading the host's interface addresses
///
/// The agent runs with host networking, so the addresses visible to the
/// process are the node's.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostInterfaces;

impl InterfaceDiscovery for HostInterfaces {
    fn primary_interface(&self, node: &Node) -> Result<String> {
        let wanted = node_internal_ips(node);
        if wanted.is_empty() {
            return Err(Error::interface(format!(
                "node {} reports no InternalIP address",
                node.name_any()
            )));
        }

        let addrs = nix::ifaddrs::getifaddrs()
            .map_err(|e| Error::interface(format!("failed to list interfaces: {e}")))?;

        for ifaddr in addrs {
            let Some(address) = ifaddr.address else {
                continue;
            };
            let ip = if let Some(v4) = address.as_sockaddr_in() {
                IpAddr::V4(v4.ip())
            } else if let Some(v6) = address.as_sockaddr_in6() {
                IpAddr::V6(v6.ip())
            } else {
                continue;
            };
            if wanted.contains(&ip) {
                return Ok(ifaddr.interface_name);
            }
        }

        Err(Error::interface(format!(
            "no local interface carries node address {}",
            wanted
                .iter()
                .map(|ip| ip.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}
