//! XdpProgram Custom Resource Definition
//!
//! An XdpProgram attaches an XDP program to one or more network interfaces on
//! every node matched by its node selector.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{BpfProgramCommon, Condition, InterfaceSelector};

/// Specification for an XdpProgram
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "bpfd.io",
    version = "v1alpha1",
    kind = "XdpProgram",
    plural = "xdpprograms",
    shortname = "xdpprog",
    status = "XdpProgramStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Priority","type":"integer","jsonPath":".spec.priority"}"#,
    printcolumn = r#"{"name":"Section","type":"string","jsonPath":".spec.sectionname"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct XdpProgramSpec {
    /// Bytecode, section, global data and node selector
    #[serde(flatten)]
    pub common: BpfProgramCommon,

    /// Interfaces to attach to
    #[serde(rename = "interfaceselector")]
    pub interface_selector: InterfaceSelector,

    /// Position relative to other XDP programs on the same interface,
    /// 0 to 1000 with lower values running first
    #[schemars(range(min = 0, max = 1000))]
    pub priority: i32,

    /// Return codes on which the next program in the chain runs.
    /// Not updatable after creation.
    #[serde(rename = "proceedon", default, skip_serializing_if = "Vec::is_empty")]
    pub proceed_on: Vec<String>,
}

/// Status for an XdpProgram
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct XdpProgramStatus {
    /// Cluster-wide conditions, maintained by the operator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
