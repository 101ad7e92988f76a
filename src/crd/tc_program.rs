//! TcProgram Custom Resource Definition
//!
//! A TcProgram attaches a traffic-control classifier to the ingress or egress
//! hook of one or more network interfaces.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{BpfProgramCommon, Condition, InterfaceSelector, TcDirection};

/// Specification for a TcProgram
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "bpfd.io",
    version = "v1alpha1",
    kind = "TcProgram",
    plural = "tcprograms",
    shortname = "tcprog",
    status = "TcProgramStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Direction","type":"string","jsonPath":".spec.direction"}"#,
    printcolumn = r#"{"name":"Priority","type":"integer","jsonPath":".spec.priority"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct TcProgramSpec {
    /// Bytecode, section, global data and node selector
    #[serde(flatten)]
    pub common: BpfProgramCommon,

    /// Interfaces to attach to
    #[serde(rename = "interfaceselector")]
    pub interface_selector: InterfaceSelector,

    /// Position relative to other TC programs on the same hook,
    /// 0 to 1000 with lower values running first
    #[schemars(range(min = 0, max = 1000))]
    pub priority: i32,

    /// Hook to attach to
    #[serde(default)]
    pub direction: TcDirection,

    /// TC actions on which the next program in the chain runs.
    /// Not updatable after creation.
    #[serde(rename = "proceedon", default, skip_serializing_if = "Vec::is_empty")]
    pub proceed_on: Vec<String>,
}

/// Status for a TcProgram
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TcProgramStatus {
    /// Cluster-wide conditions, maintained by the operator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
