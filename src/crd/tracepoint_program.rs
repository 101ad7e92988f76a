//! TracepointProgram Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{BpfProgramCommon, Condition};

/// Specification for a TracepointProgram
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "bpfd.io",
    version = "v1alpha1",
    kind = "TracepointProgram",
    plural = "tracepointprograms",
    shortname = "tpprog",
    status = "TracepointProgramStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Tracepoint","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct TracepointProgramSpec {
    /// Bytecode, section, global data and node selector
    #[serde(flatten)]
    pub common: BpfProgramCommon,

    /// Tracepoint to attach to, e.g. `syscalls/sys_enter_kill`
    pub name: String,
}

/// Status for a TracepointProgram
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct TracepointProgramStatus {
    /// Cluster-wide conditions, maintained by the operator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
