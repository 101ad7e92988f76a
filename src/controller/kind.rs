//! Per-kind strategy for the shared reconciliation driver
//!
//! XDP, TC and tracepoint programs go through the same pass. What differs is
//! captured by [`ProgramKind`]: which resource is watched, how attach targets
//! are resolved, how ids are formed and what attach info bpfd gets.

use std::fmt::Debug;

use k8s_openapi::api::core::v1::Node;
use kube::core::ClusterResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::interfaces::InterfaceDiscovery;
use super::request::build_load_request;
use crate::crd::BpfProgramCommon;
use crate::daemon::{AttachInfo, LoadRequest, ProgramType};
use crate::Result;

/// Strategy implemented by each program kind
pub trait ProgramKind: Send + Sync + 'static {
    /// The cluster-scoped resource describing programs of this kind
    type Resource: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static;

    /// bpfd program type
    const PROGRAM_TYPE: ProgramType;

    /// Finalizer guarding BpfPrograms of this kind
    const FINALIZER: &'static str;

    /// Bytecode, section, global data and node selector of a program
    fn common(program: &Self::Resource) -> &BpfProgramCommon;

    /// Attach targets on this node (interfaces, or the tracepoint)
    fn resolve_targets(
        program: &Self::Resource,
        node: &Node,
        discovery: &dyn InterfaceDiscovery,
    ) -> Result<Vec<String>>;

    /// bpfd id of the program attached to `target`
    fn id_for(program: &Self::Resource, target: &str) -> String;

    /// Attach info for `target`
    fn attach_info(program: &Self::Resource, target: &str) -> Result<AttachInfo>;

    /// Complete load request for `target`
    fn load_request(program: &Self::Resource, target: &str) -> Result<LoadRequest> {
        build_load_request(
            Self::id_for(program, target),
            Self::PROGRAM_TYPE,
            Self::common(program),
            Self::attach_info(program, target)?,
        )
    }
}
