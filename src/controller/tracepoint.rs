//! Tracepoint program strategy

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

use super::interfaces::InterfaceDiscovery;
use super::kind::ProgramKind;
use crate::crd::{BpfProgramCommon, TracepointProgram};
use crate::daemon::{AttachInfo, ProgramType};
use crate::Result;

/// Finalizer on BpfPrograms created for TracepointPrograms
pub const TRACEPOINT_FINALIZER: &str = "bpfd.io.tracepointProgramController/finalizer";

/// Tracepoint programs have a single target, the tracepoint itself
pub struct Tracepoint;

impl ProgramKind for Tracepoint {
    type Resource = TracepointProgram;

    const PROGRAM_TYPE: ProgramType = ProgramType::Tracepoint;
    const FINALIZER: &'static str = TRACEPOINT_FINALIZER;

    fn common(program: &TracepointProgram) -> &BpfProgramCommon {
        &program.spec.common
    }

    fn resolve_targets(
        program: &TracepointProgram,
        _node: &Node,
        _discovery: &dyn InterfaceDiscovery,
    ) -> Result<Vec<String>> {
        Ok(vec![program.spec.name.clone()])
    }

    fn id_for(program: &TracepointProgram, _tracepoint: &str) -> String {
        program.name_any()
    }

    fn attach_info(_program: &TracepointProgram, tracepoint: &str) -> Result<AttachInfo> {
        Ok(AttachInfo::Tracepoint {
            name: tracepoint.to_string(),
        })
    }
}
