//! XDP program strategy

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

use super::interfaces::{resolve_interfaces, InterfaceDiscovery};
use super::kind::ProgramKind;
use super::request::xdp_proceed_on;
use crate::crd::{BpfProgramCommon, XdpProgram};
use crate::daemon::{AttachInfo, ProgramType};
use crate::Result;

/// Finalizer on BpfPrograms created for XdpPrograms
pub const XDP_FINALIZER: &str = "bpfd.io.xdpProgramController/finalizer";

/// XDP programs fan out over every selected interface
pub struct Xdp;

impl ProgramKind for Xdp {
    type Resource = XdpProgram;

    const PROGRAM_TYPE: ProgramType = ProgramType::Xdp;
    const FINALIZER: &'static str = XDP_FINALIZER;

    fn common(program: &XdpProgram) -> &BpfProgramCommon {
        &program.spec.common
    }

    fn resolve_targets(
        program: &XdpProgram,
        node: &Node,
        discovery: &dyn InterfaceDiscovery,
    ) -> Result<Vec<String>> {
        resolve_interfaces(&program.spec.interface_selector, node, discovery)
    }

    fn id_for(program: &XdpProgram, iface: &str) -> String {
        format!("{}-{}", program.name_any(), iface)
    }

    fn attach_info(program: &XdpProgram, iface: &str) -> Result<AttachInfo> {
        Ok(AttachInfo::Xdp {
            priority: program.spec.priority,
            iface: iface.to_string(),
            proceed_on: xdp_proceed_on(&program.name_any(), &program.spec.proceed_on),
        })
    }
}
