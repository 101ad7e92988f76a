//! TC program strategy

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

use super::interfaces::{resolve_interfaces, InterfaceDiscovery};
use super::kind::ProgramKind;
use super::request::tc_proceed_on;
use crate::crd::{BpfProgramCommon, TcDirection, TcProgram};
use crate::daemon::{AttachInfo, ProgramType};
use crate::{Error, Result};

/// Finalizer on BpfPrograms created for TcPrograms
pub const TC_FINALIZER: &str = "bpfd.io.tcProgramController/finalizer";

/// TC programs fan out over every selected interface on one hook
pub struct Tc;

impl ProgramKind for Tc {
    type Resource = TcProgram;

    const PROGRAM_TYPE: ProgramType = ProgramType::Tc;
    const FINALIZER: &'static str = TC_FINALIZER;

    fn common(program: &TcProgram) -> &BpfProgramCommon {
        &program.spec.common
    }

    fn resolve_targets(
        program: &TcProgram,
        node: &Node,
        discovery: &dyn InterfaceDiscovery,
    ) -> Result<Vec<String>> {
        resolve_interfaces(&program.spec.interface_selector, node, discovery)
    }

    fn id_for(program: &TcProgram, iface: &str) -> String {
        format!("{}-{}", program.name_any(), iface)
    }

    fn attach_info(program: &TcProgram, iface: &str) -> Result<AttachInfo> {
        if program.spec.direction == TcDirection::None {
            return Err(Error::validation(format!(
                "tcProgram {} must set direction to INGRESS or EGRESS",
                program.name_any()
            )));
        }

        Ok(AttachInfo::Tc {
            priority: program.spec.priority,
            iface: iface.to_string(),
            direction: program.spec.direction,
            proceed_on: tc_proceed_on(&program.name_any(), &program.spec.proceed_on),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{BytecodeSelector, InterfaceSelector, TcProceedOn, TcProgramSpec};

    fn sample_tc(name: &str, direction: TcDirection) -> TcProgram {
        TcProgram::new(
            name,
            TcProgramSpec {
                common: BpfProgramCommon {
                    bytecode: BytecodeSelector {
                        image: None,
                        path: Some("/progs/tc_pass.o".to_string()),
                    },
                    section_name: "pass".to_string(),
                    ..Default::default()
                },
                interface_selector: InterfaceSelector {
                    interface: Some("eth0".to_string()),
                    primary_node_interface: None,
                },
                priority: 20,
                direction,
                proceed_on: vec!["ok".to_string(), "nonsense".to_string(), "shot".to_string()],
            },
        )
    }

    #[test]
    fn ids_join_program_and_interface() {
        let program = sample_tc("p", TcDirection::Ingress);
        assert_eq!(Tc::id_for(&program, "eth0"), "p-eth0");
        assert_eq!(Tc::id_for(&program, "eth1"), "p-eth1");
    }

    #[test]
    fn attach_info_carries_direction_and_chain() {
        let program = sample_tc("tc-counter", TcDirection::Egress);
        let req = Tc::load_request(&program, "eth0").unwrap();

        assert_eq!(req.id, "tc-counter-eth0");
        assert_eq!(req.program_type, ProgramType::Tc);
        assert_eq!(
            req.attach,
            AttachInfo::Tc {
                priority: 20,
                iface: "eth0".to_string(),
                direction: TcDirection::Egress,
                proceed_on: vec![TcProceedOn::Ok, TcProceedOn::Shot],
            }
        );
    }

    #[test]
    fn missing_direction_is_rejected() {
        let program = sample_tc("tc-counter", TcDirection::None);
        let err = Tc::attach_info(&program, "eth0").unwrap_err();
        assert!(err.to_string().contains("INGRESS or EGRESS"));
    }
}
