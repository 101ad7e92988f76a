//! Custom Resource Definitions for the bpfd agent
//!
//! The program kinds (`XdpProgram`, `TcProgram`, `TracepointProgram`) are
//! written by cluster operators. `BpfProgram` is written by the agent, one per
//! (program, node) pair.

mod bpf_program;
mod tc_program;
mod tracepoint_program;
mod types;
mod xdp_program;

pub use bpf_program::{
    BpfProgram, BpfProgramCondition, BpfProgramSpec, BpfProgramStatus, ProgramMaps,
    LABEL_VALUE_MAX, NODE_LABEL, OWNING_CONFIG_LABEL, PROGRAM_TYPE_LABEL,
};
pub use tc_program::{TcProgram, TcProgramSpec, TcProgramStatus};
pub use tracepoint_program::{TracepointProgram, TracepointProgramSpec, TracepointProgramStatus};
pub use types::{
    BpfProgramCommon, BytecodeImage, BytecodeSelector, Condition, ConditionStatus,
    ImagePullPolicy, InterfaceSelector, TcDirection, TcProceedOn, XdpProceedOn,
};
pub use xdp_program::{XdpProgram, XdpProgramSpec, XdpProgramStatus};
