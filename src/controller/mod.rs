//! Per-node reconciliation of eBPF program resources
//!
//! Each program kind is reconciled by a pass that compares the program
//! resources, this node's BpfPrograms and what bpfd reports as loaded, then
//! loads, unloads and records until they agree.

pub mod context;
pub mod decision;
pub mod driver;
pub mod interfaces;
pub mod kind;
pub mod request;
pub mod runner;
pub mod selector;
pub mod status;
pub mod store;
pub mod tc;
pub mod tracepoint;
pub mod xdp;

pub use context::{Context, ContextBuilder};
pub use driver::{run_pass, sweep_record, PassResult};
pub use interfaces::{HostInterfaces, InterfaceDiscovery};
pub use kind::ProgramKind;
pub use runner::{build_controllers, error_policy, reconcile};
pub use store::{KubeProgramStore, ProgramStore, SpecSource};
pub use tc::Tc;
pub use tracepoint::Tracepoint;
pub use xdp::Xdp;
