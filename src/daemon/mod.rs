//! Access to the local bpfd daemon
//!
//! The agent never touches the kernel itself. Loading and unloading go
//! through bpfd's loader API, and bpfd is the source of truth for what is
//! currently attached on the node.
//!
//! [`BpfdDaemon`] abstracts the three calls the agent needs so the
//! reconciliation engine can be exercised against a mock. [`client::GrpcDaemon`]
//! is the tonic implementation.

pub mod client;

use std::collections::BTreeMap;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::crd::{ImagePullPolicy, ProgramMaps, TcDirection, TcProceedOn, XdpProceedOn};
use crate::Result;

pub use client::GrpcDaemon;

/// Program types understood by bpfd
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramType {
    /// Traffic control classifier
    Tc,
    /// Tracepoint
    Tracepoint,
    /// XDP
    Xdp,
}

impl ProgramType {
    /// Wire value of the program type
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Tc => 3,
            Self::Tracepoint => 5,
            Self::Xdp => 6,
        }
    }

    /// Name used in BpfProgram records and labels
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tc => "tc",
            Self::Tracepoint => "tracepoint",
            Self::Xdp => "xdp",
        }
    }
}

impl std::fmt::Display for ProgramType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where bpfd should take the bytecode from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BytecodeLocation {
    /// OCI image pulled by bpfd
    Image {
        /// Image URL
        url: String,
        /// Pull policy
        pull_policy: ImagePullPolicy,
    },
    /// File on the node
    File(String),
}

/// Where and how a program is attached
///
/// Built fresh from the program resource on every pass and compared with the
/// attach info bpfd reports, field by field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachInfo {
    /// XDP hook on one interface
    Xdp {
        /// Position in the dispatcher chain
        priority: i32,
        /// Interface name
        iface: String,
        /// Return codes on which the chain continues
        proceed_on: Vec<XdpProceedOn>,
    },
    /// TC hook on one interface
    Tc {
        /// Position in the dispatcher chain
        priority: i32,
        /// Interface name
        iface: String,
        /// Ingress or egress
        direction: TcDirection,
        /// Actions on which the chain continues
        proceed_on: Vec<TcProceedOn>,
    },
    /// Tracepoint
    Tracepoint {
        /// Tracepoint name, e.g. `syscalls/sys_enter_kill`
        name: String,
    },
}

/// A complete load request for bpfd
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    /// Id the program is loaded under
    pub id: String,
    /// Program type
    pub program_type: ProgramType,
    /// Bytecode source
    pub location: BytecodeLocation,
    /// ELF section to load
    pub section_name: String,
    /// Global variables to set before load
    pub global_data: BTreeMap<String, Vec<u8>>,
    /// Attach point
    pub attach: AttachInfo,
}

/// A program bpfd reports as loaded
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedProgram {
    /// Id the program was loaded under
    pub id: String,
    /// Attach info in effect. `None` when bpfd reported something the agent
    /// cannot represent, which never matches a desired program.
    pub attach: Option<AttachInfo>,
    /// Pinned maps
    pub maps: ProgramMaps,
}

/// All loaded programs of one type, keyed by id
pub type Snapshot = BTreeMap<String, LoadedProgram>;

/// The bpfd loader API as used by the agent
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BpfdDaemon: Send + Sync {
    /// List every loaded program of the given type
    async fn list(&self, program_type: ProgramType) -> Result<Vec<LoadedProgram>>;

    /// Load and attach a program, returning its pinned maps
    async fn load(&self, request: &LoadRequest) -> Result<ProgramMaps>;

    /// Detach and unload the program with the given id
    async fn unload(&self, id: &str) -> Result<()>;
}

/// Take the per-pass snapshot of loaded programs of one type
///
/// Called once per reconcile pass, so daemon traffic scales with the number
/// of program kinds rather than the number of program resources.
pub async fn snapshot(daemon: &dyn BpfdDaemon, program_type: ProgramType) -> Result<Snapshot> {
    let programs = daemon.list(program_type).await?;
    Ok(programs.into_iter().map(|p| (p.id.clone(), p)).collect())
}
