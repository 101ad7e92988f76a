//! bpfd-agent - per-node reconciliation of eBPF program resources
//!
//! The agent runs on every node of the cluster. It watches the cluster-scoped
//! `XdpProgram`, `TcProgram` and `TracepointProgram` resources, decides which
//! of them should be attached on the local node, and drives the local bpfd
//! daemon over gRPC to load or unload them. The outcome for each
//! (program, node) pair is recorded in a `BpfProgram` resource.
//!
//! # Architecture
//!
//! Each program kind runs its own controller. A reconcile pass for one kind:
//! - lists every resource of that kind
//! - takes one snapshot of the programs bpfd has loaded for that kind
//! - for each resource, resolves attach targets, decides an action per target
//!   and calls the daemon
//! - writes the aggregate outcome to the per-node `BpfProgram`
//!
//! A `BpfProgram` carries a finalizer while a program may be attached, so the
//! object cannot disappear before the program has been unloaded.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (XdpProgram, TcProgram, ...)
//! - [`controller`] - Reconciliation engine and controller wiring
//! - [`daemon`] - Client for the local bpfd daemon
//! - [`proto`] - gRPC protocol definitions for the bpfd loader API
//! - [`retry`] - Retry with exponential backoff for startup connections
//! - [`error`] - Error types for the agent

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod daemon;
pub mod error;
pub mod proto;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Default gRPC endpoint of the local bpfd daemon
pub const DEFAULT_BPFD_ENDPOINT: &str = "http://localhost:50051";

/// Fixed delay before a failed reconcile pass is retried
pub const RETRY_DURATION: std::time::Duration = std::time::Duration::from_secs(5);

/// Watch timeout in seconds, kept below the API server's 30s limit
pub const WATCH_TIMEOUT_SECS: u32 = 25;
