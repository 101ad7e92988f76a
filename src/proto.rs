//! gRPC protocol definitions for the bpfd loader API
//!
//! This module contains the generated Protobuf and gRPC client code for the
//! `bpfd.v1.Loader` service exposed by the daemon on each node.
//!
//! # Protocol Overview
//!
//! - `List` returns every program of one type the daemon has loaded, with the
//!   attach info actually in effect and the pinned maps.
//! - `Load` attaches a program under a caller-chosen id.
//! - `Unload` detaches the program with the given id.
//!
//! Conversion to and from the agent's domain types lives in
//! [`crate::daemon::client`].

#![allow(missing_docs)] // Generated code doesn't have docs

/// Generated protobuf and gRPC code for the bpfd loader
pub mod bpfd {
    /// Version 1 of the loader protocol
    pub mod v1 {
        tonic::include_proto!("bpfd.v1");
    }
}

// Re-export commonly used types at the module level for convenience
pub use bpfd::v1::*;
