//! Integration tests for the bpfd agent
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! cluster operators interact with program resources.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating, reading and deleting program
//!   resources through the Kubernetes API
//!
//! - `agent_lifecycle`: Stories about the agent's reconcile passes against a
//!   real API server, with bpfd replaced by an in-memory daemon
//!
//! # Running These Tests
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```

mod agent_lifecycle;
mod crd_operations;
mod helpers;
