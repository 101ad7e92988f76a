//! End-to-end integration tests for the bpfd agent
//!
//! These tests require a Kubernetes cluster to run. They are ignored by default
//! and can be run with:
//!
//! ```bash
//! cargo test --test kind -- --ignored
//! ```
//!
//! The tests use the cluster of the current kubeconfig context and install the
//! agent's CRDs into it. bpfd itself is replaced by an in-memory daemon, so no
//! eBPF capable node is needed.

mod kind_tests;
