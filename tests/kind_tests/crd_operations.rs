//! Integration tests for CRD operations
//!
//! These tests tell the story of how cluster operators write program
//! resources through the Kubernetes API, and check that the schema keeps
//! the field names bpfd users write in their manifests.

use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;

use bpfd_agent::crd::{
    BpfProgramCommon, BytecodeImage, BytecodeSelector, ImagePullPolicy, InterfaceSelector,
    TcDirection, TcProgram, TcProgramSpec, TracepointProgram, TracepointProgramSpec, XdpProgram,
    XdpProgramSpec,
};

use super::helpers::ensure_test_cluster;

// =============================================================================
// Test Fixtures
// =============================================================================

fn image_bytecode(url: &str) -> BytecodeSelector {
    BytecodeSelector {
        image: Some(BytecodeImage {
            url: url.to_string(),
            image_pull_policy: ImagePullPolicy::IfNotPresent,
        }),
        path: None,
    }
}

async fn cleanup<K>(client: &Client, name: &str)
where
    K: kube::Resource<DynamicType = (), Scope = kube::core::ClusterResourceScope>
        + Clone
        + std::fmt::Debug
        + serde::de::DeserializeOwned,
{
    let api: Api<K> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

// =============================================================================
// Program Resource Stories
// =============================================================================

/// Story: Operator attaches an XDP program to every node's primary interface
///
/// Expected behavior:
/// - The XdpProgram is accepted by the API server
/// - Lowercase manifest keys (sectionname, interfaceselector, ...) survive
///   the round trip through the API server
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_operator_creates_xdp_program() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<XdpProgram> = Api::all(client.clone());
    let name = "test-xdp-create";
    cleanup::<XdpProgram>(&client, name).await;

    let program = XdpProgram::new(
        name,
        XdpProgramSpec {
            common: BpfProgramCommon {
                bytecode: image_bytecode("quay.io/bpfd-bytecode/xdp_pass:latest"),
                section_name: "pass".to_string(),
                ..Default::default()
            },
            interface_selector: InterfaceSelector {
                interface: None,
                primary_node_interface: Some(true),
            },
            priority: 55,
            proceed_on: vec!["pass".to_string(), "dispatcher_return".to_string()],
        },
    );
    api.create(&PostParams::default(), &program)
        .await
        .expect("failed to create XdpProgram");

    let fetched = api.get(name).await.expect("failed to get XdpProgram");
    assert_eq!(fetched.spec.priority, 55);
    assert_eq!(fetched.spec.common.section_name, "pass");
    assert_eq!(fetched.spec.interface_selector.primary_node_interface, Some(true));
    assert_eq!(fetched.spec.proceed_on.len(), 2);

    cleanup::<XdpProgram>(&client, name).await;
}

/// Story: Operator filters egress traffic with a TC program
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_operator_creates_tc_program() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<TcProgram> = Api::all(client.clone());
    let name = "test-tc-create";
    cleanup::<TcProgram>(&client, name).await;

    let program = TcProgram::new(
        name,
        TcProgramSpec {
            common: BpfProgramCommon {
                bytecode: image_bytecode("quay.io/bpfd-bytecode/tc_pass:latest"),
                section_name: "stats".to_string(),
                ..Default::default()
            },
            interface_selector: InterfaceSelector {
                interface: Some("eth0".to_string()),
                primary_node_interface: None,
            },
            priority: 0,
            direction: TcDirection::Egress,
            proceed_on: vec![],
        },
    );
    api.create(&PostParams::default(), &program)
        .await
        .expect("failed to create TcProgram");

    let fetched = api.get(name).await.expect("failed to get TcProgram");
    assert_eq!(fetched.spec.direction, TcDirection::Egress);
    assert_eq!(fetched.spec.interface_selector.interface.as_deref(), Some("eth0"));

    cleanup::<TcProgram>(&client, name).await;
}

/// Story: A priority outside 0..=1000 is refused by the schema
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_out_of_range_priority_is_rejected() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<TcProgram> = Api::all(client.clone());
    let name = "test-tc-priority";
    cleanup::<TcProgram>(&client, name).await;

    let program = TcProgram::new(
        name,
        TcProgramSpec {
            common: BpfProgramCommon {
                bytecode: image_bytecode("quay.io/bpfd-bytecode/tc_pass:latest"),
                section_name: "stats".to_string(),
                ..Default::default()
            },
            interface_selector: InterfaceSelector {
                interface: Some("eth0".to_string()),
                primary_node_interface: None,
            },
            priority: 5000,
            direction: TcDirection::Ingress,
            proceed_on: vec![],
        },
    );
    let result = api.create(&PostParams::default(), &program).await;
    assert!(result.is_err(), "priority 5000 should be rejected");

    cleanup::<TcProgram>(&client, name).await;
}

/// Story: Operator traces kill syscalls from a bytecode file on the node
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_operator_creates_tracepoint_program() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<TracepointProgram> = Api::all(client.clone());
    let name = "test-tracepoint-create";
    cleanup::<TracepointProgram>(&client, name).await;

    let program = TracepointProgram::new(
        name,
        TracepointProgramSpec {
            common: BpfProgramCommon {
                bytecode: BytecodeSelector {
                    image: None,
                    path: Some("/var/lib/bpfd/kill.o".to_string()),
                },
                section_name: "kill".to_string(),
                ..Default::default()
            },
            name: "syscalls/sys_enter_kill".to_string(),
        },
    );
    api.create(&PostParams::default(), &program)
        .await
        .expect("failed to create TracepointProgram");

    let fetched = api.get(name).await.expect("failed to get TracepointProgram");
    assert_eq!(fetched.spec.name, "syscalls/sys_enter_kill");
    assert!(fetched.spec.common.bytecode.image.is_none());

    cleanup::<TracepointProgram>(&client, name).await;
}
