//! Integration tests for the reconcile pass against a real API server
//!
//! bpfd is replaced by [`FakeDaemon`]; everything on the Kubernetes side is
//! real, including owner references and finalizers.

use std::sync::Arc;

use kube::api::{Api, DeleteParams, PostParams};

use bpfd_agent::controller::{run_pass, sweep_record, Context, PassResult, Tracepoint, Xdp};
use bpfd_agent::crd::{
    BpfProgram, BpfProgramCommon, BpfProgramCondition, BytecodeSelector, InterfaceSelector,
    TracepointProgram, TracepointProgramSpec, XdpProgram, XdpProgramSpec,
};

use super::helpers::{
    ensure_test_cluster, first_node_name, force_delete_record, FakeDaemon, FixedInterface,
};

fn kill_tracer(name: &str) -> TracepointProgram {
    TracepointProgram::new(
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
    )
}

/// Story: A tracepoint program is loaded on the node and released on delete
///
/// Expected behavior:
/// - The first pass creates the node's BpfProgram with a finalizer
/// - The second pass loads the program and records it as Loaded
/// - A further pass changes nothing
/// - Once the program resource is deleted, the sweep unloads the program
///   and releases the finalizer
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_tracepoint_program_lifecycle() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let node = first_node_name(&client).await;
    let name = "test-kill-tracer";
    let record_name = BpfProgram::name_for(name, &node);

    let programs: Api<TracepointProgram> = Api::all(client.clone());
    let records: Api<BpfProgram> = Api::all(client.clone());
    let _ = programs.delete(name, &DeleteParams::default()).await;
    force_delete_record(&client, &record_name).await;

    programs
        .create(&PostParams::default(), &kill_tracer(name))
        .await
        .expect("failed to create TracepointProgram");

    let daemon = Arc::new(FakeDaemon::default());
    let ctx = Context::<Tracepoint>::builder(client.clone(), daemon.clone(), node.clone()).build();

    // First pass: record only
    run_pass(&ctx).await.expect("first pass failed");
    let record = records.get(&record_name).await.expect("record not created");
    assert!(record.has_finalizer("bpfd.io.tracepointProgramController/finalizer"));
    assert!(daemon.ids().is_empty(), "nothing loads on the first pass");

    // Second pass: load
    let result = run_pass(&ctx).await.expect("second pass failed");
    assert_eq!(result, PassResult::Settled);
    assert_eq!(daemon.ids(), vec![name.to_string()]);

    let record = records.get(&record_name).await.expect("record vanished");
    assert_eq!(
        record.status.as_ref().and_then(|s| s.current()),
        Some(BpfProgramCondition::Loaded)
    );
    assert!(record.spec.programs.contains_key(name));

    // Third pass: nothing to do
    let version = record.metadata.resource_version.clone();
    run_pass(&ctx).await.expect("third pass failed");
    let record = records.get(&record_name).await.expect("record vanished");
    assert_eq!(record.metadata.resource_version, version);

    // Delete the program; the sweep releases the record
    programs
        .delete(name, &DeleteParams::default())
        .await
        .expect("failed to delete TracepointProgram");

    let record = records.get(&record_name).await.expect("record vanished");
    sweep_record(&ctx, &record).await.expect("sweep failed");
    assert!(daemon.ids().is_empty(), "program should be unloaded");

    if let Some(record) = records.get_opt(&record_name).await.expect("get failed") {
        assert!(!record.has_finalizer("bpfd.io.tracepointProgramController/finalizer"));
    }

    force_delete_record(&client, &record_name).await;
}

/// Story: An XDP program follows the node's primary interface
///
/// Expected behavior:
/// - The program is loaded on whatever interface discovery names
/// - The id recorded on the BpfProgram carries that interface
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_xdp_program_attaches_to_primary_interface() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let node = first_node_name(&client).await;
    let name = "test-xdp-primary";
    let record_name = BpfProgram::name_for(name, &node);

    let programs: Api<XdpProgram> = Api::all(client.clone());
    let records: Api<BpfProgram> = Api::all(client.clone());
    let _ = programs.delete(name, &DeleteParams::default()).await;
    force_delete_record(&client, &record_name).await;

    let program = XdpProgram::new(
        name,
        XdpProgramSpec {
            common: BpfProgramCommon {
                bytecode: BytecodeSelector {
                    image: None,
                    path: Some("/var/lib/bpfd/xdp_pass.o".to_string()),
                },
                section_name: "pass".to_string(),
                ..Default::default()
            },
            interface_selector: InterfaceSelector {
                interface: None,
                primary_node_interface: Some(true),
            },
            priority: 50,
            proceed_on: vec![],
        },
    );
    programs
        .create(&PostParams::default(), &program)
        .await
        .expect("failed to create XdpProgram");

    let daemon = Arc::new(FakeDaemon::default());
    let ctx = Context::<Xdp>::builder(client.clone(), daemon.clone(), node.clone())
        .interfaces(Arc::new(FixedInterface("ens5")))
        .build();

    run_pass(&ctx).await.expect("first pass failed");
    run_pass(&ctx).await.expect("second pass failed");

    let id = format!("{name}-ens5");
    assert_eq!(daemon.ids(), vec![id.clone()]);
    let record = records.get(&record_name).await.expect("record not created");
    assert!(record.spec.programs.contains_key(&id));

    programs
        .delete(name, &DeleteParams::default())
        .await
        .expect("failed to delete XdpProgram");
    let record = records.get(&record_name).await.expect("record vanished");
    sweep_record(&ctx, &record).await.expect("sweep failed");
    assert!(daemon.ids().is_empty());

    force_delete_record(&client, &record_name).await;
}
