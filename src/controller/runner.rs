//! Controller runner - builds controller futures for each program kind
//!
//! Every kind gets two controllers sharing one [`Context`]:
//!
//! - the program controller, triggered by the program resources, by the
//!   BpfPrograms they own on this node and by label changes on this node.
//!   Whatever the trigger, it runs a full pass over the kind.
//! - the sweep controller, triggered by this node's BpfPrograms of the kind,
//!   which releases records whose program resource is gone.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::controller::{self, Action};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, instrument};

use super::context::Context;
use super::driver::{run_pass, sweep_record, PassResult};
use super::kind::ProgramKind;
use super::tc::Tc;
use super::tracepoint::Tracepoint;
use super::xdp::Xdp;
use crate::crd::{BpfProgram, NODE_LABEL, PROGRAM_TYPE_LABEL};
use crate::daemon::BpfdDaemon;
use crate::{Error, Result, RETRY_DURATION, WATCH_TIMEOUT_SECS};

/// A controller future ready to be driven
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

impl PassResult {
    /// Map the pass result to the controller's next action
    pub fn into_action(self) -> Action {
        match self {
            PassResult::Retry => Action::requeue(RETRY_DURATION),
            PassResult::Idle | PassResult::Settled => Action::await_change(),
        }
    }
}

/// Reconcile entry point for the program controller
///
/// The triggering object only names the reason for the pass; the pass
/// itself covers every program of the kind.
#[instrument(skip(program, ctx), fields(trigger = %program.name_any()))]
pub async fn reconcile<K: ProgramKind>(
    program: Arc<K::Resource>,
    ctx: Arc<Context<K>>,
) -> Result<Action> {
    Ok(run_pass(&ctx).await?.into_action())
}

/// Error policy for the program controller
pub fn error_policy<K: ProgramKind>(
    program: Arc<K::Resource>,
    error: &Error,
    _ctx: Arc<Context<K>>,
) -> Action {
    error!(
        ?error,
        program_type = %K::PROGRAM_TYPE,
        trigger = %program.name_any(),
        "reconciliation failed"
    );
    Action::requeue(RETRY_DURATION)
}

/// Reconcile entry point for the sweep controller
pub async fn reconcile_record<K: ProgramKind>(
    record: Arc<BpfProgram>,
    ctx: Arc<Context<K>>,
) -> Result<Action> {
    Ok(sweep_record(&ctx, &record).await?.into_action())
}

/// Error policy for the sweep controller
pub fn record_error_policy<K: ProgramKind>(
    record: Arc<BpfProgram>,
    error: &Error,
    _ctx: Arc<Context<K>>,
) -> Action {
    error!(
        ?error,
        bpf_program = %record.name_any(),
        "sweep failed"
    );
    Action::requeue(RETRY_DURATION)
}

/// Remembers the node's labels so only label changes trigger a pass
///
/// The node object changes constantly (heartbeats, conditions); only its
/// labels affect selection.
#[derive(Debug, Default)]
pub struct NodeLabelFilter {
    last: Mutex<Option<BTreeMap<String, String>>>,
}

impl NodeLabelFilter {
    /// Returns true if the labels differ from the last call's
    pub fn changed(&self, node: &Node) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_ref() == Some(node.labels()) {
            return false;
        }
        *last = Some(node.labels().clone());
        true
    }
}

/// Label selector for one kind's BpfPrograms on one node
pub fn record_selector(node_name: &str, kind: &str) -> String {
    format!("{NODE_LABEL}={node_name},{PROGRAM_TYPE_LABEL}={kind}")
}

/// Build the program and sweep controllers for one kind
pub fn build_kind_controllers<K: ProgramKind>(
    client: Client,
    daemon: Arc<dyn BpfdDaemon>,
    node_name: &str,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(Context::<K>::builder(client.clone(), daemon, node_name).build());
    let kind = K::PROGRAM_TYPE.as_str();

    let programs: Api<K::Resource> = Api::all(client.clone());
    let records: Api<BpfProgram> = Api::all(client.clone());
    let nodes: Api<Node> = Api::all(client);

    let program_ctrl = Controller::new(
        programs,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let reader = program_ctrl.store();
    let filter = Arc::new(NodeLabelFilter::default());

    let program_ctrl: ControllerFuture = Box::pin(
        program_ctrl
            .owns(
                records.clone(),
                WatcherConfig::default()
                    .labels(&format!("{NODE_LABEL}={node_name}"))
                    .timeout(WATCH_TIMEOUT_SECS),
            )
            .watches(
                nodes,
                WatcherConfig::default()
                    .fields(&format!("metadata.name={node_name}"))
                    .timeout(WATCH_TIMEOUT_SECS),
                move |node| {
                    if !filter.changed(&node) {
                        return None;
                    }
                    debug!(node = %node.name_any(), "Node labels changed, triggering pass");
                    // Any program will do, the pass covers all of them
                    reader
                        .state()
                        .first()
                        .map(|program| ObjectRef::from_obj(program.as_ref()))
                },
            )
            .with_config(controller::Config::default().concurrency(1))
            .shutdown_on_signal()
            .run(reconcile::<K>, error_policy::<K>, ctx.clone())
            .for_each(log_reconcile_result(kind)),
    );

    let sweep_ctrl: ControllerFuture = Box::pin(
        Controller::new(
            records,
            WatcherConfig::default()
                .labels(&record_selector(node_name, kind))
                .timeout(WATCH_TIMEOUT_SECS),
        )
        .with_config(controller::Config::default().concurrency(1))
        .shutdown_on_signal()
        .run(reconcile_record::<K>, record_error_policy::<K>, ctx)
        .for_each(log_reconcile_result("BpfProgram sweep")),
    );

    info!("- {} controllers", kind);

    vec![program_ctrl, sweep_ctrl]
}

/// Build the controllers for every program kind
pub fn build_controllers(
    client: Client,
    daemon: Arc<dyn BpfdDaemon>,
    node_name: &str,
) -> Vec<ControllerFuture> {
    let mut controllers = Vec::new();
    controllers.extend(build_kind_controllers::<Xdp>(
        client.clone(),
        daemon.clone(),
        node_name,
    ));
    controllers.extend(build_kind_controllers::<Tc>(
        client.clone(),
        daemon.clone(),
        node_name,
    ));
    controllers.extend(build_kind_controllers::<Tracepoint>(
        client, daemon, node_name,
    ));
    controllers
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(std::result::Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with(labels: &[(&str, &str)]) -> Node {
        let mut node = Node::default();
        node.metadata.name = Some("node-a".to_string());
        node.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        node
    }

    #[test]
    fn first_sight_of_the_node_triggers() {
        let filter = NodeLabelFilter::default();
        assert!(filter.changed(&node_with(&[("zone", "east")])));
    }

    #[test]
    fn status_only_updates_do_not_trigger() {
        let filter = NodeLabelFilter::default();
        let node = node_with(&[("zone", "east")]);
        assert!(filter.changed(&node));

        let mut heartbeat = node.clone();
        heartbeat.metadata.resource_version = Some("42".to_string());
        assert!(!filter.changed(&heartbeat));
    }

    #[test]
    fn label_changes_trigger() {
        let filter = NodeLabelFilter::default();
        assert!(filter.changed(&node_with(&[("zone", "east")])));
        assert!(filter.changed(&node_with(&[("zone", "west")])));
        assert!(!filter.changed(&node_with(&[("zone", "west")])));
    }

    #[test]
    fn retry_requeues_and_settled_waits() {
        assert_eq!(PassResult::Retry.into_action(), Action::requeue(RETRY_DURATION));
        assert_eq!(PassResult::Settled.into_action(), Action::await_change());
        assert_eq!(PassResult::Idle.into_action(), Action::await_change());
    }

    #[test]
    fn record_selector_scopes_to_node_and_kind() {
        assert_eq!(
            record_selector("node-a", "tc"),
            "kubernetes.io/hostname=node-a,bpfd.io/programType=tc"
        );
    }
}
