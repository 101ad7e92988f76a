//! Shared state for the controllers of one program kind

use std::marker::PhantomData;
use std::sync::Arc;

use kube::Client;
use tokio::sync::{Mutex, MutexGuard};

use super::interfaces::{HostInterfaces, InterfaceDiscovery};
use super::kind::ProgramKind;
use super::store::{KubeProgramStore, ProgramStore, SpecSource};
use crate::daemon::BpfdDaemon;

/// Controller context for one program kind
///
/// Shared by the program controller and the BpfProgram sweep of the same
/// kind. Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::<Xdp>::builder(client, daemon, "node-a").build();
/// ```
pub struct Context<K: ProgramKind> {
    /// Name of the node this agent runs on
    pub node_name: String,
    /// Node and BpfProgram access
    pub store: Arc<dyn ProgramStore>,
    /// Program resources of this kind
    pub programs: Arc<dyn SpecSource<K::Resource>>,
    /// The local bpfd
    pub daemon: Arc<dyn BpfdDaemon>,
    /// Local interface lookup
    pub interfaces: Arc<dyn InterfaceDiscovery>,
    /// Held for the duration of a pass; at most one pass per kind runs at a time
    pass_lock: Mutex<()>,
}

impl<K: ProgramKind> Context<K> {
    /// Create a builder for constructing a Context
    pub fn builder(
        client: Client,
        daemon: Arc<dyn BpfdDaemon>,
        node_name: impl Into<String>,
    ) -> ContextBuilder<K> {
        ContextBuilder::new(client, daemon, node_name.into())
    }

    /// Wait for any running pass of this kind to finish
    pub async fn lock_pass(&self) -> MutexGuard<'_, ()> {
        self.pass_lock.lock().await
    }

    /// Create a context for testing with in-memory collaborators
    #[cfg(test)]
    pub fn for_testing(
        node_name: &str,
        store: Arc<dyn ProgramStore>,
        programs: Arc<dyn SpecSource<K::Resource>>,
        daemon: Arc<dyn BpfdDaemon>,
        interfaces: Arc<dyn InterfaceDiscovery>,
    ) -> Self {
        Self {
            node_name: node_name.to_string(),
            store,
            programs,
            daemon,
            interfaces,
            pass_lock: Mutex::new(()),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder<K: ProgramKind> {
    client: Client,
    daemon: Arc<dyn BpfdDaemon>,
    node_name: String,
    interfaces: Option<Arc<dyn InterfaceDiscovery>>,
    _kind: PhantomData<K>,
}

impl<K: ProgramKind> ContextBuilder<K> {
    fn new(client: Client, daemon: Arc<dyn BpfdDaemon>, node_name: String) -> Self {
        Self {
            client,
            daemon,
            node_name,
            interfaces: None,
            _kind: PhantomData,
        }
    }

    /// Override interface discovery
    ///
    /// Needed wherever the agent does not run on the node it reconciles,
    /// such as integration tests against a remote cluster.
    pub fn interfaces(mut self, interfaces: Arc<dyn InterfaceDiscovery>) -> Self {
        self.interfaces = Some(interfaces);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context<K> {
        let kube = KubeProgramStore::new(self.client);
        Context {
            node_name: self.node_name,
            store: Arc::new(kube.clone()),
            programs: Arc::new(kube),
            daemon: self.daemon,
            interfaces: self
                .interfaces
                .unwrap_or_else(|| Arc::new(HostInterfaces)),
            pass_lock: Mutex::new(()),
        }
    }
}
