//! Shared setup for the kind integration tests

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::{Client, CustomResourceExt, ResourceExt};

use bpfd_agent::controller::InterfaceDiscovery;
use bpfd_agent::crd::{BpfProgram, ProgramMaps, TcProgram, TracepointProgram, XdpProgram};
use bpfd_agent::daemon::{BpfdDaemon, LoadRequest, LoadedProgram, ProgramType};

/// Connect to the current cluster and make sure the agent's CRDs exist
pub async fn ensure_test_cluster() -> Result<Client, Box<dyn std::error::Error>> {
    let client = Client::try_default().await?;
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("bpfd-agent-tests").force();

    for crd in [
        XdpProgram::crd(),
        TcProgram::crd(),
        TracepointProgram::crd(),
        BpfProgram::crd(),
    ] {
        crds.patch(&crd.name_any(), &params, &Patch::Apply(&crd))
            .await?;
    }

    // Give the API server a moment to serve the new types
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(client)
}

/// Name of a node in the test cluster
pub async fn first_node_name(client: &Client) -> String {
    let nodes: Api<Node> = Api::all(client.clone());
    nodes
        .list(&ListParams::default())
        .await
        .expect("failed to list nodes")
        .items
        .first()
        .expect("cluster has no nodes")
        .name_any()
}

/// Delete a BpfProgram, stripping its finalizers so it cannot linger
pub async fn force_delete_record(client: &Client, name: &str) {
    let api: Api<BpfProgram> = Api::all(client.clone());
    let patch = serde_json::json!({ "metadata": { "finalizers": null } });
    let _ = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await;
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Interface discovery that always names the same interface
///
/// The tests run off-node, so the host's own interfaces mean nothing.
pub struct FixedInterface(pub &'static str);

impl InterfaceDiscovery for FixedInterface {
    fn primary_interface(&self, _node: &Node) -> bpfd_agent::Result<String> {
        Ok(self.0.to_string())
    }
}

/// In-memory stand-in for bpfd
#[derive(Default)]
pub struct FakeDaemon {
    loaded: Mutex<BTreeMap<String, (ProgramType, LoadRequest)>>,
}

impl FakeDaemon {
    /// Ids currently loaded
    pub fn ids(&self) -> Vec<String> {
        self.loaded.lock().unwrap().keys().cloned().collect()
    }

    fn maps_for(id: &str) -> ProgramMaps {
        ProgramMaps::from([("counters".to_string(), format!("/run/bpfd/fs/maps/{id}/counters"))])
    }
}

#[async_trait]
impl BpfdDaemon for FakeDaemon {
    async fn list(&self, program_type: ProgramType) -> bpfd_agent::Result<Vec<LoadedProgram>> {
        Ok(self
            .loaded
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (t, _))| *t == program_type)
            .map(|(id, (_, request))| LoadedProgram {
                id: id.clone(),
                attach: Some(request.attach.clone()),
                maps: Self::maps_for(id),
            })
            .collect())
    }

    async fn load(&self, request: &LoadRequest) -> bpfd_agent::Result<ProgramMaps> {
        self.loaded.lock().unwrap().insert(
            request.id.clone(),
            (request.program_type, request.clone()),
        );
        Ok(Self::maps_for(&request.id))
    }

    async fn unload(&self, id: &str) -> bpfd_agent::Result<()> {
        self.loaded.lock().unwrap().remove(id);
        Ok(())
    }
}
