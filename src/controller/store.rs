//! Kubernetes access for the reconciliation driver
//!
//! The driver talks to the API server only through [`ProgramStore`] and
//! [`SpecSource`], so tests can run whole passes against an in-memory store.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::core::ClusterResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::crd::{BpfProgram, NODE_LABEL, PROGRAM_TYPE_LABEL};
use crate::daemon::ProgramType;
use crate::Result;

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "bpfd-agent";

/// Node and BpfProgram operations used by the driver
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProgramStore: Send + Sync {
    /// Get the node the agent runs on
    async fn get_node(&self, name: &str) -> Result<Node>;

    /// List BpfPrograms of one type belonging to a node
    async fn list_bpf_programs(
        &self,
        node: &str,
        program_type: ProgramType,
    ) -> Result<Vec<BpfProgram>>;

    /// Get a BpfProgram by name, `None` if it does not exist
    async fn get_bpf_program(&self, name: &str) -> Result<Option<BpfProgram>>;

    /// Create a BpfProgram
    async fn create_bpf_program(&self, program: &BpfProgram) -> Result<BpfProgram>;

    /// Replace a BpfProgram's metadata and spec
    ///
    /// Fails with a conflict if the resource version is stale.
    async fn replace_bpf_program(&self, program: &BpfProgram) -> Result<BpfProgram>;

    /// Write a BpfProgram's status
    ///
    /// Fails with a conflict if the resource version is stale.
    async fn replace_bpf_program_status(&self, program: &BpfProgram) -> Result<BpfProgram>;
}

/// Read access to the program resources of one kind
#[async_trait]
pub trait SpecSource<R>: Send + Sync {
    /// List every program resource
    async fn list_programs(&self) -> Result<Vec<R>>;

    /// Get a program resource by name, `None` if it does not exist
    async fn get_program(&self, name: &str) -> Result<Option<R>>;
}

/// [`ProgramStore`] and [`SpecSource`] backed by the API server
#[derive(Clone)]
pub struct KubeProgramStore {
    client: Client,
}

impl KubeProgramStore {
    /// Create a store wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProgramStore for KubeProgramStore {
    async fn get_node(&self, name: &str) -> Result<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn list_bpf_programs(
        &self,
        node: &str,
        program_type: ProgramType,
    ) -> Result<Vec<BpfProgram>> {
        let api: Api<BpfProgram> = Api::all(self.client.clone());
        let selector = format!(
            "{}={},{}={}",
            NODE_LABEL,
            node,
            PROGRAM_TYPE_LABEL,
            program_type.as_str()
        );
        let list = api.list(&ListParams::default().labels(&selector)).await?;
        Ok(list.items)
    }

    async fn get_bpf_program(&self, name: &str) -> Result<Option<BpfProgram>> {
        let api: Api<BpfProgram> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn create_bpf_program(&self, program: &BpfProgram) -> Result<BpfProgram> {
        let api: Api<BpfProgram> = Api::all(self.client.clone());
        debug!(bpf_program = %program.name_any(), "Creating BpfProgram");
        Ok(api.create(&PostParams::default(), program).await?)
    }

    async fn replace_bpf_program(&self, program: &BpfProgram) -> Result<BpfProgram> {
        let api: Api<BpfProgram> = Api::all(self.client.clone());
        Ok(api
            .replace(&program.name_any(), &PostParams::default(), program)
            .await?)
    }

    async fn replace_bpf_program_status(&self, program: &BpfProgram) -> Result<BpfProgram> {
        let api: Api<BpfProgram> = Api::all(self.client.clone());

        // resourceVersion in a merge patch makes the write conditional
        let status_patch = serde_json::json!({
            "metadata": { "resourceVersion": program.resource_version() },
            "status": program.status,
        });

        Ok(api
            .patch_status(
                &program.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&status_patch),
            )
            .await?)
    }
}

#[async_trait]
impl<R> SpecSource<R> for KubeProgramStore
where
    R: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn list_programs(&self) -> Result<Vec<R>> {
        let api: Api<R> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_program(&self, name: &str) -> Result<Option<R>> {
        let api: Api<R> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }
}
