//! gRPC client for the bpfd loader API
//!
//! Translates between the agent's domain types and the generated protobuf
//! types, and maps gRPC failures into [`crate::Error`].

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use super::{AttachInfo, BpfdDaemon, BytecodeLocation, LoadRequest, LoadedProgram, ProgramType};
use crate::crd::{ProgramMaps, TcDirection, TcProceedOn, XdpProceedOn};
use crate::proto::{self, list_response::list_result, load_request, load_request_common};
use crate::proto::loader_client::LoaderClient;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Error, Result};

/// Configuration for the daemon client
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// bpfd gRPC endpoint (e.g., "http://localhost:50051")
    pub endpoint: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-request timeout, so a hung daemon cannot stall a reconcile pass
    pub request_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::DEFAULT_BPFD_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// [`BpfdDaemon`] backed by a tonic channel
#[derive(Clone)]
pub struct GrpcDaemon {
    client: LoaderClient<Channel>,
}

impl GrpcDaemon {
    /// Wrap an established channel
    pub fn new(channel: Channel) -> Self {
        Self {
            client: LoaderClient::new(channel),
        }
    }

    /// Connect to bpfd, retrying while the daemon is still starting up
    pub async fn connect(config: &DaemonConfig, retry: &RetryConfig) -> Result<Self> {
        let endpoint = Endpoint::from_shared(config.endpoint.clone())
            .map_err(|e| Error::validation(format!("invalid bpfd endpoint: {e}")))?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);

        info!(endpoint = %config.endpoint, "Connecting to bpfd");
        let channel = retry_with_backoff(retry, "connect_bpfd", || endpoint.connect()).await?;
        info!(endpoint = %config.endpoint, "Connected to bpfd");

        Ok(Self::new(channel))
    }
}

#[async_trait]
impl BpfdDaemon for GrpcDaemon {
    async fn list(&self, program_type: ProgramType) -> Result<Vec<LoadedProgram>> {
        let request = proto::ListRequest {
            program_type: Some(program_type.as_u32()),
        };
        let response = self
            .client
            .clone()
            .list(request)
            .await
            .map_err(|s| Error::from_status("list", &s))?;

        let programs: Vec<LoadedProgram> = response
            .into_inner()
            .results
            .into_iter()
            .map(loaded_from_proto)
            .collect();
        debug!(%program_type, count = programs.len(), "Listed loaded programs");
        Ok(programs)
    }

    async fn load(&self, request: &LoadRequest) -> Result<ProgramMaps> {
        debug!(id = %request.id, program_type = %request.program_type, "Loading program");
        let response = self
            .client
            .clone()
            .load(load_request_to_proto(request))
            .await
            .map_err(|s| Error::from_status("load", &s))?;

        Ok(response.into_inner().maps.into_iter().collect())
    }

    async fn unload(&self, id: &str) -> Result<()> {
        debug!(%id, "Unloading program");
        self.client
            .clone()
            .unload(proto::UnloadRequest { id: id.to_string() })
            .await
            .map_err(|s| Error::from_status("unload", &s))?;
        Ok(())
    }
}

// =============================================================================
// Domain -> protobuf
// =============================================================================

fn load_request_to_proto(request: &LoadRequest) -> proto::LoadRequest {
    let location = match &request.location {
        BytecodeLocation::Image { url, pull_policy } => {
            load_request_common::Location::Image(proto::BytecodeImage {
                url: url.clone(),
                image_pull_policy: pull_policy.as_i32(),
            })
        }
        BytecodeLocation::File(path) => load_request_common::Location::File(path.clone()),
    };

    let attach_info = match &request.attach {
        AttachInfo::Xdp {
            priority,
            iface,
            proceed_on,
        } => load_request::AttachInfo::XdpAttachInfo(proto::XdpAttachInfo {
            priority: *priority,
            iface: iface.clone(),
            position: 0,
            proceed_on: proceed_on.iter().map(|p| p.code()).collect(),
        }),
        AttachInfo::Tc {
            priority,
            iface,
            direction,
            proceed_on,
        } => load_request::AttachInfo::TcAttachInfo(proto::TcAttachInfo {
            priority: *priority,
            iface: iface.clone(),
            position: 0,
            direction: direction.wire_name().unwrap_or_default().to_string(),
            proceed_on: proceed_on.iter().map(|p| p.code()).collect(),
        }),
        AttachInfo::Tracepoint { name } => {
            load_request::AttachInfo::TracepointAttachInfo(proto::TracepointAttachInfo {
                tracepoint: name.clone(),
            })
        }
    };

    proto::LoadRequest {
        common: Some(proto::LoadRequestCommon {
            location: Some(location),
            section_name: request.section_name.clone(),
            program_type: request.program_type.as_u32(),
            id: request.id.clone(),
            global_data: request
                .global_data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }),
        attach_info: Some(attach_info),
    }
}

// =============================================================================
// Protobuf -> domain
// =============================================================================

fn loaded_from_proto(result: proto::list_response::ListResult) -> LoadedProgram {
    let attach = match result.attach_info {
        Some(info) => attach_from_proto(info),
        None => None,
    };
    if attach.is_none() {
        warn!(id = %result.id, "bpfd reported attach info the agent cannot interpret");
    }

    LoadedProgram {
        id: result.id,
        attach,
        maps: result.maps.into_iter().collect(),
    }
}

/// Convert reported attach info. Any code or direction outside the known
/// tables yields `None` so the program is treated as drifted.
fn attach_from_proto(info: list_result::AttachInfo) -> Option<AttachInfo> {
    match info {
        list_result::AttachInfo::XdpAttachInfo(xdp) => Some(AttachInfo::Xdp {
            priority: xdp.priority,
            iface: xdp.iface,
            proceed_on: xdp
                .proceed_on
                .into_iter()
                .map(XdpProceedOn::from_code)
                .collect::<Option<Vec<_>>>()?,
        }),
        list_result::AttachInfo::TcAttachInfo(tc) => Some(AttachInfo::Tc {
            priority: tc.priority,
            iface: tc.iface,
            direction: TcDirection::from_wire(&tc.direction)?,
            proceed_on: tc
                .proceed_on
                .into_iter()
                .map(TcProceedOn::from_code)
                .collect::<Option<Vec<_>>>()?,
        }),
        list_result::AttachInfo::TracepointAttachInfo(tp) => Some(AttachInfo::Tracepoint {
            name: tp.tracepoint,
        }),
    }
}
