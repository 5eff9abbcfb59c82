//! `AgentService`: the three RPCs a task pod's agent uses to register
//! itself for a session. The stream direction is reversed relative to
//! `ClientService`; symmetric to
//! [`client_endpoint`](super::client_endpoint) with the two halves swapped.

use std::sync::Arc;

use router_core::lifecycle;
use router_core::{Half, SessionRegistry};
use router_types::proto::agent_service_server::AgentService;
use router_types::proto::{ExecRequest, ExecResponse, PortForwardRequest, PortForwardResponse, RsyncRequest, RsyncResponse};
use router_types::{SessionFrame, SessionKind};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use super::drive::drive_stream;
use crate::RouterState;

/// Implements `AgentService` over the shared router state.
pub struct AgentEndpoint {
    pub(crate) state: Arc<RouterState>,
}

/// Spawns the Lifecycle Coordinator for a freshly-spliced agent-role
/// session. Note the client/agent halves arrive reversed relative to
/// [`client_endpoint::spawn_client_session`](super::client_endpoint): `mine`
/// here is the agent half, `other` the client half. `cancel` comes
/// straight from the `Spliced` outcome, so there is no second registry
/// lookup that an evict racing the spawn could turn up empty.
fn spawn_agent_session<Req, Resp>(
    registry: Arc<SessionRegistry<Req, Resp>>,
    sink: Arc<dyn lifecycle::TerminalEventSink>,
    kind: SessionKind,
    key: router_types::SessionKey,
    agent: Half<Resp, Req>,
    client: Half<Req, Resp>,
    cancel: CancellationToken,
) where
    Req: SessionFrame,
    Resp: SessionFrame,
{
    tokio::spawn(async move {
        lifecycle::run(key, kind, client, agent, &registry, cancel, sink.as_ref()).await;
    });
}

#[tonic::async_trait]
impl AgentService for AgentEndpoint {
    type RegisterExecStream = ReceiverStream<Result<ExecRequest, Status>>;
    type RegisterPortForwardStream = ReceiverStream<Result<PortForwardRequest, Status>>;
    type RegisterRsyncStream = ReceiverStream<Result<RsyncRequest, Status>>;

    async fn register_exec(
        &self,
        request: Request<Streaming<ExecResponse>>,
    ) -> Result<Response<Self::RegisterExecStream>, Status> {
        let registry = Arc::clone(&self.state.exec);
        let sink = Arc::clone(&self.state.sink);
        drive_stream(
            SessionKind::Exec,
            "agent",
            request,
            Arc::clone(&self.state.adjudicator),
            {
                let registry = Arc::clone(&registry);
                move |key, half, init| registry.attach_agent(key, half, init)
            },
            move |key, agent, client, cancel| spawn_agent_session(registry, sink, SessionKind::Exec, key, agent, client, cancel),
        )
        .await
    }

    async fn register_port_forward(
        &self,
        request: Request<Streaming<PortForwardResponse>>,
    ) -> Result<Response<Self::RegisterPortForwardStream>, Status> {
        let registry = Arc::clone(&self.state.port_forward);
        let sink = Arc::clone(&self.state.sink);
        drive_stream(
            SessionKind::PortForward,
            "agent",
            request,
            Arc::clone(&self.state.adjudicator),
            {
                let registry = Arc::clone(&registry);
                move |key, half, init| registry.attach_agent(key, half, init)
            },
            move |key, agent, client, cancel| {
                spawn_agent_session(registry, sink, SessionKind::PortForward, key, agent, client, cancel)
            },
        )
        .await
    }

    async fn register_rsync(
        &self,
        request: Request<Streaming<RsyncResponse>>,
    ) -> Result<Response<Self::RegisterRsyncStream>, Status> {
        let registry = Arc::clone(&self.state.rsync);
        let sink = Arc::clone(&self.state.sink);
        drive_stream(
            SessionKind::Rsync,
            "agent",
            request,
            Arc::clone(&self.state.adjudicator),
            {
                let registry = Arc::clone(&registry);
                move |key, half, init| registry.attach_agent(key, half, init)
            },
            move |key, agent, client, cancel| {
                spawn_agent_session(registry, sink, SessionKind::Rsync, key, agent, client, cancel)
            },
        )
        .await
    }
}
