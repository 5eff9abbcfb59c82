//! `ClientService`: the three RPCs `osmo-ctrl`'s client-facing callers use
//! to open a session. Each method is a thin wrapper around
//! [`drive_stream`](super::drive::drive_stream): decode the role-specific
//! registry/kind, then let the shared machinery do the rest.

use std::sync::Arc;

use router_core::lifecycle;
use router_core::{Half, SessionRegistry};
use router_types::proto::client_service_server::ClientService;
use router_types::proto::{ExecRequest, ExecResponse, PortForwardRequest, PortForwardResponse, RsyncRequest, RsyncResponse};
use router_types::{SessionFrame, SessionKind};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use super::drive::drive_stream;
use crate::RouterState;

/// Implements `ClientService` over the shared router state.
pub struct ClientEndpoint {
    pub(crate) state: Arc<RouterState>,
}

/// Spawns the Lifecycle Coordinator for a freshly-spliced client-role
/// session. `cancel` comes straight from the `Spliced` outcome that
/// produced this pair, so there is no second registry lookup that an
/// evict racing the spawn could turn up empty.
fn spawn_client_session<Req, Resp>(
    registry: Arc<SessionRegistry<Req, Resp>>,
    sink: Arc<dyn lifecycle::TerminalEventSink>,
    kind: SessionKind,
    key: router_types::SessionKey,
    client: Half<Req, Resp>,
    agent: Half<Resp, Req>,
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
impl ClientService for ClientEndpoint {
    type ExecStream = ReceiverStream<Result<ExecResponse, Status>>;
    type PortForwardStream = ReceiverStream<Result<PortForwardResponse, Status>>;
    type RsyncStream = ReceiverStream<Result<RsyncResponse, Status>>;

    async fn exec(&self, request: Request<Streaming<ExecRequest>>) -> Result<Response<Self::ExecStream>, Status> {
        let registry = Arc::clone(&self.state.exec);
        let sink = Arc::clone(&self.state.sink);
        drive_stream(
            SessionKind::Exec,
            "client",
            request,
            Arc::clone(&self.state.adjudicator),
            {
                let registry = Arc::clone(&registry);
                move |key, half, init| registry.attach_client(key, half, init)
            },
            move |key, client, agent, cancel| spawn_client_session(registry, sink, SessionKind::Exec, key, client, agent, cancel),
        )
        .await
    }

    async fn port_forward(
        &self,
        request: Request<Streaming<PortForwardRequest>>,
    ) -> Result<Response<Self::PortForwardStream>, Status> {
        let registry = Arc::clone(&self.state.port_forward);
        let sink = Arc::clone(&self.state.sink);
        drive_stream(
            SessionKind::PortForward,
            "client",
            request,
            Arc::clone(&self.state.adjudicator),
            {
                let registry = Arc::clone(&registry);
                move |key, half, init| registry.attach_client(key, half, init)
            },
            move |key, client, agent, cancel| {
                spawn_client_session(registry, sink, SessionKind::PortForward, key, client, agent, cancel)
            },
        )
        .await
    }

    async fn rsync(&self, request: Request<Streaming<RsyncRequest>>) -> Result<Response<Self::RsyncStream>, Status> {
        let registry = Arc::clone(&self.state.rsync);
        let sink = Arc::clone(&self.state.sink);
        drive_stream(
            SessionKind::Rsync,
            "client",
            request,
            Arc::clone(&self.state.adjudicator),
            {
                let registry = Arc::clone(&registry);
                move |key, half, init| registry.attach_client(key, half, init)
            },
            move |key, client, agent, cancel| {
                spawn_client_session(registry, sink, SessionKind::Rsync, key, client, agent, cancel)
            },
        )
        .await
    }
}
