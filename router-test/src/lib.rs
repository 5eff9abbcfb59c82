//! Test harness for the OSMO interactive session router: boots a real
//! `osmo-router` gRPC server on an ephemeral loopback port and hands back
//! connected client stubs, rather than mocking out the registry/splicer
//! machinery it's trying to exercise.
//!
//! Everything here talks to the router exactly as a real `osmo-ctrl` agent
//! or CLI client would: over a live tonic channel, using the generated
//! client stubs from `router_types::proto`. Unit-level coverage of the
//! Session Registry's rendezvous/duplicate/mismatch/TTL/capacity semantics
//! already lives in `osmo-router-core`'s own `#[cfg(test)]` modules against
//! an in-memory `Half`; this crate only adds the properties that require a
//! live network stack (wire-tag conformance on the actual transport,
//! end-to-end rendezvous, ordering, backpressure, close propagation,
//! idempotent close).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use router::{RouterConfig, RouterServiceBuilder};
use router_core::auth::{AllowAll, AuthAdjudicator};
use router_types::proto::agent_service_client::AgentServiceClient;
use router_types::proto::client_service_client::ClientServiceClient;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};
use tokio_util::sync::CancellationToken;

/// A running `osmo-router` instance bound to an ephemeral `127.0.0.1` port,
/// plus the shutdown handle that tears it down. Dropping a [`TestRouter`]
/// without calling [`TestRouter::shutdown`] leaves the server task running
/// until the test process exits; tests should shut down explicitly once
/// they're done asserting on terminal state.
pub struct TestRouter {
    /// The address the gRPC server is listening on.
    pub addr: SocketAddr,
    shutdown: CancellationToken,
    server_task: JoinHandle<()>,
    health_task: JoinHandle<()>,
}

/// Knobs a test may want to override from [`RouterConfig`]'s defaults —
/// almost always the TTL, to keep TTL-eviction tests fast.
#[derive(Clone, Debug)]
pub struct TestRouterOptions {
    pub session_ttl: Duration,
    pub ttl_check_interval: Duration,
    pub registry_capacity: usize,
}

impl Default for TestRouterOptions {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(60),
            ttl_check_interval: Duration::from_millis(20),
            registry_capacity: 10_000,
        }
    }
}

impl TestRouter {
    /// Starts a router with default tunables and an [`AllowAll`] adjudicator.
    pub async fn start() -> Self {
        Self::start_with(TestRouterOptions::default(), Arc::new(AllowAll)).await
    }

    /// Starts a router with the given tunables and adjudicator. `clap`'s
    /// `parse_from` gives us `RouterConfig`'s declared defaults without
    /// duplicating them here; only the fields a test cares about are
    /// overridden afterward.
    pub async fn start_with(opts: TestRouterOptions, adjudicator: Arc<dyn AuthAdjudicator>) -> Self {
        let mut config = RouterConfig::parse_from(["osmo-router-test"]);
        config.session_ttl = opts.session_ttl;
        config.ttl_check_interval = opts.ttl_check_interval;
        config.registry_capacity = opts.registry_capacity;

        let shutdown = CancellationToken::new();
        let builder = RouterServiceBuilder::new(&config, adjudicator, shutdown.clone());

        // health.rs binds its own listener; tests don't assert on it, so an
        // ephemeral, never-queried port is fine here.
        let health_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let (client_service, agent_service, health_task) = builder.build(health_addr);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");
        let incoming = TcpListenerStream::new(listener);

        let shutdown_signal = shutdown.clone();
        let server_task = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(client_service)
                .add_service(agent_service)
                .serve_with_incoming_shutdown(incoming, shutdown_signal.cancelled_owned())
                .await;
            if let Err(err) = result {
                tracing::warn!(%err, "test router server task exited with an error");
            }
        });

        // Give the listener a moment to start accepting before the first
        // client connects; avoids a flaky first-dial connection refused.
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self { addr, shutdown, server_task, health_task }
    }

    /// Connects a fresh `ClientService` stub to this router.
    pub async fn client(&self) -> ClientServiceClient<Channel> {
        ClientServiceClient::connect(format!("http://{}", self.addr)).await.expect("connect ClientService")
    }

    /// Connects a fresh `AgentService` stub to this router.
    pub async fn agent(&self) -> AgentServiceClient<Channel> {
        AgentServiceClient::connect(format!("http://{}", self.addr)).await.expect("connect AgentService")
    }

    /// Cancels the shutdown token and waits for the server task to exit.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.server_task.await;
        self.health_task.abort();
    }
}

/// Builds an `ExecInit`-shaped request. Every kind's `Init` message shares
/// the same three string fields; the helpers below repeat this shape for
/// `port_forward` and `rsync`.
pub fn exec_request_init(session_key: &str, cookie: &str, workflow_id: &str) -> router_types::proto::ExecRequest {
    use router_types::proto::{exec_request, ExecInit, ExecRequest};
    ExecRequest {
        payload: Some(exec_request::Payload::Init(ExecInit {
            session_key: session_key.to_owned(),
            cookie: cookie.to_owned(),
            workflow_id: workflow_id.to_owned(),
        })),
    }
}

/// Builds the agent-side counterpart of [`exec_request_init`].
pub fn exec_response_init(session_key: &str, cookie: &str, workflow_id: &str) -> router_types::proto::ExecResponse {
    use router_types::proto::{exec_response, ExecInit, ExecResponse};
    ExecResponse {
        payload: Some(exec_response::Payload::Init(ExecInit {
            session_key: session_key.to_owned(),
            cookie: cookie.to_owned(),
            workflow_id: workflow_id.to_owned(),
        })),
    }
}

/// Builds a `Data` frame for the `exec` request stream.
pub fn exec_request_data(payload: &[u8], seq: u64) -> router_types::proto::ExecRequest {
    use router_types::proto::{exec_request, DataFrame, ExecRequest};
    ExecRequest {
        payload: Some(exec_request::Payload::Data(DataFrame { payload: bytes::Bytes::copy_from_slice(payload), seq })),
    }
}

/// Builds a `Data` frame for the `exec` response stream.
pub fn exec_response_data(payload: &[u8], seq: u64) -> router_types::proto::ExecResponse {
    use router_types::proto::{exec_response, DataFrame, ExecResponse};
    ExecResponse {
        payload: Some(exec_response::Payload::Data(DataFrame { payload: bytes::Bytes::copy_from_slice(payload), seq })),
    }
}

/// Builds an `exec` request `Close` frame.
pub fn exec_request_close(exit_code: i32) -> router_types::proto::ExecRequest {
    use router_types::proto::{exec_request, ExecClose, ExecRequest};
    ExecRequest {
        payload: Some(exec_request::Payload::Close(ExecClose { reason: String::new(), exit_code })),
    }
}

/// Builds an `exec` response `Close` frame.
pub fn exec_response_close(exit_code: i32) -> router_types::proto::ExecResponse {
    use router_types::proto::{exec_response, ExecClose, ExecResponse};
    ExecResponse {
        payload: Some(exec_response::Payload::Close(ExecClose { reason: String::new(), exit_code })),
    }
}

/// Builds a `PortForwardRequest` `Init` frame.
pub fn port_forward_request_init(
    session_key: &str,
    cookie: &str,
    workflow_id: &str,
    protocol: router_types::proto::Protocol,
    remote_port: i32,
) -> router_types::proto::PortForwardRequest {
    use router_types::proto::{port_forward_request, PortForwardInit, PortForwardRequest};
    PortForwardRequest {
        payload: Some(port_forward_request::Payload::Init(PortForwardInit {
            session_key: session_key.to_owned(),
            cookie: cookie.to_owned(),
            workflow_id: workflow_id.to_owned(),
            protocol: protocol as i32,
            remote_port,
        })),
    }
}

/// Builds the agent-side counterpart of [`port_forward_request_init`].
pub fn port_forward_response_init(
    session_key: &str,
    cookie: &str,
    workflow_id: &str,
    protocol: router_types::proto::Protocol,
    remote_port: i32,
) -> router_types::proto::PortForwardResponse {
    use router_types::proto::{port_forward_response, PortForwardInit, PortForwardResponse};
    PortForwardResponse {
        payload: Some(port_forward_response::Payload::Init(PortForwardInit {
            session_key: session_key.to_owned(),
            cookie: cookie.to_owned(),
            workflow_id: workflow_id.to_owned(),
            protocol: protocol as i32,
            remote_port,
        })),
    }
}

/// Builds a `Data` frame for the `port_forward` request stream.
pub fn port_forward_request_data(payload: &[u8], seq: u64) -> router_types::proto::PortForwardRequest {
    use router_types::proto::{port_forward_request, DataFrame, PortForwardRequest};
    PortForwardRequest {
        payload: Some(port_forward_request::Payload::Data(DataFrame {
            payload: bytes::Bytes::copy_from_slice(payload),
            seq,
        })),
    }
}

/// Builds a `Data` frame for the `port_forward` response stream.
pub fn port_forward_response_data(payload: &[u8], seq: u64) -> router_types::proto::PortForwardResponse {
    use router_types::proto::{port_forward_response, DataFrame, PortForwardResponse};
    PortForwardResponse {
        payload: Some(port_forward_response::Payload::Data(DataFrame {
            payload: bytes::Bytes::copy_from_slice(payload),
            seq,
        })),
    }
}

/// Builds a `port_forward` request `Close` frame.
pub fn port_forward_request_close(reason: &str) -> router_types::proto::PortForwardRequest {
    use router_types::proto::{port_forward_request, PortForwardClose, PortForwardRequest};
    PortForwardRequest {
        payload: Some(port_forward_request::Payload::Close(PortForwardClose { reason: reason.to_owned() })),
    }
}

/// Builds a `port_forward` response `Close` frame.
pub fn port_forward_response_close(reason: &str) -> router_types::proto::PortForwardResponse {
    use router_types::proto::{port_forward_response, PortForwardClose, PortForwardResponse};
    PortForwardResponse {
        payload: Some(port_forward_response::Payload::Close(PortForwardClose { reason: reason.to_owned() })),
    }
}

/// Builds an `RsyncRequest` `Init` frame.
pub fn rsync_request_init(session_key: &str, cookie: &str, workflow_id: &str, direction: &str) -> router_types::proto::RsyncRequest {
    use router_types::proto::{rsync_request, RsyncInit, RsyncRequest};
    RsyncRequest {
        payload: Some(rsync_request::Payload::Init(RsyncInit {
            session_key: session_key.to_owned(),
            cookie: cookie.to_owned(),
            workflow_id: workflow_id.to_owned(),
            direction: direction.to_owned(),
        })),
    }
}

/// Builds the agent-side counterpart of [`rsync_request_init`].
pub fn rsync_response_init(session_key: &str, cookie: &str, workflow_id: &str, direction: &str) -> router_types::proto::RsyncResponse {
    use router_types::proto::{rsync_response, RsyncInit, RsyncResponse};
    RsyncResponse {
        payload: Some(rsync_response::Payload::Init(RsyncInit {
            session_key: session_key.to_owned(),
            cookie: cookie.to_owned(),
            workflow_id: workflow_id.to_owned(),
            direction: direction.to_owned(),
        })),
    }
}

/// Builds a `Data` frame for the `rsync` request stream.
pub fn rsync_request_data(payload: &[u8], seq: u64) -> router_types::proto::RsyncRequest {
    use router_types::proto::{rsync_request, DataFrame, RsyncRequest};
    RsyncRequest {
        payload: Some(rsync_request::Payload::Data(DataFrame { payload: bytes::Bytes::copy_from_slice(payload), seq })),
    }
}

/// Builds an `rsync` request `Close` frame.
pub fn rsync_request_close(success: bool) -> router_types::proto::RsyncRequest {
    use router_types::proto::{rsync_request, RsyncClose, RsyncRequest};
    RsyncRequest {
        payload: Some(rsync_request::Payload::Close(RsyncClose { success, reason: String::new() })),
    }
}
