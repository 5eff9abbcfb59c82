#![deny(missing_docs)]
//! This crate provides the gRPC Stream Endpoints for the OSMO interactive
//! session router, built on top of `osmo-router-core`'s Session Registry,
//! Splicer, and Lifecycle Coordinator.
//!
//! Implementations use [`RouterServiceBuilder`] to wire a [`RouterConfig`]
//! and an [`AuthAdjudicator`](router_core::auth::AuthAdjudicator) into the
//! `ClientService`/`AgentService` pair `osmo-router-server` adds to a
//! `tonic::transport::Server`, plus a `JoinHandle` for the bare TCP
//! readiness probe.
//!
//! Each gRPC method follows the same per-stream flow: read and decode the
//! first frame as `Init`, authorize it, attach to the
//! appropriate per-kind [`SessionRegistry`], and — once two matching halves
//! are present — spawn the Lifecycle Coordinator to splice them. If the
//! hosting application cancels the `CancellationToken` passed to
//! [`RouterServiceBuilder::new`], every registry's sweepers stop and every
//! in-flight session's Splicer loop unwinds, since each session's
//! cancellation token is a child of that root token.

use std::net::SocketAddr;
use std::sync::Arc;

use router_core::auth::AuthAdjudicator;
use router_core::lifecycle::{MetricsTerminalEventSink, TerminalEventSink};
use router_core::SessionRegistry;
use router_types::proto::agent_service_server::AgentServiceServer;
use router_types::proto::client_service_server::ClientServiceServer;
use router_types::proto::{ExecRequest, ExecResponse, PortForwardRequest, PortForwardResponse, RsyncRequest, RsyncResponse};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
mod services;

pub use config::{Environment, RouterConfig};
pub use services::{AgentEndpoint, ClientEndpoint};

/// Shared state behind every RPC handler: one [`SessionRegistry`] per
/// session kind, the adjudicator, and the terminal-event sink.
pub struct RouterState {
    pub(crate) exec: Arc<SessionRegistry<ExecRequest, ExecResponse>>,
    pub(crate) port_forward: Arc<SessionRegistry<PortForwardRequest, PortForwardResponse>>,
    pub(crate) rsync: Arc<SessionRegistry<RsyncRequest, RsyncResponse>>,
    pub(crate) adjudicator: Arc<dyn AuthAdjudicator>,
    pub(crate) sink: Arc<dyn TerminalEventSink>,
    pub(crate) shutdown: CancellationToken,
}

/// Builds the `osmo-router` gRPC services from a [`RouterConfig`] and an
/// [`AuthAdjudicator`]: a short-lived builder that does the one-time setup
/// (registries, metrics descriptions) and hands back long-lived pieces
/// (`Server`-ready tonic services, background task handles) for the
/// hosting binary to drive.
pub struct RouterServiceBuilder {
    state: Arc<RouterState>,
}

impl RouterServiceBuilder {
    /// Initializes the three per-kind registries and registers metric
    /// metadata. `shutdown` is the root cancellation token: every session's
    /// own token is a child of it (see `SessionRegistry::new`), so
    /// cancelling it tears down every in-flight session as well as the
    /// registries' TTL sweepers.
    pub fn new(config: &RouterConfig, adjudicator: Arc<dyn AuthAdjudicator>, shutdown: CancellationToken) -> Self {
        let registry_config = config.registry_config();
        let sink: Arc<dyn TerminalEventSink> = Arc::new(MetricsTerminalEventSink);
        let exec = Arc::new(SessionRegistry::new(registry_config.clone(), shutdown.clone(), Arc::clone(&sink)));
        let port_forward = Arc::new(SessionRegistry::new(registry_config.clone(), shutdown.clone(), Arc::clone(&sink)));
        let rsync = Arc::new(SessionRegistry::new(registry_config, shutdown.clone(), Arc::clone(&sink)));

        router_core::metrics::describe_metrics();
        crate::metrics::describe_metrics();

        Self {
            state: Arc::new(RouterState { exec, port_forward, rsync, adjudicator, sink, shutdown }),
        }
    }

    /// Spawns each registry's TTL sweeper and the readiness probe on
    /// `health_addr`, then returns the two tonic services ready to be added
    /// to a `tonic::transport::Server`, plus the probe's `JoinHandle`.
    pub fn build(self, health_addr: SocketAddr) -> (ClientServiceServer<ClientEndpoint>, AgentServiceServer<AgentEndpoint>, JoinHandle<()>) {
        let sweepers = vec![
            Arc::clone(&self.state.exec).spawn_ttl_sweeper(self.state.shutdown.clone()),
            Arc::clone(&self.state.port_forward).spawn_ttl_sweeper(self.state.shutdown.clone()),
            Arc::clone(&self.state.rsync).spawn_ttl_sweeper(self.state.shutdown.clone()),
        ];
        let health_state = Arc::new(health::HealthState::new(sweepers));
        let health_task = health::spawn(health_addr, health_state, self.state.shutdown.clone());

        let client = ClientServiceServer::new(ClientEndpoint { state: Arc::clone(&self.state) });
        let agent = AgentServiceServer::new(AgentEndpoint { state: Arc::clone(&self.state) });
        (client, agent, health_task)
    }
}
