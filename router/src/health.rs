//! A bare TCP readiness probe: no gRPC/HTTP framing, just a socket a load
//! balancer's TCP health check can point at. Reports whether the registry
//! background sweep tasks are still alive.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The handles whose liveness gates readiness: one TTL sweeper per session
/// kind. If any of them exited, the backlog of expired `AwaitingPeer`
/// entries will keep growing and the router should be taken out of
/// rotation.
pub struct HealthState {
    sweepers: Vec<JoinHandle<()>>,
}

impl HealthState {
    /// Wraps the sweeper handles to watch.
    pub fn new(sweepers: Vec<JoinHandle<()>>) -> Self {
        Self { sweepers }
    }

    fn is_ready(&self) -> bool {
        self.sweepers.iter().all(|handle| !handle.is_finished())
    }
}

/// Spawns the probe: on every accepted connection, writes `b"ok\n"` or
/// `b"not ready\n"` depending on [`HealthState::is_ready`] and closes it.
pub fn spawn(addr: SocketAddr, state: Arc<HealthState>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!(%err, "health probe failed to bind; readiness checks will fail closed");
                return;
            }
        };
        info!(%addr, "health probe listening");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                accepted = listener.accept() => {
                    let Ok((mut socket, _)) = accepted else { continue };
                    let body: &[u8] = if state.is_ready() { b"ok\n" } else { b"not ready\n" };
                    let _ = socket.write_all(body).await;
                }
            }
        }
    })
}
