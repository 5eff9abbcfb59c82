//! `osmo-router-server`: the binary that hosts `osmo-router`'s
//! `ClientService`/`AgentService` behind a `tonic::transport::Server`.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use eyre::Context;
use router::{Environment, RouterConfig, RouterServiceBuilder};
use router_core::auth::{AllowAll, AuthAdjudicator};
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Identity, Server, ServerTlsConfig};

use crate::static_token::StaticTokenAdjudicator;

mod static_token;

/// Top-level CLI: `RouterConfig`'s tunables flattened alongside the
/// options specific to running as a standalone binary (as opposed to
/// embedded in a larger service, which is all `osmo-router` itself cares
/// about).
#[derive(Parser, Debug)]
struct ServerArgs {
    #[clap(flatten)]
    router: RouterConfig,

    /// Path to a JSON manifest of `{workflow_id, cookie}` entries for the
    /// bundled [`StaticTokenAdjudicator`]. Omit only in `dev` environment,
    /// where [`AllowAll`] is used instead.
    #[clap(long, env = "OSMO_ROUTER_STATIC_TOKEN_MANIFEST")]
    static_token_manifest: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = ServerArgs::parse();
    tracing::info!(?args, "starting osmo-router-server");

    match run(args).await {
        Ok(()) => {
            tracing::info!("shut down cleanly");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::error!("{err:?}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(args: ServerArgs) -> eyre::Result<()> {
    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let adjudicator: Arc<dyn AuthAdjudicator> = match &args.static_token_manifest {
        Some(path) => Arc::new(StaticTokenAdjudicator::load(path).context("loading static token manifest")?),
        None => {
            args.router.environment.assert_is_dev();
            tracing::warn!("no --static-token-manifest given; allowing every session (dev only)");
            Arc::new(AllowAll)
        }
    };

    let builder = RouterServiceBuilder::new(&args.router, adjudicator, shutdown.clone());
    let (client_service, agent_service, health_task) = builder.build(args.router.health_addr);

    let mut server = Server::builder();
    let server = match tls_config(&args.router)? {
        Some(tls) => server.tls_config(tls).context("configuring TLS")?,
        None => {
            args.router.environment.assert_is_dev();
            tracing::warn!("no TLS material given; serving plaintext gRPC (dev only)");
            server
        }
    };

    tracing::info!(addr = %args.router.listen_addr, "serving gRPC");
    let serve = server
        .http2_keepalive_interval(Some(args.router.keepalive_time))
        .http2_keepalive_timeout(Some(args.router.keepalive_timeout))
        .add_service(client_service)
        .add_service(agent_service)
        .serve_with_shutdown(args.router.listen_addr, shutdown.cancelled_owned());

    let result = serve.await;
    shutdown.cancel();
    let _ = health_task.await;
    result.context("gRPC server")?;
    Ok(())
}

/// Builds a `ServerTlsConfig` when both a cert and a key path are given,
/// `None` when neither is. A deployment that wants mTLS or a custom root
/// store can swap this out; this binary only covers the common case of a
/// single server identity.
fn tls_config(config: &RouterConfig) -> eyre::Result<Option<ServerTlsConfig>> {
    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let cert = std::fs::read(cert_path).with_context(|| format!("reading {}", cert_path.display()))?;
            let key = std::fs::read(key_path).with_context(|| format!("reading {}", key_path.display()))?;
            Ok(Some(ServerTlsConfig::new().identity(Identity::from_pem(cert, key))))
        }
        (None, None) => Ok(None),
        _ => eyre::bail!("both --tls-cert-path and --tls-key-path must be given together"),
    }
}

/// Waits for SIGINT or SIGTERM and cancels `shutdown`.
async fn wait_for_signal(shutdown: CancellationToken) {
    let mut sigterm = match tokio::signal::unix::signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(err) => {
            tracing::warn!(%err, "failed to install SIGTERM handler");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
    }
    shutdown.cancel();
}
