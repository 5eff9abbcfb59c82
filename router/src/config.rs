//! Configuration types and CLI/environment parsing for `osmo-router`.
//!
//! A single `clap::Parser` struct that the hosting binary can flatten:
//! every field is settable by flag or by environment variable, durations
//! are parsed with `humantime`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// The environment the router is running in. Its only job is to gate
/// dev-only behavior (here, running without TLS) behind an explicit, loud
/// opt-in rather than a config default that's easy to leave on by
/// accident.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Environment {
    /// Production environment: TLS is required.
    Prod,
    /// Development environment: TLS may be omitted.
    Dev,
}

impl Environment {
    /// Asserts that `self` is `Dev`. Panics otherwise.
    pub fn assert_is_dev(&self) {
        assert!(matches!(self, Environment::Dev), "Is not dev environment")
    }
}

/// Configuration for the `osmo-router` gRPC server: listen address, TLS
/// material, registry tunables, and HTTP/2 keepalive, all settable via CLI
/// flag or `OSMO_ROUTER_*` environment variable. See `DESIGN.md` for the
/// resolved defaults.
#[derive(Parser, Debug)]
pub struct RouterConfig {
    /// The environment the router is running in (either `prod` or `dev`).
    #[clap(long, env = "OSMO_ROUTER_ENVIRONMENT", default_value = "prod")]
    pub environment: Environment,

    /// Address the gRPC server binds to.
    #[clap(long, env = "OSMO_ROUTER_LISTEN_ADDR", default_value = "0.0.0.0:7443")]
    pub listen_addr: SocketAddr,

    /// Address the bare TCP readiness probe binds to.
    #[clap(long, env = "OSMO_ROUTER_HEALTH_ADDR", default_value = "0.0.0.0:7080")]
    pub health_addr: SocketAddr,

    /// Path to a PEM-encoded TLS certificate chain. Required unless
    /// `environment` is `dev`.
    #[clap(long, env = "OSMO_ROUTER_TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    /// Path to the PEM-encoded private key matching `tls_cert_path`.
    #[clap(long, env = "OSMO_ROUTER_TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,

    /// How long a session may sit `AwaitingPeer` (parked, no matching half
    /// yet) before it is evicted.
    #[clap(
        long,
        env = "OSMO_ROUTER_SESSION_TTL",
        default_value = "60s",
        value_parser = humantime::parse_duration,
    )]
    pub session_ttl: Duration,

    /// How often the background sweep scans the registry for expired
    /// `AwaitingPeer` entries.
    #[clap(
        long,
        env = "OSMO_ROUTER_TTL_CHECK_INTERVAL",
        default_value = "5s",
        value_parser = humantime::parse_duration,
    )]
    pub ttl_check_interval: Duration,

    /// Soft cap on concurrently tracked sessions (parked + bound), per
    /// session kind.
    #[clap(long, env = "OSMO_ROUTER_REGISTRY_CAPACITY", default_value = "10000")]
    pub registry_capacity: usize,

    /// Number of independently-locked registry shards, per session kind.
    /// Defaults to the number of available CPUs.
    #[clap(long, env = "OSMO_ROUTER_SHARD_COUNT")]
    pub shard_count: Option<usize>,

    /// HTTP/2 keepalive ping interval.
    #[clap(
        long,
        env = "OSMO_ROUTER_KEEPALIVE_TIME",
        default_value = "60s",
        value_parser = humantime::parse_duration,
    )]
    pub keepalive_time: Duration,

    /// How long to wait for a keepalive ping response before closing the
    /// connection.
    #[clap(
        long,
        env = "OSMO_ROUTER_KEEPALIVE_TIMEOUT",
        default_value = "20s",
        value_parser = humantime::parse_duration,
    )]
    pub keepalive_timeout: Duration,
}

impl RouterConfig {
    /// Resolves [`Self::shard_count`], falling back to available
    /// parallelism the way `RegistryConfig::default` does.
    pub fn shard_count(&self) -> usize {
        self.shard_count
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4))
    }

    /// Builds a [`router_core::RegistryConfig`] from the shared tunables.
    pub fn registry_config(&self) -> router_core::RegistryConfig {
        router_core::RegistryConfig {
            shard_count: self.shard_count(),
            capacity: self.registry_capacity,
            session_ttl: self.session_ttl,
            ttl_check_interval: self.ttl_check_interval,
        }
    }
}
