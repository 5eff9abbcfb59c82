//! Lifecycle Coordinator: drives one bound session from `Bound` to
//! `Closed`, guarantees each half's `close` runs exactly once, reclaims
//! the registry entry, and emits exactly one terminal event.

use std::time::Instant;

use router_types::{SessionFrame, SessionKey, SessionKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::half::Half;
use crate::metrics::{METRICS_ID_SESSIONS_CLOSED, METRICS_ID_SESSION_BYTES, METRICS_ID_SESSION_DURATION};
use crate::registry::SessionRegistry;
use crate::splicer;

/// Why a session ended. Not every variant can be raised by every
/// component (e.g. only the Session Registry raises `Duplicate`), but
/// callers pattern-match a single type end to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalReason {
    /// Both directions closed cleanly.
    Normal,
    /// TTL elapsed with only one half ever present.
    PeerUnmatched,
    /// A second half of the same role tried to attach.
    Duplicate,
    /// Presented init fields didn't match the parked peer's.
    KeyMismatch,
    /// The Auth Adjudicator denied the session.
    Unauthorized,
    /// The registry was at capacity.
    Overloaded,
    /// The `Init` frame's inner fields failed to decode.
    MalformedInit,
    /// The first frame on a stream wasn't classified `Init`.
    ExpectedInit,
    /// A frame violated the per-direction protocol (e.g. a second `Init`).
    ProtocolError,
    /// The underlying transport failed.
    TransportError,
    /// An administrator forcibly evicted the session.
    AdminEvict,
}

impl TerminalReason {
    /// Stable label used as the `reason` tag on metrics and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::Normal => "normal",
            TerminalReason::PeerUnmatched => "peer_unmatched",
            TerminalReason::Duplicate => "duplicate",
            TerminalReason::KeyMismatch => "key_mismatch",
            TerminalReason::Unauthorized => "unauthorized",
            TerminalReason::Overloaded => "overloaded",
            TerminalReason::MalformedInit => "malformed_init",
            TerminalReason::ExpectedInit => "expected_init",
            TerminalReason::ProtocolError => "protocol_error",
            TerminalReason::TransportError => "transport_error",
            TerminalReason::AdminEvict => "admin_evict",
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one terminal event a session emits on its way to `Closed`.
#[derive(Clone, Debug)]
pub struct TerminalEvent {
    /// The session's key.
    pub session_key: SessionKey,
    /// The session's kind.
    pub kind: SessionKind,
    /// Wall-clock time from the session's first half attaching to
    /// `Closed`.
    pub duration: std::time::Duration,
    /// Bytes forwarded client-to-agent.
    pub bytes_a_to_b: u64,
    /// Bytes forwarded agent-to-client.
    pub bytes_b_to_a: u64,
    /// Why the session ended.
    pub reason: TerminalReason,
}

/// Sink for terminal events. The default impl pairs a `metrics::counter!`
/// with a structured `tracing::info!` line rather than standing up a
/// separate event bus. `osmo-router-test` substitutes a channel-based sink
/// to assert on terminal reasons.
pub trait TerminalEventSink: Send + Sync {
    /// Records one terminal event.
    fn record(&self, event: TerminalEvent);
}

/// The production [`TerminalEventSink`]: metrics + structured logging.
pub struct MetricsTerminalEventSink;

impl TerminalEventSink for MetricsTerminalEventSink {
    fn record(&self, event: TerminalEvent) {
        metrics::counter!(METRICS_ID_SESSIONS_CLOSED, "reason" => event.reason.as_str()).increment(1);
        metrics::histogram!(METRICS_ID_SESSION_DURATION).record(event.duration.as_secs_f64());
        metrics::histogram!(METRICS_ID_SESSION_BYTES, "direction" => "a_to_b").record(event.bytes_a_to_b as f64);
        metrics::histogram!(METRICS_ID_SESSION_BYTES, "direction" => "b_to_a").record(event.bytes_b_to_a as f64);
        info!(
            session_key = %event.session_key,
            kind = %event.kind,
            duration_ms = event.duration.as_millis() as u64,
            bytes_a_to_b = event.bytes_a_to_b,
            bytes_b_to_a = event.bytes_b_to_a,
            reason = event.reason.as_str(),
            "session closed"
        );
    }
}

/// Drives a freshly-bound session to completion: runs the Splicer,
/// reclaims the registry entry, and records exactly one terminal event.
/// Intended to be spawned as its own task by whichever Stream Endpoint
/// handler received `AttachOutcome::Spliced`.
pub async fn run<Req, Resp>(
    key: SessionKey,
    kind: SessionKind,
    client: Half<Req, Resp>,
    agent: Half<Resp, Req>,
    registry: &SessionRegistry<Req, Resp>,
    cancel: CancellationToken,
    sink: &dyn TerminalEventSink,
) where
    Req: SessionFrame,
    Resp: SessionFrame,
{
    let started = Instant::now();
    let outcome = splicer::splice(client, agent, cancel).await;
    registry.finish(&key);
    sink.record(TerminalEvent {
        session_key: key,
        kind,
        duration: started.elapsed(),
        bytes_a_to_b: outcome.bytes_a_to_b,
        bytes_b_to_a: outcome.bytes_b_to_a,
        reason: outcome.reason,
    });
}
