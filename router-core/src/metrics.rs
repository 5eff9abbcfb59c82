//! Metrics keys emitted by the Session Registry, Splicer, and Lifecycle
//! Coordinator. Flat `const` keys plus one `describe_metrics` call site,
//! registered once at startup.

/// Gauge: sessions currently tracked by the registry, parked or bound.
pub const METRICS_ID_REGISTRY_SESSIONS_OPEN: &str = "osmo.router.sessions.open";
/// Counter: sessions evicted because their TTL elapsed before a peer attached.
pub const METRICS_ID_REGISTRY_SESSIONS_TIMEOUT: &str = "osmo.router.sessions.timeout";
/// Counter: sessions that reached a terminal state, labeled by `reason`.
pub const METRICS_ID_SESSIONS_CLOSED: &str = "osmo.router.sessions.closed";
/// Histogram: wall-clock duration of a session from bind to close.
pub const METRICS_ID_SESSION_DURATION: &str = "osmo.router.session.duration";
/// Histogram: bytes forwarded by the Splicer in one direction of a session.
pub const METRICS_ID_SESSION_BYTES: &str = "osmo.router.session.bytes";

/// Registers metadata (unit + description) for every metric above.
pub fn describe_metrics() {
    metrics::describe_gauge!(
        METRICS_ID_REGISTRY_SESSIONS_OPEN,
        metrics::Unit::Count,
        "Number of sessions currently tracked by the registry (parked or bound)"
    );
    metrics::describe_counter!(
        METRICS_ID_REGISTRY_SESSIONS_TIMEOUT,
        metrics::Unit::Count,
        "Number of sessions evicted because their TTL elapsed before a peer attached"
    );
    metrics::describe_counter!(
        METRICS_ID_SESSIONS_CLOSED,
        metrics::Unit::Count,
        "Number of sessions that reached a terminal state, labeled by reason"
    );
    metrics::describe_histogram!(
        METRICS_ID_SESSION_DURATION,
        metrics::Unit::Seconds,
        "Wall-clock duration of a session from bind to close"
    );
    metrics::describe_histogram!(
        METRICS_ID_SESSION_BYTES,
        metrics::Unit::Bytes,
        "Bytes forwarded by the Splicer in one direction of a session"
    );
}
