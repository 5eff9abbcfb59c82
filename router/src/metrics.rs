//! Endpoint-level metrics for `osmo-router`, distinct from the
//! registry/splicer/session metrics `osmo-router-core` already exports.
//! Flat `const` keys plus one `describe_metrics` call site, registered
//! once at startup.

/// Counter: stream-endpoint calls accepted, labeled by `kind` and `role`
/// (`client`/`agent`).
pub const METRICS_ID_STREAM_ACCEPTED: &str = "osmo.router.stream.accepted";
/// Counter: stream-endpoint calls rejected before a session was bound,
/// labeled by `kind`, `role`, and `reason`.
pub const METRICS_ID_STREAM_REJECTED: &str = "osmo.router.stream.rejected";

/// Registers metadata (unit + description) for every metric above.
pub fn describe_metrics() {
    metrics::describe_counter!(
        METRICS_ID_STREAM_ACCEPTED,
        metrics::Unit::Count,
        "Number of stream-endpoint calls that reached a bound or parked session"
    );
    metrics::describe_counter!(
        METRICS_ID_STREAM_REJECTED,
        metrics::Unit::Count,
        "Number of stream-endpoint calls rejected before a session was bound, labeled by reason"
    );
}
