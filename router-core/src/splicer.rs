//! The bidirectional forwarder. Given two halves `A` and `B`, runs two
//! independent copy loops — `A.recv -> B.send` and `B.recv -> A.send` —
//! each preserving FIFO order within its own direction and applying no
//! ordering between directions.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use router_types::{Classification, CloseInfo, SessionFrame};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::half::{Half, HalfReceiver, HalfSender};
use crate::lifecycle::TerminalReason;

/// Result of running both directions to completion.
pub struct SpliceOutcome {
    /// Why the session ended.
    pub reason: TerminalReason,
    /// Bytes forwarded from `a` to `b`.
    pub bytes_a_to_b: u64,
    /// Bytes forwarded from `b` to `a`.
    pub bytes_b_to_a: u64,
}

/// Runs both forwarding loops to completion, closing both halves exactly
/// once on the way out, and returns why the session ended.
///
/// `cancel` is observed by both loops: server shutdown or a registry
/// eviction trips it, which aborts in-flight forwarding and closes both
/// halves.
#[instrument(level = "debug", skip_all)]
pub async fn splice<A, B>(a: Half<A, B>, b: Half<B, A>, cancel: CancellationToken) -> SpliceOutcome
where
    A: SessionFrame,
    B: SessionFrame,
{
    let Half { recv: a_recv, send: a_send } = a;
    let Half { recv: b_recv, send: b_send } = b;

    let close_a = a_send.clone();
    let close_b = b_send.clone();

    let a_to_b = tokio::spawn(AssertUnwindSafe(direction_loop(a_recv, b_send, cancel.clone())).catch_unwind());
    let b_to_a = tokio::spawn(AssertUnwindSafe(direction_loop(b_recv, a_send, cancel.clone())).catch_unwind());

    let (r1, r2) = tokio::join!(a_to_b, b_to_a);

    let ((reason1, bytes_a_to_b), (reason2, bytes_b_to_a)) = (unwrap_direction(r1), unwrap_direction(r2));

    let info = CloseInfo::default();
    close_a.close(info.clone()).await;
    close_b.close(info).await;

    SpliceOutcome { reason: combine(reason1, reason2), bytes_a_to_b, bytes_b_to_a }
}

fn unwrap_direction(
    result: Result<Result<(TerminalReason, u64), Box<dyn std::any::Any + Send>>, tokio::task::JoinError>,
) -> (TerminalReason, u64) {
    match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => {
            warn!("forwarding loop panicked");
            (TerminalReason::ProtocolError, 0)
        }
        Err(_) => (TerminalReason::ProtocolError, 0),
    }
}

/// `Normal` only if both directions agree; an `AdminEvict`/`ProtocolError`
/// on either side dominates, since either is a deliberate interruption
/// rather than a routine EOF.
fn combine(a: TerminalReason, b: TerminalReason) -> TerminalReason {
    if a == b {
        return a;
    }
    for candidate in [TerminalReason::AdminEvict, TerminalReason::ProtocolError, TerminalReason::TransportError] {
        if a == candidate || b == candidate {
            return candidate;
        }
    }
    TerminalReason::Normal
}

async fn direction_loop<F: SessionFrame>(
    mut recv: HalfReceiver<F>,
    send: HalfSender<F>,
    cancel: CancellationToken,
) -> (TerminalReason, u64) {
    let mut bytes = 0u64;
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (TerminalReason::AdminEvict, bytes),
            frame = recv.recv() => frame,
        };
        match frame {
            Ok(Some(frame)) => match frame.classify() {
                Classification::Init => {
                    warn!("received a second Init after binding");
                    return (TerminalReason::ProtocolError, bytes);
                }
                Classification::Data => {
                    if let Some((payload, _seq)) = frame.as_data() {
                        bytes += payload.len() as u64;
                    }
                    if send.send(frame).await.is_err() {
                        return (TerminalReason::TransportError, bytes);
                    }
                }
                Classification::Close => {
                    // Route through `close()`, not `send()`, so the peer
                    // half is marked closed here. Otherwise splice()'s
                    // unconditional teardown close below would fire a
                    // second, synthetic close frame at the same half.
                    let info = frame.as_close().unwrap_or_default();
                    send.close(info).await;
                    return (TerminalReason::Normal, bytes);
                }
                Classification::Unknown => return (TerminalReason::ProtocolError, bytes),
            },
            Ok(None) => return (TerminalReason::Normal, bytes),
            Err(_) => return (TerminalReason::TransportError, bytes),
        }
    }
}
