//! The one generic function shared by all six RPC methods, concretized
//! over tonic. `client_endpoint`/`agent_endpoint` supply the role-specific
//! `attach`/`spawn_spliced` closures; everything else — reading Init,
//! authorizing, building the response stream, recording metrics — lives
//! here exactly once.

use std::sync::Arc;

use router_core::auth::{AuthAdjudicator, CallerIdentity};
use router_core::{AttachOutcome, Half};
use router_types::{Classification, CloseInfo, SessionFrame, SessionKey, SessionKind};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use super::raw::{TonicReceiver, TonicSender};
use crate::errors::EndpointError;
use crate::metrics::{METRICS_ID_STREAM_ACCEPTED, METRICS_ID_STREAM_REJECTED};

/// Streams are buffered this deep before the Splicer applies backpressure
/// by stalling its `send`.
const RESPONSE_BUFFER: usize = 16;

/// Reads the caller's bearer token from request metadata, if present.
/// Opaque to the router beyond what the `AuthAdjudicator` does with it;
/// absent a real mTLS/token-exchange layer this is the hook a deployment
/// wires its own authentication through.
pub(crate) fn caller_identity<T>(request: &Request<T>) -> CallerIdentity {
    let token = request
        .metadata()
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim_start_matches("Bearer ").to_owned());
    CallerIdentity(token)
}

/// Accepts one RPC's stream, reads and authorizes `Init`, attaches to the
/// registry via `attach`, and — on `Spliced` — hands both halves to
/// `spawn_spliced` to be driven by the Lifecycle Coordinator. Returns the
/// `Response` stream to hand back to the caller immediately, whether the
/// session parked or spliced.
pub(crate) async fn drive_stream<Mine, Other>(
    kind: SessionKind,
    role: &'static str,
    request: Request<Streaming<Mine>>,
    adjudicator: Arc<dyn AuthAdjudicator>,
    attach: impl FnOnce(SessionKey, Half<Mine, Other>, router_types::InitFields) -> AttachOutcome<Half<Mine, Other>, Half<Other, Mine>>
    + Send
    + 'static,
    spawn_spliced: impl FnOnce(SessionKey, Half<Mine, Other>, Half<Other, Mine>, CancellationToken) + Send + 'static,
) -> Result<Response<ReceiverStream<Result<Other, Status>>>, Status>
where
    Mine: SessionFrame,
    Other: SessionFrame,
{
    let caller = caller_identity(&request);
    accept(kind, role, request.into_inner(), adjudicator, caller, attach, spawn_spliced)
        .await
        .map_err(EndpointError::into_status)
}

async fn accept<Mine, Other>(
    kind: SessionKind,
    role: &'static str,
    mut incoming: Streaming<Mine>,
    adjudicator: Arc<dyn AuthAdjudicator>,
    caller: CallerIdentity,
    attach: impl FnOnce(SessionKey, Half<Mine, Other>, router_types::InitFields) -> AttachOutcome<Half<Mine, Other>, Half<Other, Mine>>
    + Send
    + 'static,
    spawn_spliced: impl FnOnce(SessionKey, Half<Mine, Other>, Half<Other, Mine>, CancellationToken) + Send + 'static,
) -> Result<Response<ReceiverStream<Result<Other, Status>>>, EndpointError>
where
    Mine: SessionFrame,
    Other: SessionFrame,
{
    let first = incoming.message().await.map_err(|status| EndpointError::Transport(status.to_string()))?;
    let first = first.ok_or(EndpointError::ExpectedInit)?;
    if first.classify() != Classification::Init {
        return Err(EndpointError::NotInit);
    }
    let init = first.decode_init()?;

    adjudicator
        .authorize(kind, &init.workflow_id, &init.cookie, &caller)
        .await
        .map_err(|denied| EndpointError::Unauthorized(denied.0))?;

    let (tx, rx) = mpsc::channel::<Result<Other, Status>>(RESPONSE_BUFFER);
    let half = Half::new(Box::new(TonicReceiver::new(incoming)), Box::new(TonicSender::new(tx)));
    let key = init.session_key.clone();

    match attach(key.clone(), half, init) {
        AttachOutcome::Parked => {
            metrics::counter!(METRICS_ID_STREAM_ACCEPTED, "kind" => kind.to_string(), "role" => role).increment(1);
        }
        AttachOutcome::Spliced(mine, other, cancel) => {
            metrics::counter!(METRICS_ID_STREAM_ACCEPTED, "kind" => kind.to_string(), "role" => role).increment(1);
            spawn_spliced(key, mine, other, cancel);
        }
        AttachOutcome::Error(err, mine) => {
            let endpoint_err = EndpointError::from(err);
            metrics::counter!(
                METRICS_ID_STREAM_REJECTED,
                "kind" => kind.to_string(),
                "role" => role,
                "reason" => endpoint_err.as_reason()
            )
            .increment(1);
            mine.close(CloseInfo { reason: Some(endpoint_err.to_string()), ..Default::default() }).await;
            return Err(endpoint_err);
        }
    }

    Ok(Response::new(ReceiverStream::new(rx)))
}
