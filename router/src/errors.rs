//! This module defines the [`EndpointError`] a Stream Endpoint may encounter
//! while accepting a session, and how it is reported back over gRPC.

use router_core::RegistryError;
use router_types::MalformedInit;
use tonic::Status;
use tracing::instrument;

/// All errors a Stream Endpoint handler can raise before a session is
/// bound. Once bound, errors are reported through the terminal-reason
/// taxonomy (`router_core::TerminalReason`) instead, since at that point
/// the stream has already been handed back to the caller.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EndpointError {
    #[error("stream closed before any frame was sent")]
    ExpectedInit,
    #[error("first frame was not an Init frame")]
    NotInit,
    #[error(transparent)]
    MalformedInit(#[from] MalformedInit),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("transport error: {0}")]
    Transport(String),
}

impl EndpointError {
    /// The stable reason label used for the `reason` tag on
    /// [`crate::metrics::METRICS_ID_STREAM_REJECTED`].
    pub(crate) fn as_reason(&self) -> &'static str {
        match self {
            EndpointError::ExpectedInit => "expected_init",
            EndpointError::NotInit => "expected_init",
            EndpointError::MalformedInit(_) => "malformed_init",
            EndpointError::Unauthorized(_) => "unauthorized",
            EndpointError::Registry(RegistryError::Duplicate) => "duplicate",
            EndpointError::Registry(RegistryError::KeyMismatch) => "key_mismatch",
            EndpointError::Registry(RegistryError::Overloaded) => "overloaded",
            EndpointError::Transport(_) => "transport_error",
        }
    }

    /// Converts the error into the `tonic::Status` returned to the caller.
    /// Deliberately generic on `Unauthorized`/`Registry` so the response
    /// never reveals registry state to an unauthenticated or mismatched
    /// caller.
    #[instrument(level = "debug", skip_all)]
    pub(crate) fn into_status(self) -> Status {
        tracing::debug!(reason = self.as_reason(), "{self}");
        match self {
            EndpointError::ExpectedInit | EndpointError::NotInit => {
                Status::invalid_argument("expected an Init frame")
            }
            EndpointError::MalformedInit(err) => Status::invalid_argument(err.to_string()),
            EndpointError::Unauthorized(_) => Status::permission_denied("unauthorized"),
            EndpointError::Registry(RegistryError::Duplicate) => {
                Status::already_exists("a half of this role is already attached for this session key")
            }
            EndpointError::Registry(RegistryError::KeyMismatch) => {
                Status::failed_precondition("presented init fields do not match the peer already waiting")
            }
            EndpointError::Registry(RegistryError::Overloaded) => Status::resource_exhausted("registry at capacity"),
            EndpointError::Transport(msg) => Status::unavailable(msg),
        }
    }
}
