#![deny(missing_docs)]
//! Wire types for the OSMO interactive session router.
//!
//! This crate groups together everything both the router and its clients
//! need to agree on:
//!
//! * the protobuf schema generated from `proto/session.proto` (see
//!   [`proto`]), covering the `ClientService`/`AgentService` gRPC contract
//!   and the `Init`/`Data`/`Close` frame taxonomy;
//! * strongly-typed identifiers ([`ids`]) used instead of bare `String`s
//!   once a frame has been decoded;
//! * a kind-agnostic [`frame::SessionFrame`] trait implemented for each of
//!   the six generated request/response types, so the router's Splicer and
//!   Stream Endpoints are written once rather than once per session kind.

pub mod frame;
pub mod ids;

/// Generated protobuf/gRPC code for `osmo.router.v1`.
#[allow(clippy::doc_markdown, clippy::large_enum_variant, missing_docs)]
pub mod proto {
    tonic::include_proto!("osmo.router.v1");
}

pub use frame::{Classification, CloseInfo, MalformedInit, SessionFrame};
pub use ids::{
    Cookie, InitFields, KindOptions, PortForwardProtocol, RsyncDirection, SessionKey, SessionKind,
    WorkflowId,
};
