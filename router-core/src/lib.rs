//! Core session logic for the OSMO interactive session router: the Frame
//! Codec, Session Registry, Auth Adjudicator, Splicer, and Lifecycle
//! Coordinator. Nothing in this crate knows about tonic or gRPC, so the
//! registry/splicer/lifecycle machinery is exercised directly by
//! `osmo-router-test` without a live network stack; the `osmo-router`
//! crate is what adapts these pieces onto a tonic server.

pub mod auth;
pub mod codec;
pub mod half;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod splicer;

pub use half::{Half, HalfError, HalfReceiver, HalfSender, RawReceiver, RawSender};
pub use lifecycle::{MetricsTerminalEventSink, TerminalEvent, TerminalEventSink, TerminalReason};
pub use registry::{AttachOutcome, EvictReason, RegistryConfig, RegistryError, SessionRegistry};
