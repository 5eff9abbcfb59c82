//! Adapts a tonic bidirectional stream onto `router_core::{RawReceiver,
//! RawSender}`, so a `Half` can be built from the `Streaming<F>` /
//! `mpsc::Sender<Result<F, Status>>` pair every generated RPC method
//! hands us.

use async_trait::async_trait;
use router_core::{HalfError, RawReceiver, RawSender};
use router_types::SessionFrame;
use tokio::sync::mpsc;
use tonic::{Status, Streaming};

/// Wraps the inbound half of a tonic stream.
pub(crate) struct TonicReceiver<F> {
    inner: Streaming<F>,
}

impl<F> TonicReceiver<F> {
    pub(crate) fn new(inner: Streaming<F>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<F: SessionFrame> RawReceiver<F> for TonicReceiver<F> {
    async fn recv(&mut self) -> Result<Option<F>, HalfError> {
        self.inner.message().await.map_err(|status| HalfError::Transport(status.to_string()))
    }
}

/// Wraps the outbound half of a tonic stream: the `mpsc::Sender` backing
/// the `ReceiverStream` returned to the caller.
pub(crate) struct TonicSender<F> {
    inner: mpsc::Sender<Result<F, Status>>,
}

impl<F> TonicSender<F> {
    pub(crate) fn new(inner: mpsc::Sender<Result<F, Status>>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<F: SessionFrame> RawSender<F> for TonicSender<F> {
    async fn send(&mut self, frame: F) -> Result<(), HalfError> {
        self.inner
            .send(Ok(frame))
            .await
            .map_err(|_| HalfError::Transport("receiver dropped".into()))
    }
}
