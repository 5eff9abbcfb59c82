//! Transport-agnostic halves.
//!
//! A [`Half`] bundles the receive side of one frame type with the send
//! side of its counterpart: a transient ownership wrapper around one
//! direction of a bidirectional transport. The `osmo-router` crate adapts
//! tonic's `Streaming`/response-channel pair into
//! [`RawReceiver`]/[`RawSender`] impls; `osmo-router-test` does the same
//! over a plain `tokio::sync::mpsc` pair so the Splicer and registry are
//! exercised without a live gRPC connection.

use std::sync::Arc;

use async_trait::async_trait;
use router_types::{CloseInfo, SessionFrame};
use tokio::sync::Mutex;

/// Failure reading or writing a [`Half`].
#[derive(Debug, thiserror::Error)]
pub enum HalfError {
    /// The underlying transport reported a terminal error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// The receive side of one transport direction.
#[async_trait]
pub trait RawReceiver<F>: Send {
    /// Reads the next frame. `Ok(None)` is a clean EOF.
    async fn recv(&mut self) -> Result<Option<F>, HalfError>;
}

/// The send side of one transport direction.
#[async_trait]
pub trait RawSender<F>: Send {
    /// Writes one frame, applying backpressure if the peer is slow.
    async fn send(&mut self, frame: F) -> Result<(), HalfError>;
}

struct SenderInner<F> {
    raw: Box<dyn RawSender<F>>,
    closed: bool,
}

/// Send side of a [`Half`]. Cheaply `Clone`-able; every clone shares the
/// same underlying sender and the same close-once guard, since `send` and
/// `close` must be serialized per half: the Splicer's forwarding loop and
/// the Lifecycle Coordinator's close path can both reach for the same
/// half concurrently.
pub struct HalfSender<F> {
    inner: Arc<Mutex<SenderInner<F>>>,
}

impl<F> Clone for HalfSender<F> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<F: SessionFrame> HalfSender<F> {
    /// Wraps a raw sender.
    pub fn new(raw: Box<dyn RawSender<F>>) -> Self {
        Self { inner: Arc::new(Mutex::new(SenderInner { raw, closed: false })) }
    }

    /// Forwards `frame`. A no-op once [`close`](Self::close) has run for
    /// this half.
    pub async fn send(&self, frame: F) -> Result<(), HalfError> {
        let mut guard = self.inner.lock().await;
        if guard.closed {
            return Ok(());
        }
        guard.raw.send(frame).await
    }

    /// Sends a `Close` frame carrying `info`, exactly once no matter how
    /// many callers race to close the same half.
    pub async fn close(&self, info: CloseInfo) {
        let mut guard = self.inner.lock().await;
        if guard.closed {
            return;
        }
        guard.closed = true;
        let _ = guard.raw.send(F::close_frame(info)).await;
    }
}

/// Receive side of a [`Half`]. Never shared: the receive side needs no
/// mutex because there is exactly one reader per half.
pub struct HalfReceiver<F> {
    raw: Box<dyn RawReceiver<F>>,
}

impl<F: SessionFrame> HalfReceiver<F> {
    /// Wraps a raw receiver.
    pub fn new(raw: Box<dyn RawReceiver<F>>) -> Self {
        Self { raw }
    }

    /// Reads the next frame.
    pub async fn recv(&mut self) -> Result<Option<F>, HalfError> {
        self.raw.recv().await
    }
}

/// One side of a Session. `Recv` is the frame type this half reads from
/// its own peer; `Send` is the frame type it writes toward the opposite
/// peer. For an `exec` client half `Recv = ExecRequest`, `Send =
/// ExecResponse`; the paired agent half has those reversed, which is how
/// the Splicer forwards a frame unchanged instead of transcoding between
/// the two — a deliberate asymmetry that keeps forwarding allocation-free.
pub struct Half<Recv: SessionFrame, Send: SessionFrame> {
    /// Where this half's incoming frames come from.
    pub recv: HalfReceiver<Recv>,
    /// Where this half's outgoing frames go.
    pub send: HalfSender<Send>,
}

impl<Recv: SessionFrame, Send: SessionFrame> Half<Recv, Send> {
    /// Builds a half from its raw transport adapters.
    pub fn new(recv: Box<dyn RawReceiver<Recv>>, send: Box<dyn RawSender<Send>>) -> Self {
        Self { recv: HalfReceiver::new(recv), send: HalfSender::new(send) }
    }

    /// Closes this half's send side with `info`. See [`HalfSender::close`].
    pub async fn close(&self, info: CloseInfo) {
        self.send.close(info).await;
    }
}
