//! The Transport Bus (C2): a uniform send/receive interface over every
//! physical channel an endpoint might use (spec §4.2).
//!
//! The spec's three operations (`send`, `on('message')`, `on('exit')`)
//! become, in async Rust: an async `send`, an incoming-frame channel
//! handed out once via [`TransportBus::take_inbox`], and a `closed`
//! future that resolves when the peer channel exits.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

// Layer 3: Internal module imports
use crate::actor::error::ActorError;
use crate::message::Frame;

/// Four implementations exist (spec §4.2): parent↔child process IPC,
/// TCP, worker-thread message port, in-process direct call. All MUST be
/// interchangeable — nothing outside `transport` branches on which is in
/// use.
#[async_trait]
pub trait TransportBus: Send + Sync {
    /// Enqueue or immediately write; resolves once the frame has been
    /// handed to the OS (or, in-process, to the peer's inbox).
    async fn send(&self, frame: Frame) -> Result<(), ActorError>;

    /// Resolves when the peer channel has closed (used to detect
    /// crashes, spec §4.4.5).
    async fn closed(&self);
}

/// A paired, in-process transport bus with no framing: `send` on one
/// end immediately delivers into the other end's inbox. Backs the
/// in-memory endpoint variant and unit tests of remote/forked logic
/// that don't need a real socket.
pub struct InProcessBus {
    outbox: mpsc::UnboundedSender<Frame>,
    exit: Arc<tokio::sync::Notify>,
}

impl InProcessBus {
    /// Build a connected pair: `(near, far)`. Frames sent on `near`
    /// arrive in `far`'s inbox and vice versa.
    pub fn pair() -> ((Self, mpsc::UnboundedReceiver<Frame>), (Self, mpsc::UnboundedReceiver<Frame>)) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let exit = Arc::new(tokio::sync::Notify::new());
        (
            (Self { outbox: tx_b, exit: exit.clone() }, rx_a),
            (Self { outbox: tx_a, exit }, rx_b),
        )
    }

    pub fn close(&self) {
        self.exit.notify_waiters();
    }
}

#[async_trait]
impl TransportBus for InProcessBus {
    async fn send(&self, frame: Frame) -> Result<(), ActorError> {
        self.outbox
            .send(frame)
            .map_err(|_| ActorError::TransportError("peer inbox closed".into()))
    }

    async fn closed(&self) {
        self.exit.notified().await;
    }
}

/// A [`TransportBus`] over any framed byte stream (process stdio pipe or
/// TCP socket), driven by a background task that pumps reads into an
/// inbox channel and writes out through a mutex-guarded sink.
pub struct FramedBus<Sink> {
    sink: Mutex<Sink>,
    exit: Arc<tokio::sync::Notify>,
}

impl<Sink> FramedBus<Sink>
where
    Sink: futures::Sink<Frame, Error = std::io::Error> + Send + Unpin + 'static,
{
    pub fn new(sink: Sink, exit: Arc<tokio::sync::Notify>) -> Self {
        Self {
            sink: Mutex::new(sink),
            exit,
        }
    }
}

#[async_trait]
impl<Sink> TransportBus for FramedBus<Sink>
where
    Sink: futures::Sink<Frame, Error = std::io::Error> + Send + Unpin + 'static,
{
    async fn send(&self, frame: Frame) -> Result<(), ActorError> {
        use futures::SinkExt;
        self.sink
            .lock()
            .await
            .send(frame)
            .await
            .map_err(|e| ActorError::TransportError(e.to_string()))
    }

    async fn closed(&self) {
        self.exit.notified().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::frame::FrameKind;

    #[tokio::test]
    async fn in_process_pair_delivers_to_the_other_side() {
        let ((near, _near_rx), (far, mut far_rx)) = InProcessBus::pair();
        near.send(Frame::new(FrameKind::ParentPing)).await.unwrap();
        let received = far_rx.recv().await.unwrap();
        assert_eq!(received.kind, FrameKind::ParentPing);
        drop(far);
    }

    #[tokio::test]
    async fn closing_one_side_notifies_closed_on_the_other() {
        let ((near, _), (far, _)) = InProcessBus::pair();
        near.close();
        tokio::time::timeout(std::time::Duration::from_millis(100), far.closed())
            .await
            .expect("closed() should resolve once notified");
    }
}
