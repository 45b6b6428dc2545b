//! The threaded endpoint: same role as the forked endpoint, but the
//! transport is an in-process message port (an mpsc channel pair) to a
//! worker OS thread rather than stdio to a child process (spec §4.5.4).

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};

// Layer 3: Internal module imports
use super::traits::Endpoint;
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::message::frame::bodies::{ActorMessageBody, ActorResponseBody};
use crate::message::frame::{Frame, FrameKind};
use crate::message::marshaller::{prepare_outgoing, MarshallerRegistry};
use crate::transport::{InProcessBus, TransportBus};
use crate::util::{ActorId, MessageIdGenerator};

/// Parent-side half of a threaded endpoint. The worker side runs
/// [`crate::worker::run_threaded_worker`], the thread-local counterpart
/// to the forked/remote worker entry point, blocking on its message
/// port instead of stdio (spec §4.5.4).
pub struct ThreadedEndpoint {
    id: ActorId,
    bus: Arc<InProcessBus>,
    pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
    message_ids: MessageIdGenerator,
    join_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
    crash_rx: Mutex<Option<oneshot::Receiver<()>>>,
    marshallers: Arc<MarshallerRegistry>,
}

impl ThreadedEndpoint {
    /// Pairs this endpoint's bus with one handed to a freshly spawned
    /// worker thread; `run_worker_thread` is the caller-supplied closure
    /// that drives `crate::worker` on the far end. `marshallers` is the
    /// same registry the spawning actor's system uses — a worker thread
    /// shares the process's address space, so unlike the forked/remote
    /// transports there is no separate registry to keep in sync.
    pub fn spawn(
        id: ActorId,
        marshallers: Arc<MarshallerRegistry>,
        run_worker_thread: impl FnOnce(InProcessBus, mpsc::UnboundedReceiver<Frame>) + Send + 'static,
    ) -> Self {
        let (near, far) = InProcessBus::pair();
        let (near_bus, mut near_rx) = near;
        let (far_bus, far_rx) = far;

        let join_handle = std::thread::spawn(move || run_worker_thread(far_bus, far_rx));

        let bus = Arc::new(near_bus);
        let pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>> =
            Arc::new(Mutex::new(std::collections::HashMap::new()));
        let pending_for_task = pending.clone();
        let (crash_tx, crash_rx) = oneshot::channel();

        tokio::spawn(async move {
            while let Some(frame) = near_rx.recv().await {
                if frame.kind == FrameKind::ActorResponse {
                    if let Some(message_id) = frame.id {
                        if let Ok(body) = frame.body_as::<ActorResponseBody>() {
                            if let Some(tx) = pending_for_task.lock().await.remove(&message_id.0) {
                                let _ = tx.send(body.error.map(Err).unwrap_or(Ok(body.response.unwrap_or(Value::Null))));
                            }
                        }
                    }
                }
            }
            let _ = crash_tx.send(());
        });

        Self {
            id,
            bus,
            pending,
            message_ids: MessageIdGenerator::new(),
            join_handle: Mutex::new(Some(join_handle)),
            crash_rx: Mutex::new(Some(crash_rx)),
            marshallers,
        }
    }

    async fn call(&self, topic: &str, args: Vec<Value>, receive: bool) -> Result<Value, ActorError> {
        let message_id = self.message_ids.next();
        let (message, marshalled_type) = prepare_outgoing(&self.marshallers, args)?;
        let body = ActorMessageBody {
            topic: topic.to_string(),
            message,
            receive,
            marshalled_type,
        };
        let frame = Frame::new(FrameKind::ActorMessage)
            .with_id(message_id)
            .with_actor(self.id)
            .with_body(body)
            .map_err(ActorError::SerializationError)?;

        let waiter = if receive {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().await.insert(message_id.0, tx);
            Some(rx)
        } else {
            None
        };

        self.bus.send(frame).await?;

        match waiter {
            None => Ok(Value::Null),
            Some(rx) => rx
                .await
                .map_err(|_| ActorError::TransportError("worker thread exited mid-call".into()))?
                .map_err(ActorError::RemoteError),
        }
    }
}

#[async_trait]
impl Endpoint for ThreadedEndpoint {
    fn id(&self) -> ActorId {
        self.id
    }

    async fn send0(&self, topic: &str, args: Vec<Value>, _self_proxy: &ClientProxy) -> Result<(), ActorError> {
        self.call(topic, args, false).await.map(|_| ())
    }

    async fn send_and_receive0(&self, topic: &str, args: Vec<Value>, _self_proxy: &ClientProxy) -> Result<Value, ActorError> {
        self.call(topic, args, true).await
    }

    async fn destroy0(&self, _self_proxy: &ClientProxy) {
        let _ = self.bus.send(Frame::new(FrameKind::DestroyActor)).await;
        self.bus.close();
        if let Some(handle) = self.join_handle.lock().await.take() {
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }
    }

    fn on_crash(&self) -> oneshot::Receiver<()> {
        self.crash_rx
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .unwrap_or_else(|| oneshot::channel().1)
    }
}
