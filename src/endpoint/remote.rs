//! The remote endpoint: inter-host, bridged over TCP (spec §4.5.3).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_util::codec::Framed;
use tracing::warn;

// Layer 3: Internal module imports
use super::traits::{Endpoint, EndpointContext};
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::message::frame::bodies::{ActorCreatedBody, ActorMessageBody, ActorResponseBody, CreateActorBody, DefinitionFormat, ParentRef};
use crate::message::frame::{Frame, FrameKind};
use crate::message::marshaller::{prepare_outgoing, MarshallerRegistry};
use crate::transport::{FrameCodec, TransportBus};
use crate::util::{ActorId, MessageIdGenerator};
use crate::worker::entry::relay_actor_message;

/// Parent-side half of a remote endpoint. Opens a bootstrap connection,
/// then a second connection to the port the worker reports
/// (spec §4.5.3: "Creation").
pub struct RemoteEndpoint {
    id: ActorId,
    bus: Arc<dyn TransportBus>,
    pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
    message_ids: MessageIdGenerator,
    last_frame_at: Arc<AtomicI64>,
    crash_rx: Mutex<Option<oneshot::Receiver<()>>>,
    marshallers: Arc<MarshallerRegistry>,
}

impl RemoteEndpoint {
    pub async fn connect(ctx: EndpointContext, host: &str, port: u16, definition: String, definition_format: DefinitionFormat) -> Result<Self, ActorError> {
        use futures::{SinkExt, StreamExt};

        let bootstrap = TcpStream::connect((host, port)).await.map_err(ActorError::ProcessError)?;
        let mut framed = Framed::new(bootstrap, FrameCodec);

        let parent_id = ctx.parent.as_ref().map(|p| p.id()).unwrap_or(ctx.id);
        let create_body = CreateActorBody {
            id: ctx.id,
            name: ctx.name.clone(),
            definition,
            definition_format,
            actor_config: ctx.config.clone(),
            parent: ParentRef { id: parent_id },
            mode: ctx.config.mode,
            ping_timeout_ms: ctx.config.ping_timeout_ms,
            marshallers: Vec::new(),
            resources: Vec::new(),
            logger_config: None,
            custom_parameters_marshalled_types: Default::default(),
        };
        framed
            .send(Frame::new(FrameKind::CreateActor).with_body(create_body).map_err(ActorError::SerializationError)?)
            .await
            .map_err(|e| ActorError::TransportError(e.to_string()))?;

        let reply = framed
            .next()
            .await
            .ok_or_else(|| ActorError::TransportError("bootstrap connection closed".into()))?
            .map_err(|e| ActorError::TransportError(e.to_string()))?;
        if let Some(message) = reply.error {
            return Err(ActorError::InitError(message));
        }
        let created: ActorCreatedBody = reply.body_as().map_err(ActorError::SerializationError)?;
        let worker_port = created.port.ok_or_else(|| ActorError::InitError("worker did not report a port".into()))?;

        // spec §4.5.3: close the bootstrap socket, open a fresh connection.
        drop(framed);
        let stream = TcpStream::connect((host, worker_port)).await.map_err(ActorError::ProcessError)?;
        let framed = Framed::new(stream, FrameCodec);
        let (write_half, read_half) = framed.split();

        let pending = Arc::new(Mutex::new(std::collections::HashMap::new()));
        let last_frame_at = Arc::new(AtomicI64::new(Utc::now().timestamp_millis()));
        let (crash_tx, crash_rx) = oneshot::channel();
        let crash_signal = Arc::new(std::sync::Mutex::new(Some(crash_tx)));
        let exit = Arc::new(tokio::sync::Notify::new());
        let bus: Arc<dyn TransportBus> = Arc::new(crate::transport::FramedBus::new(write_half, exit));
        spawn_reader_task(read_half, pending.clone(), last_frame_at.clone(), crash_signal.clone(), bus.clone(), ctx.parent.clone());

        let ping_timeout = Duration::from_millis(ctx.config.ping_timeout_ms);
        let liveness_signal = crash_signal.clone();
        tokio::spawn(run_liveness_monitor(last_frame_at.clone(), ping_timeout, move || {
            if let Ok(mut guard) = liveness_signal.lock() {
                if let Some(tx) = guard.take() {
                    let _ = tx.send(());
                }
            }
        }));

        Ok(Self {
            id: created.id,
            bus,
            pending,
            message_ids: MessageIdGenerator::new(),
            last_frame_at,
            crash_rx: Mutex::new(Some(crash_rx)),
            marshallers: ctx.system.marshallers(),
        })
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
                .map_err(|_| ActorError::TransportError("connection closed mid-call".into()))?
                .map_err(ActorError::RemoteError),
        }
    }
}

/// Drives the parent side of a remote child's TCP frame stream:
/// correlates `actor-response` frames against this endpoint's own
/// outbound calls, tracks liveness, and relays inbound `actor-message`
/// frames — the child forwarding to its parent (spec §4.5.5) — into
/// `parent_proxy`, replying over `bus`.
fn spawn_reader_task(
    mut read_half: futures::stream::SplitStream<Framed<TcpStream, FrameCodec>>,
    pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
    last_frame_at: Arc<AtomicI64>,
    crash_signal: Arc<std::sync::Mutex<Option<oneshot::Sender<()>>>>,
    bus: Arc<dyn TransportBus>,
    parent_proxy: Option<ClientProxy>,
) {
    tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(frame) = read_half.next().await {
            let Ok(frame) = frame else { break };
            last_frame_at.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
            match frame.kind {
                FrameKind::ActorResponse => {
                    if let Some(id) = frame.id {
                        if let Ok(body) = frame.body_as::<ActorResponseBody>() {
                            if let Some(tx) = pending.lock().await.remove(&id.0) {
                                let _ = tx.send(body.error.map(Err).unwrap_or(Ok(body.response.unwrap_or(Value::Null))));
                            }
                        }
                    }
                }
                FrameKind::ActorMessage => {
                    if let Some(parent_proxy) = &parent_proxy {
                        relay_actor_message(frame, parent_proxy, bus.as_ref()).await;
                    }
                }
                _ => {}
            }
        }
        if let Ok(mut guard) = crash_signal.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
    });
}

/// Background monitor: runs every 1s, declares the peer crashed once
/// `pingTimeout` has elapsed since the last frame received
/// (spec §4.5.3: "Liveness").
pub async fn run_liveness_monitor(last_frame_at: Arc<AtomicI64>, ping_timeout: Duration, on_timeout: impl Fn() + Send + 'static) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        interval.tick().await;
        let idle_ms = Utc::now().timestamp_millis() - last_frame_at.load(Ordering::Relaxed);
        if idle_ms > ping_timeout.as_millis() as i64 {
            warn!(idle_ms, "remote peer exceeded ping timeout");
            on_timeout();
            return;
        }
    }
}

#[async_trait]
impl Endpoint for RemoteEndpoint {
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
    }

    fn on_crash(&self) -> oneshot::Receiver<()> {
        self.crash_rx
            .try_lock()
            .ok()
            .and_then(|mut guard| guard.take())
            .unwrap_or_else(|| oneshot::channel().1)
    }
}
