//! The forked-child endpoint: inter-process, bridged over the child's
//! stdio (spec §4.5.2).

// Layer 1: Standard library imports
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tokio_util::codec::FramedWrite;
use tracing::{debug, warn};

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

/// Environment variable carrying the worker binary path, mirroring how
/// the teacher locates its own CLI entry point without hardcoding it.
pub const WORKER_BINARY_ENV: &str = "TRANSEPT_WORKER_BIN";

/// Parent-side half of a forked-child endpoint.
pub struct ForkedEndpoint {
    id: ActorId,
    child: Mutex<Child>,
    bus: Arc<dyn TransportBus>,
    pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
    message_ids: MessageIdGenerator,
    crash_rx: Mutex<Option<oneshot::Receiver<()>>>,
    marshallers: Arc<MarshallerRegistry>,
}

impl ForkedEndpoint {
    /// Spawns the worker binary, sends `create-actor`, and waits for
    /// `actor-created` (spec §4.5.2: "Parent side").
    pub async fn spawn(ctx: EndpointContext, definition: String, definition_format: DefinitionFormat) -> Result<Self, ActorError> {
        let worker_bin = std::env::var(WORKER_BINARY_ENV).unwrap_or_else(|_| "transept-worker".to_string());

        let mut child = Command::new(worker_bin)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(ActorError::ProcessError)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ActorError::ProcessError(std::io::Error::other("worker stdin was not piped")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ActorError::ProcessError(std::io::Error::other("worker stdout was not piped")))?;

        let mut writer = FramedWrite::new(stdin, FrameCodec);
        let mut reader = tokio_util::codec::FramedRead::new(BufReader::new(stdout), FrameCodec);

        use futures::SinkExt;
        use futures::StreamExt;

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
        let frame = Frame::new(FrameKind::CreateActor)
            .with_body(create_body)
            .map_err(|e| ActorError::TransportError(e.to_string()))?;
        writer
            .send(frame)
            .await
            .map_err(|e| ActorError::TransportError(e.to_string()))?;

        let reply = reader
            .next()
            .await
            .ok_or_else(|| ActorError::TransportError("worker closed before replying".into()))?
            .map_err(|e| ActorError::TransportError(e.to_string()))?;

        if let Some(message) = reply.error {
            return Err(ActorError::InitError(message));
        }
        let created: ActorCreatedBody = reply
            .body_as()
            .map_err(|e| ActorError::TransportError(e.to_string()))?;

        let exit = Arc::new(tokio::sync::Notify::new());
        let (crash_tx, crash_rx) = oneshot::channel();
        let bus: Arc<dyn TransportBus> = Arc::new(crate::transport::FramedBus::new(writer, exit.clone()));

        let pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>> =
            Arc::new(Mutex::new(std::collections::HashMap::new()));
        spawn_reader_task(reader, pending.clone(), bus.clone(), ctx.parent.clone(), exit, crash_tx);

        Ok(Self {
            id: created.id,
            child: Mutex::new(child),
            bus,
            pending,
            message_ids: MessageIdGenerator::new(),
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
            .map_err(|e| ActorError::SerializationError(e))?;

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
                .map_err(|_| ActorError::TransportError("child exited mid-call".into()))?
                .map_err(ActorError::RemoteError),
        }
    }
}

/// Drives the parent side of the child's stdio frame stream: correlates
/// `actor-response` frames against this endpoint's own outbound calls,
/// and relays inbound `actor-message` frames — the child forwarding to
/// its parent (spec §4.5.5) — into `parent_proxy`, replying over `bus`
/// exactly as a worker's own frame pump does on the other end.
fn spawn_reader_task(
    mut reader: tokio_util::codec::FramedRead<BufReader<tokio::process::ChildStdout>, FrameCodec>,
    pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
    bus: Arc<dyn TransportBus>,
    parent_proxy: Option<ClientProxy>,
    exit: Arc<tokio::sync::Notify>,
    crash_tx: oneshot::Sender<()>,
) {
    tokio::spawn(async move {
        use futures::StreamExt;
        while let Some(frame) = reader.next().await {
            let Ok(frame) = frame else { break };
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
        debug!("forked child channel closed");
        exit.notify_waiters();
        let _ = crash_tx.send(());
    });
}

#[async_trait]
impl Endpoint for ForkedEndpoint {
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
        if let Err(e) = self.child.lock().await.start_kill() {
            warn!(error = %e, "failed to kill forked child on destroy");
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

/// Runs a liveness ping loop for a forked endpoint: every `ping_timeout /
/// 3` the child sends `parent-ping`; a failed exchange tears the child's
/// own Actor System down (spec §4.5.2: "Ping").
pub async fn run_parent_ping_loop(bus: Arc<dyn TransportBus>, ping_timeout: Duration) {
    let mut interval = tokio::time::interval(ping_timeout / 3);
    loop {
        interval.tick().await;
        if bus
            .send(Frame::new(FrameKind::ParentPing))
            .await
            .is_err()
        {
            warn!("parent ping failed, assuming parent is dead");
            return;
        }
    }
}
