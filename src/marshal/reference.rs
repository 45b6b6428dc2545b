//! The Reference Marshaller (C3): turns a live actor handle into a
//! portable descriptor and back, so a handle forwarded across a process
//! or host boundary still reaches the original actor (spec §4.3).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tokio_util::codec::Framed;
use tracing::debug;

// Layer 3: Internal module imports
use super::descriptor::{inter_process_socket_path, ReferenceDescriptor};
use crate::actor::context::SystemContext;
use crate::actor::core::ActorCore;
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::endpoint::Endpoint;
use crate::message::frame::bodies::{ActorMessageBody, ActorResponseBody};
use crate::message::frame::{Frame, FrameKind};
use crate::message::marshaller::{prepare_incoming, prepare_outgoing, MarshallerRegistry};
use crate::transport::FrameCodec;
use crate::util::{ActorId, MessageIdGenerator};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// A small server bound to a fresh socket/port that speaks the same
/// `actor-message` frames as any other transport (spec §4.3:
/// "marshall(actor)"). Exists for as long as the actor it targets does.
pub struct ReferenceTarget {
    descriptor: ReferenceDescriptor,
    _accept_task: tokio::task::JoinHandle<()>,
}

impl ReferenceTarget {
    /// Binds a UNIX domain socket at the canonical path for `actor_id`
    /// (spec §6.4) and accepts connections that get wired into fresh
    /// [`crate::endpoint::ParentProxyEndpoint`]-style frame relays back
    /// to `proxy`.
    #[cfg(unix)]
    pub async fn bind_inter_process(actor_id: ActorId, proxy: ClientProxy) -> Result<Self, ActorError> {
        let path = inter_process_socket_path(actor_id);
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).map_err(ActorError::ProcessError)?;

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => serve_connection_unix(stream, proxy.clone()),
                    Err(e) => {
                        debug!(error = %e, "reference target accept loop stopped");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            descriptor: ReferenceDescriptor::inter_process(actor_id, path),
            _accept_task: accept_task,
        })
    }

    /// Binds an ephemeral TCP port (spec §6.4: "`0.0.0.0:ephemeral`").
    pub async fn bind_inter_host(actor_id: ActorId, proxy: ClientProxy) -> Result<Self, ActorError> {
        let listener = TcpListener::bind(("0.0.0.0", 0)).await.map_err(ActorError::ProcessError)?;
        let port = listener.local_addr().map_err(ActorError::ProcessError)?.port();

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => serve_connection_tcp(stream, proxy.clone()),
                    Err(e) => {
                        debug!(error = %e, "reference target accept loop stopped");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            descriptor: ReferenceDescriptor::inter_host(actor_id, "0.0.0.0", port),
            _accept_task: accept_task,
        })
    }

    pub fn descriptor(&self) -> ReferenceDescriptor {
        self.descriptor.clone()
    }
}

#[cfg(unix)]
fn serve_connection_unix(stream: UnixStream, proxy: ClientProxy) {
    use crate::message::frame::bodies::{ActorMessageBody, ActorResponseBody};
    use crate::message::frame::{Frame, FrameKind};
    use crate::transport::FrameCodec;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    tokio::spawn(async move {
        let mut framed = Framed::new(stream, FrameCodec);
        while let Some(Ok(frame)) = framed.next().await {
            if frame.kind != FrameKind::ActorMessage {
                continue;
            }
            let Ok(body) = frame.body_as::<ActorMessageBody>() else { continue };
            let args = match prepare_incoming(&proxy.marshallers(), body.message, body.marshalled_type.as_deref()) {
                Ok(args) => args,
                Err(e) => {
                    if body.receive {
                        if let Some(id) = frame.id {
                            let response = ActorResponseBody { response: None, error: Some(e.to_string()) };
                            if let Ok(reply) = Frame::new(FrameKind::ActorResponse).with_id(id).with_body(response) {
                                let _ = framed.send(reply).await;
                            }
                        }
                    }
                    continue;
                }
            };
            let response = if body.receive {
                match proxy.send_and_receive(&body.topic, args).await {
                    Ok(value) => ActorResponseBody { response: Some(value), error: None },
                    Err(e) => ActorResponseBody { response: None, error: Some(e.to_string()) },
                }
            } else {
                let _ = proxy.send(&body.topic, args).await;
                continue;
            };
            if let Some(id) = frame.id {
                if let Ok(reply) = Frame::new(FrameKind::ActorResponse).with_id(id).with_body(response) {
                    let _ = framed.send(reply).await;
                }
            }
        }
    });
}

fn serve_connection_tcp(stream: TcpStream, proxy: ClientProxy) {
    use crate::message::frame::bodies::{ActorMessageBody, ActorResponseBody};
    use crate::message::frame::{Frame, FrameKind};
    use crate::transport::FrameCodec;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;

    tokio::spawn(async move {
        let mut framed = Framed::new(stream, FrameCodec);
        while let Some(Ok(frame)) = framed.next().await {
            if frame.kind != FrameKind::ActorMessage {
                continue;
            }
            let Ok(body) = frame.body_as::<ActorMessageBody>() else { continue };
            let args = match prepare_incoming(&proxy.marshallers(), body.message, body.marshalled_type.as_deref()) {
                Ok(args) => args,
                Err(e) => {
                    if body.receive {
                        if let Some(id) = frame.id {
                            let response = ActorResponseBody { response: None, error: Some(e.to_string()) };
                            if let Ok(reply) = Frame::new(FrameKind::ActorResponse).with_id(id).with_body(response) {
                                let _ = framed.send(reply).await;
                            }
                        }
                    }
                    continue;
                }
            };
            let response = if body.receive {
                match proxy.send_and_receive(&body.topic, args).await {
                    Ok(value) => ActorResponseBody { response: Some(value), error: None },
                    Err(e) => ActorResponseBody { response: None, error: Some(e.to_string()) },
                }
            } else {
                let _ = proxy.send(&body.topic, args).await;
                continue;
            };
            if let Some(id) = frame.id {
                if let Ok(reply) = Frame::new(FrameKind::ActorResponse).with_id(id).with_body(response) {
                    let _ = framed.send(reply).await;
                }
            }
        }
    });
}

/// Owns the per-`actorId` caches of targets and sources for one kind of
/// boundary (inter-process or inter-host). `marshall`/`unmarshall` are
/// idempotent per id (spec §4.3).
#[derive(Default)]
pub struct ReferenceMarshaller {
    targets: DashMap<ActorId, Arc<ReferenceTarget>>,
    sources: DashMap<ActorId, ClientProxy>,
}

impl ReferenceMarshaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent per `actorId`: the first call creates and caches a
    /// [`ReferenceTarget`]; later calls return the cached descriptor.
    pub async fn marshall_inter_host(&self, proxy: &ClientProxy) -> Result<ReferenceDescriptor, ActorError> {
        let id = proxy.id();
        if let Some(target) = self.targets.get(&id) {
            return Ok(target.descriptor());
        }
        let target = Arc::new(ReferenceTarget::bind_inter_host(id, proxy.clone()).await?);
        let descriptor = target.descriptor();
        self.targets.insert(id, target);
        Ok(descriptor)
    }

    /// Idempotent per `actorId`: the first call binds a UNIX domain
    /// socket at the actor's canonical path (spec §6.4); later calls
    /// return the cached descriptor.
    #[cfg(unix)]
    pub async fn marshall_inter_process(&self, proxy: &ClientProxy) -> Result<ReferenceDescriptor, ActorError> {
        let id = proxy.id();
        if let Some(target) = self.targets.get(&id) {
            return Ok(target.descriptor());
        }
        let target = Arc::new(ReferenceTarget::bind_inter_process(id, proxy.clone()).await?);
        let descriptor = target.descriptor();
        self.targets.insert(id, target);
        Ok(descriptor)
    }

    /// Idempotent per `actorId`: the first call dials the descriptor,
    /// wraps the connection in a [`ReferenceSourceEndpoint`], and caches
    /// the resulting [`ClientProxy`]; later calls return the cached one
    /// (spec §4.3: "unmarshall(descriptor) → handle").
    pub async fn unmarshall(&self, descriptor: &ReferenceDescriptor, system: Arc<dyn SystemContext>) -> Result<ClientProxy, ActorError> {
        if let Some(proxy) = self.sources.get(&descriptor.actor_id) {
            return Ok(proxy.clone());
        }

        let marshallers = system.marshallers();
        let endpoint: Arc<dyn Endpoint> = if let Some(path) = &descriptor.path {
            Arc::new(connect_inter_process(descriptor.actor_id, path, marshallers).await?)
        } else {
            let host = descriptor.host.as_deref().unwrap_or("127.0.0.1");
            let port = descriptor.port.ok_or_else(|| ActorError::InitError("inter-host descriptor missing a port".into()))?;
            Arc::new(connect_inter_host(descriptor.actor_id, host, port, marshallers).await?)
        };

        let proxy = ActorCore::from_reference_endpoint(endpoint, format!("ref-{}", descriptor.actor_id), system);
        self.sources.insert(descriptor.actor_id, proxy.clone());
        Ok(proxy)
    }

    /// Closes all targets/sources (spec §4.3: "destroy()").
    pub fn clear(&self) {
        self.targets.clear();
        self.sources.clear();
    }
}

/// The client side of a marshalled reference: a direct connection to a
/// [`ReferenceTarget`], speaking `actor-message`/`actor-response` frames
/// addressed at a single, fixed `actorId` (spec §4.3: "a Reference
/// Source (a client socket), wraps it in a forked-style endpoint").
pub struct ReferenceSourceEndpoint {
    target_id: ActorId,
    bus: Arc<crate::transport::FramedBus<futures::stream::SplitSink<Framed<BoxedStream, FrameCodec>, Frame>>>,
    pending: Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
    message_ids: MessageIdGenerator,
    marshallers: Arc<MarshallerRegistry>,
}

/// A boxed duplex stream so TCP and UNIX-domain connections can share
/// one `ReferenceSourceEndpoint` implementation.
pub type BoxedStream = Box<dyn StreamLike>;

/// The trait object bound `ReferenceSourceEndpoint` needs of its
/// underlying socket; blanket-implemented for anything `Framed` already
/// accepts.
pub trait StreamLike: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> StreamLike for T {}

impl ReferenceSourceEndpoint {
    fn new<S>(target_id: ActorId, stream: S, marshallers: Arc<MarshallerRegistry>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        use futures::StreamExt;

        let boxed: BoxedStream = Box::new(stream);
        let framed = Framed::new(boxed, FrameCodec);
        let (write_half, mut read_half) = framed.split();

        let exit = Arc::new(tokio::sync::Notify::new());
        let bus = Arc::new(crate::transport::FramedBus::new(write_half, exit.clone()));
        let pending: Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value, String>>>>> = Arc::new(Mutex::new(HashMap::new()));

        let pending_for_task = pending.clone();
        tokio::spawn(async move {
            while let Some(Ok(frame)) = read_half.next().await {
                if frame.kind != FrameKind::ActorResponse {
                    continue;
                }
                let Some(id) = frame.id else { continue };
                let Ok(body) = frame.body_as::<ActorResponseBody>() else { continue };
                if let Some(tx) = pending_for_task.lock().await.remove(&id.0) {
                    let _ = tx.send(body.error.map(Err).unwrap_or(Ok(body.response.unwrap_or(Value::Null))));
                }
            }
            debug!("reference source connection closed");
            exit.notify_waiters();
        });

        Self {
            target_id,
            bus,
            pending,
            message_ids: MessageIdGenerator::new(),
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
            .with_actor(self.target_id)
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
                .map_err(|_| ActorError::TransportError("reference target connection closed mid-call".into()))?
                .map_err(ActorError::RemoteError),
        }
    }
}

#[async_trait]
impl Endpoint for ReferenceSourceEndpoint {
    fn id(&self) -> ActorId {
        self.target_id
    }

    async fn send0(&self, topic: &str, args: Vec<Value>, _self_proxy: &ClientProxy) -> Result<(), ActorError> {
        self.call(topic, args, false).await.map(|_| ())
    }

    async fn send_and_receive0(&self, topic: &str, args: Vec<Value>, _self_proxy: &ClientProxy) -> Result<Value, ActorError> {
        self.call(topic, args, true).await
    }

    async fn destroy0(&self, _self_proxy: &ClientProxy) {}
}

async fn connect_inter_host(target_id: ActorId, host: &str, port: u16, marshallers: Arc<MarshallerRegistry>) -> Result<ReferenceSourceEndpoint, ActorError> {
    let stream = TcpStream::connect((host, port)).await.map_err(ActorError::ProcessError)?;
    Ok(ReferenceSourceEndpoint::new(target_id, stream, marshallers))
}

#[cfg(unix)]
async fn connect_inter_process(target_id: ActorId, path: &str, marshallers: Arc<MarshallerRegistry>) -> Result<ReferenceSourceEndpoint, ActorError> {
    let stream = UnixStream::connect(path).await.map_err(ActorError::ProcessError)?;
    Ok(ReferenceSourceEndpoint::new(target_id, stream, marshallers))
}

#[cfg(not(unix))]
async fn connect_inter_process(_target_id: ActorId, _path: &str, _marshallers: Arc<MarshallerRegistry>) -> Result<ReferenceSourceEndpoint, ActorError> {
    Err(ActorError::InitError(
        "inter-process references require a UNIX domain socket, which this platform does not support (spec DN-5)".into(),
    ))
}
