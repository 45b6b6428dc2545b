//! The Worker Entry (C9): the bootstrap code inside a spawned child
//! process or worker thread (spec §4.8).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{error, info};

// Layer 3: Internal module imports
use crate::actor::behavior::Behavior;
use crate::actor::config::ActorConfig;
use crate::actor::context::SystemContext;
use crate::actor::core::ActorCore;
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::endpoint::forked::run_parent_ping_loop;
use crate::endpoint::parent_proxy::resolve_pending;
use crate::endpoint::ParentProxyEndpoint;
use crate::message::frame::bodies::{ActorCreatedBody, ActorMessageBody, ActorResponseBody, CreateActorBody, DefinitionFormat};
use crate::message::frame::{Frame, FrameKind};
use crate::message::marshaller::MarshallerRegistry;
use crate::system::{ActorSystem, BehaviorRegistry};
use crate::transport::{FrameCodec, FramedBus, InProcessBus, TransportBus};
use crate::util::ActorId;

/// The half of a [`ParentProxyEndpoint`] a worker's frame pump needs to
/// resolve replies to calls the worker's own root made against its
/// parent (spec §4.5.5).
type PendingCalls = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value, String>>>>>;

/// Builds the [`ClientProxy`] a worker's root actor uses as its parent:
/// a [`ParentProxyEndpoint`] addressed at `parent_id`, translating
/// `send`/`sendAndReceive` into `actor-message` frames over `bus`
/// (spec §4.5.5). Returns the shared pending-call map the worker's frame
/// pump must feed `actor-response` frames into via [`resolve_pending`].
fn build_parent_proxy(parent_id: ActorId, bus: Arc<dyn TransportBus>, system: Arc<dyn SystemContext>) -> (ClientProxy, PendingCalls) {
    let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
    let endpoint = Arc::new(ParentProxyEndpoint::new(parent_id, bus, pending.clone(), system.marshallers()));
    let proxy = ActorCore::from_reference_endpoint(endpoint, "parent".to_string(), system);
    (proxy, pending)
}

/// Relays one incoming `actor-message` frame into a local `send`/
/// `sendAndReceive` against `proxy`, writing the `actor-response` back
/// over `bus` when the sender asked to receive a reply (spec §6.1). If
/// `body.marshalledType` is set, the payload is run through `proxy`'s
/// marshaller registry before dispatch (spec §4.3). Anything other than
/// `actor-message` is ignored; callers handle `destroy-actor` themselves
/// since it ends the serving loop. Shared by every worker-side frame
/// pump and, in the other direction, by the parent-side reader tasks
/// that relay a child's `forwardToParent` sends (spec §4.5.5).
pub(crate) async fn relay_actor_message(frame: Frame, proxy: &ClientProxy, bus: &dyn TransportBus) {
    if frame.kind != FrameKind::ActorMessage {
        return;
    }
    let Ok(body) = frame.body_as::<ActorMessageBody>() else { return };
    let args = match crate::message::marshaller::prepare_incoming(&proxy.marshallers(), body.message, body.marshalled_type.as_deref()) {
        Ok(args) => args,
        Err(e) => {
            if body.receive {
                let response = ActorResponseBody { response: None, error: Some(e.to_string()) };
                if let Some(id) = frame.id {
                    if let Ok(reply) = Frame::new(FrameKind::ActorResponse).with_id(id).with_body(response) {
                        let _ = bus.send(reply).await;
                    }
                }
            }
            return;
        }
    };
    if !body.receive {
        let _ = proxy.send(&body.topic, args).await;
        return;
    }
    let response = match proxy.send_and_receive(&body.topic, args).await {
        Ok(value) => ActorResponseBody { response: Some(value), error: None },
        Err(e) => ActorResponseBody { response: None, error: Some(e.to_string()) },
    };
    if let Some(id) = frame.id {
        if let Ok(reply) = Frame::new(FrameKind::ActorResponse).with_id(id).with_body(response) {
            let _ = bus.send(reply).await;
        }
    }
}

/// Runs a worker entry over an arbitrary framed duplex (stdio for a
/// forked child, a TCP stream for a remote worker). Reads the single
/// `create-actor` initialization frame, builds a child-mode
/// [`ActorSystem`], instantiates the root actor, replies `actor-created`
/// or `{ error }`, then serves `actor-message` frames and the child-side
/// liveness ping until the channel closes or a `destroy-actor` frame
/// arrives (spec §4.8, §4.5.2 "Ping").
pub async fn run_worker<R, W>(
    reader: R,
    writer: W,
    behaviors: Arc<BehaviorRegistry>,
    marshallers: Arc<MarshallerRegistry>,
) -> Result<(), ActorError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    use futures::StreamExt;

    let mut reader = FramedRead::new(BufReader::new(reader), FrameCodec);
    let writer = FramedWrite::new(writer, FrameCodec);

    let frame = reader
        .next()
        .await
        .ok_or_else(|| ActorError::InitError("no initialization frame received".into()))?
        .map_err(|e| ActorError::TransportError(e.to_string()))?;

    if frame.kind != FrameKind::CreateActor {
        return Err(ActorError::InitError(format!("expected create-actor, got {}", frame.kind)));
    }

    let body: CreateActorBody = frame.body_as().map_err(ActorError::SerializationError)?;

    let exit = Arc::new(tokio::sync::Notify::new());
    let bus: Arc<dyn TransportBus> = Arc::new(FramedBus::new(writer, exit));

    let behavior = match body.definition_format {
        DefinitionFormat::ModulePath => behaviors.build(&body.definition),
        DefinitionFormat::Serialized => None,
    };
    let Some(behavior) = behavior else {
        let message = format!("no behavior registered for {:?}", body.definition);
        let _ = bus.send(Frame::new(FrameKind::ActorCreated).with_error(message.clone())).await;
        return Err(ActorError::InitError(message));
    };

    let system = ActorSystem::builder().marshallers(marshallers).build();
    let ping_timeout = Duration::from_millis(body.ping_timeout_ms);
    let config: ActorConfig = body.actor_config;

    let (parent_proxy, pending_calls) = build_parent_proxy(body.parent.id, bus.clone(), system.clone() as Arc<dyn SystemContext>);

    let root_id = ActorId::new();
    let proxy = match system.root_actor_with_parent(root_id, behavior, config, parent_proxy).await {
        Ok(proxy) => {
            let ack_body = ActorCreatedBody { id: proxy.id(), port: None };
            let ack = Frame::new(FrameKind::ActorCreated).with_body(ack_body).map_err(ActorError::SerializationError)?;
            bus.send(ack).await?;
            info!(id = %proxy.id(), "worker actor created");
            proxy
        }
        Err(e) => {
            let _ = bus.send(Frame::new(FrameKind::ActorCreated).with_error(e.to_string())).await;
            error!(error = %e, "worker failed to construct its root actor");
            return Err(e);
        }
    };

    tokio::spawn(run_parent_ping_loop(bus.clone(), ping_timeout));

    while let Some(frame) = reader.next().await {
        let Ok(frame) = frame else { break };
        match frame.kind {
            FrameKind::DestroyActor => {
                proxy.destroy().await;
                break;
            }
            FrameKind::ActorResponse => resolve_pending(&pending_calls, &frame).await,
            _ => relay_actor_message(frame, &proxy, bus.as_ref()).await,
        }
    }

    Ok(())
}

/// Entry point for a binary that hosts a worker over its own stdio
/// (spec §4.5.2: "Child side"). On any construction failure, exits with
/// status 1 per spec §4.8.
pub async fn run_stdio_worker(behaviors: Arc<BehaviorRegistry>, marshallers: Arc<MarshallerRegistry>) {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    if run_worker(stdin, stdout, behaviors, marshallers).await.is_err() {
        std::process::exit(1);
    }
}

/// Entry point for a worker process spawned by [`crate::system::listener`]
/// to host a remote (inter-host) actor (spec §6.3: "the client is
/// expected to open a second connection to that port"). Reads the
/// `create-actor` frame over its own stdio, as any forked worker does,
/// but instead of serving `actor-message` frames over that same pipe it
/// opens a fresh ephemeral TCP port, reports it back to the bootstrap
/// connection, and serves the actor over the first connection a client
/// makes to that port.
pub async fn run_listen_worker(behaviors: Arc<BehaviorRegistry>, marshallers: Arc<MarshallerRegistry>) {
    if let Err(e) = run_listen_worker_inner(behaviors, marshallers).await {
        error!(error = %e, "listen-mode worker failed");
        std::process::exit(1);
    }
}

async fn run_listen_worker_inner(behaviors: Arc<BehaviorRegistry>, marshallers: Arc<MarshallerRegistry>) -> Result<(), ActorError> {
    use futures::StreamExt;
    use tokio::net::TcpListener;

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let mut bootstrap_reader = FramedRead::new(BufReader::new(stdin), FrameCodec);
    let mut bootstrap_writer = FramedWrite::new(stdout, FrameCodec);

    let frame = bootstrap_reader
        .next()
        .await
        .ok_or_else(|| ActorError::InitError("no initialization frame received".into()))?
        .map_err(|e| ActorError::TransportError(e.to_string()))?;
    if frame.kind != FrameKind::CreateActor {
        return Err(ActorError::InitError(format!("expected create-actor, got {}", frame.kind)));
    }
    let body: CreateActorBody = frame.body_as().map_err(ActorError::SerializationError)?;

    let behavior = match body.definition_format {
        DefinitionFormat::ModulePath => behaviors.build(&body.definition),
        DefinitionFormat::Serialized => None,
    };
    let Some(behavior) = behavior else {
        let message = format!("no behavior registered for {:?}", body.definition);
        let _ = futures::SinkExt::send(&mut bootstrap_writer, Frame::new(FrameKind::ActorCreated).with_error(message.clone())).await;
        return Err(ActorError::InitError(message));
    };

    let listener = TcpListener::bind(("0.0.0.0", 0)).await.map_err(ActorError::ProcessError)?;
    let port = listener.local_addr().map_err(ActorError::ProcessError)?.port();

    let system = ActorSystem::builder().marshallers(marshallers).build();
    let ping_timeout = Duration::from_millis(body.ping_timeout_ms);

    // The root's id must be announced here, before the connection its
    // parent proxy will ride on is even accepted (spec §6.3), so it is
    // chosen up front rather than left to `root_actor_with_parent`.
    let root_id = ActorId::new();
    let ack_body = ActorCreatedBody { id: root_id, port: Some(port) };
    let ack = Frame::new(FrameKind::ActorCreated).with_body(ack_body).map_err(ActorError::SerializationError)?;
    futures::SinkExt::send(&mut bootstrap_writer, ack).await.map_err(|e| ActorError::TransportError(e.to_string()))?;
    drop(bootstrap_reader);
    drop(bootstrap_writer);

    let (stream, addr) = listener.accept().await.map_err(ActorError::ProcessError)?;
    info!(%addr, "accepted client connection on reported port");

    let framed = tokio_util::codec::Framed::new(stream, FrameCodec);
    let (write_half, mut read_half) = framed.split();

    let exit = Arc::new(tokio::sync::Notify::new());
    let bus: Arc<dyn TransportBus> = Arc::new(FramedBus::new(write_half, exit));

    let (parent_proxy, pending_calls) = build_parent_proxy(body.parent.id, bus.clone(), system.clone() as Arc<dyn SystemContext>);

    let proxy = match system.root_actor_with_parent(root_id, behavior, body.actor_config, parent_proxy).await {
        Ok(proxy) => {
            info!(id = %proxy.id(), port, "listen-mode worker actor created");
            proxy
        }
        Err(e) => {
            error!(error = %e, "listen-mode worker failed to construct its root actor");
            return Err(e);
        }
    };

    tokio::spawn(run_parent_ping_loop(bus.clone(), ping_timeout));

    while let Some(frame) = read_half.next().await {
        let Ok(frame) = frame else { break };
        match frame.kind {
            FrameKind::DestroyActor => {
                proxy.destroy().await;
                break;
            }
            FrameKind::ActorResponse => resolve_pending(&pending_calls, &frame).await,
            _ => relay_actor_message(frame, &proxy, bus.as_ref()).await,
        }
    }

    Ok(())
}

/// Runs a worker-thread's bootstrap and message loop on the calling OS
/// thread (spec §4.5.4: "blocks on the port instead of stdio"). The
/// behavior is already in hand — a worker thread shares the process's
/// address space, so unlike the forked/remote variants there is no
/// definition to resolve by name. Builds its own single-threaded Tokio
/// runtime since [`crate::endpoint::threaded::ThreadedEndpoint::spawn`]
/// calls this on a plain `std::thread`, outside any existing async
/// context.
pub fn run_threaded_worker(
    name: String,
    behavior: Box<dyn Behavior>,
    config: ActorConfig,
    parent: ClientProxy,
    bus: InProcessBus,
    mut rx: mpsc::UnboundedReceiver<Frame>,
) {
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, name = %name, "failed to build worker-thread runtime");
            return;
        }
    };

    rt.block_on(async move {
        let system = ActorSystem::builder().marshallers(parent.marshallers()).build();
        let proxy = match system.root_actor_with_parent(ActorId::new(), behavior, config, parent).await {
            Ok(proxy) => proxy,
            Err(e) => {
                error!(error = %e, name = %name, "threaded worker failed to construct its root actor");
                return;
            }
        };
        info!(id = %proxy.id(), name = %name, "threaded worker actor created");

        while let Some(frame) = rx.recv().await {
            if frame.kind == FrameKind::DestroyActor {
                proxy.destroy().await;
                break;
            }
            relay_actor_message(frame, &proxy, &bus).await;
        }
    });
}
