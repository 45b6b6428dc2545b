//! The Parent Proxy: the handle a worker process/thread hands back from
//! `getParent()` (spec §4.5.5). Translates local `send`/`sendAndReceive`
//! into frames addressed to the parent's id over the same channel the
//! worker was bootstrapped with.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

// Layer 3: Internal module imports
use super::traits::Endpoint;
use crate::actor::error::ActorError;
use crate::actor::proxy::ClientProxy;
use crate::message::frame::bodies::{ActorMessageBody, ActorResponseBody};
use crate::message::frame::{Frame, FrameKind};
use crate::message::marshaller::{prepare_outgoing, MarshallerRegistry};
use crate::transport::TransportBus;
use crate::util::{ActorId, MessageIdGenerator};

pub struct ParentProxyEndpoint {
    parent_id: ActorId,
    bus: Arc<dyn TransportBus>,
    pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
    message_ids: MessageIdGenerator,
    marshallers: Arc<MarshallerRegistry>,
}

impl ParentProxyEndpoint {
    pub fn new(
        parent_id: ActorId,
        bus: Arc<dyn TransportBus>,
        pending: Arc<Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>>,
        marshallers: Arc<MarshallerRegistry>,
    ) -> Self {
        Self {
            parent_id,
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
            .with_actor(self.parent_id)
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
                .map_err(|_| ActorError::TransportError("channel to parent closed mid-call".into()))?
                .map_err(ActorError::RemoteError),
        }
    }
}

#[async_trait]
impl Endpoint for ParentProxyEndpoint {
    fn id(&self) -> ActorId {
        self.parent_id
    }

    async fn send0(&self, topic: &str, args: Vec<Value>, _self_proxy: &ClientProxy) -> Result<(), ActorError> {
        self.call(topic, args, false).await.map(|_| ())
    }

    async fn send_and_receive0(&self, topic: &str, args: Vec<Value>, _self_proxy: &ClientProxy) -> Result<Value, ActorError> {
        self.call(topic, args, true).await
    }

    async fn destroy0(&self, _self_proxy: &ClientProxy) {}
}

/// Delivers an `actor-response` frame to whichever pending call on a
/// [`ParentProxyEndpoint`]'s shared `pending` map it correlates to. The
/// worker entry's frame pump calls this for frames read off the parent
/// channel, the mirror image of [`ParentProxyEndpoint::call`].
pub async fn resolve_pending(
    pending: &Mutex<std::collections::HashMap<u32, oneshot::Sender<Result<Value, String>>>>,
    frame: &Frame,
) {
    if frame.kind != FrameKind::ActorResponse {
        return;
    }
    let Some(message_id) = frame.id else { return };
    let Ok(body) = frame.body_as::<ActorResponseBody>() else { return };
    if let Some(tx) = pending.lock().await.remove(&message_id.0) {
        let _ = tx.send(body.error.map(Err).unwrap_or(Ok(body.response.unwrap_or(Value::Null))));
    }
}
