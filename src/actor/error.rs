//! The error taxonomy from spec §7, as a single enum every fallible
//! actor operation resolves its `Result`'s error type to.

// Layer 1: Standard library imports
use std::io;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use crate::util::ActorId;

/// Errors a caller can observe from a [`crate::actor::proxy::ClientProxy`]
/// operation. Supervision events (crash, respawn) are *not* represented
/// here — they surface through the actor's event emitter, never as a
/// call failure, except where state is observed `crashed` at call time
/// (which does produce [`ActorError::NotReady`]).
#[derive(Debug, Error)]
pub enum ActorError {
    /// Send attempted while state is anything other than `ready`.
    #[error("actor {0} is not ready")]
    NotReady(ActorId),

    /// The local behavior has no handler for the given topic.
    #[error("actor {0} has no handler for topic {1:?}")]
    NoHandler(ActorId, String),

    /// The admission gate rejected the send (system-wide overload).
    #[error("actor {0} dropped a message: system overloaded")]
    Overloaded(ActorId),

    /// The peer handler threw; its message is carried verbatim.
    #[error("remote handler error: {0}")]
    RemoteError(String),

    /// The transport bus reported a send failure or an exit mid-call.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A ping or idle threshold was exceeded.
    #[error("actor {0} missed its liveness deadline")]
    LivenessTimeout(ActorId),

    /// `initialize` failed; the endpoint has been torn down.
    #[error("actor initialization failed: {0}")]
    InitError(String),

    /// A frame or call body failed to (de)serialize as JSON.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A `send`/`sendAndReceive` argument named a marshaller that isn't
    /// registered, or a registered one rejected the value (spec §4.3).
    #[error("marshalling error: {0}")]
    MarshalError(#[from] crate::message::marshaller::MarshalError),

    /// A child-management call referenced a handle that is not (or is no
    /// longer) a child of the actor it was invoked on.
    #[error("{0} is not a child of this actor")]
    NotAChild(ActorId),

    /// A cluster/balancer call found no ready child to deliver to.
    #[error("no ready child available")]
    NoChild,

    /// Underlying OS/process-spawn failure.
    #[error("process error: {0}")]
    ProcessError(#[from] io::Error),
}

impl ActorError {
    /// Errors that, per spec §7, are also reported as the
    /// `message-dropped-overload` observability event.
    pub fn is_overload(&self) -> bool {
        matches!(self, ActorError::Overloaded(_))
    }
}
