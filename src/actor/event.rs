//! Per-actor observability events (spec §7: "surfaced via the actor's
//! event emitter (`augmented`, `destroyed`, `message-dropped-overload`)").

use serde::Serialize;

use crate::util::ActorId;

/// An event emitted on an actor's own event stream. Never a call
/// failure — supervision outcomes are observed here, not thrown.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActorEvent {
    /// Hot reconfiguration completed; the proxy now wraps a new endpoint.
    Augmented { id: ActorId },
    /// The endpoint's peer died or stopped responding to pings.
    Crashed { id: ActorId },
    /// A respawn attempt failed; another will be scheduled.
    RespawnFailed { id: ActorId },
    /// A send was rejected by the admission gate.
    MessageDroppedOverload { id: ActorId, topic: String },
    /// `destroy()` completed.
    Destroyed { id: ActorId },
}

/// Capacity of each actor's event broadcast channel. Generous enough
/// that a slow subscriber doesn't immediately start missing events
/// under normal load; lagging subscribers just skip ahead.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
