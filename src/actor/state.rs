//! Lifecycle and dispatch-mode enums (spec §3: "Attributes").

use serde::{Deserialize, Serialize};

/// Where an actor's endpoint actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorMode {
    /// Runs inline on the hosting process's executor.
    InMemory,
    /// Runs in a forked child process, bridged over stdio (spec §4.5.2).
    Forked,
    /// Runs on a remote host, bridged over TCP (spec §4.5.3).
    Remote,
    /// Runs on a worker thread, bridged over a message port (spec §4.5.4).
    Threaded,
    /// Exists in the tree but accepts no messages.
    Disabled,
}

/// The actor lifecycle state machine (spec §3: "Lifecycle").
///
/// ```text
/// new -> ready -> destroying -> destroyed
///         |  ^
///         v  | (respawn succeeds)
///       crashed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorState {
    New,
    Ready,
    Crashed,
    Destroying,
    Destroyed,
}

impl ActorState {
    /// Whether a send/sendAndReceive may proceed (spec §4.4.2: "if state
    /// != ready → reject not-ready").
    pub fn accepts_messages(self) -> bool {
        matches!(self, ActorState::Ready)
    }
}

/// What the parent does when it detects the endpoint has crashed
/// (spec §4.4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnCrash {
    /// Leave the actor in `crashed` state; do not respawn.
    #[default]
    Stop,
    /// Transparently replace the dead endpoint and return to `ready`.
    Respawn,
}
