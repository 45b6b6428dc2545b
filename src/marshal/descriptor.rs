//! The portable form of an actor reference (spec §3: "Reference
//! descriptor").

use serde::{Deserialize, Serialize};

use crate::util::ActorId;

/// Produced by a [`super::reference::ReferenceTarget`] when an actor is
/// sent across a process or host boundary; consumed by a
/// [`super::reference::ReferenceSource`] to rebuild a remote handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDescriptor {
    pub actor_id: ActorId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ReferenceDescriptor {
    pub fn inter_process(actor_id: ActorId, path: impl Into<String>) -> Self {
        Self {
            actor_id,
            host: None,
            port: None,
            path: Some(path.into()),
        }
    }

    pub fn inter_host(actor_id: ActorId, host: impl Into<String>, port: u16) -> Self {
        Self {
            actor_id,
            host: Some(host.into()),
            port: Some(port),
            path: None,
        }
    }
}

/// The UNIX domain socket / Windows named pipe path a
/// [`super::reference::ReferenceTarget`] listens on for a given actor
/// (spec §6.4).
pub fn inter_process_socket_path(id: ActorId) -> String {
    let dir = std::env::temp_dir();
    #[cfg(unix)]
    {
        dir.join(format!("actor-{id}.socket")).to_string_lossy().into_owned()
    }
    #[cfg(windows)]
    {
        format!("\\\\.\\pipe\\actor-{id}.socket")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn inter_process_descriptor_round_trips() {
        let id = ActorId::new();
        let descriptor = ReferenceDescriptor::inter_process(id, "/tmp/actor-x.socket");
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: ReferenceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(descriptor, back);
    }
}
