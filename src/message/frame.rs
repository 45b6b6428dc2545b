//! The on-wire frame shape shared by every transport.
//!
//! Every frame is a JSON value `{ type, id?, actorId?, body?, error? }`
//! (spec §6.1). The `type` tag selects one of a fixed set of frame kinds;
//! `body` is left as a loosely-typed [`serde_json::Value`] because each
//! kind's payload shape differs and some payloads (message args, user
//! responses) are themselves arbitrary user data that only the far end's
//! marshaller registry knows how to interpret.

// Layer 1: Standard library imports
use std::fmt;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use crate::util::{ActorId, MessageId};

/// The fixed set of frame kinds defined by the wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameKind {
    CreateActor,
    ActorCreated,
    ActorMessage,
    ActorResponse,
    DestroyActor,
    ParentPing,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self).unwrap_or_default();
        write!(f, "{}", s.as_str().unwrap_or("unknown"))
    }
}

/// A single frame as carried by a [`crate::transport::TransportBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(rename = "actorId", default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<ActorId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            id: None,
            actor_id: None,
            body: None,
            error: None,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_body(mut self, body: impl Serialize) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Deserialize `body` into a concrete payload type, erroring if absent.
    pub fn body_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body)
    }
}

/// Strongly-typed bodies for the frame kinds defined in spec §6.1/§6.2.
/// These are convenience (de)serialization targets for [`Frame::body`];
/// the frame itself carries an untyped `Value` so unknown extra fields
/// never fail to parse.
pub mod bodies {
    use super::*;
    use crate::actor::config::ActorConfig;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CreateActorBody {
        pub id: ActorId,
        pub name: String,
        pub definition: String,
        #[serde(rename = "definitionFormat")]
        pub definition_format: DefinitionFormat,
        #[serde(rename = "actorConfig")]
        pub actor_config: ActorConfig,
        pub parent: ParentRef,
        pub mode: crate::actor::state::ActorMode,
        #[serde(rename = "pingTimeoutMs")]
        pub ping_timeout_ms: u64,
        #[serde(default)]
        pub marshallers: Vec<String>,
        #[serde(default)]
        pub resources: Vec<String>,
        #[serde(rename = "loggerConfig", default)]
        pub logger_config: Option<Value>,
        #[serde(rename = "customParametersMarshalledTypes", default)]
        pub custom_parameters_marshalled_types: HashMap<String, String>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub enum DefinitionFormat {
        ModulePath,
        Serialized,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ParentRef {
        pub id: ActorId,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ActorCreatedBody {
        pub id: ActorId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub port: Option<u16>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ActorMessageBody {
        pub topic: String,
        pub message: Value,
        pub receive: bool,
        #[serde(rename = "marshalledType", default, skip_serializing_if = "Option::is_none")]
        pub marshalled_type: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ActorResponseBody {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub response: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }
}
