//! Actor and message identifiers.
//!
//! An [`ActorId`] is a 96-bit opaque value, hex-encoded wherever it crosses
//! a text boundary (JSON bodies, socket paths, log lines). A [`MessageId`]
//! is a per-bus monotonic counter, not globally unique (see OQ-3): two
//! sibling buses may hand out the same id to unrelated frames.

// Layer 1: Standard library imports
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

// Layer 2: Third-party crate imports
use rand::RngCore;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const ACTOR_ID_BYTES: usize = 12;

/// A 96-bit opaque actor identifier, hex-encoded.
///
/// Immutable for the life of the handle that owns it. Hot reconfiguration
/// and respawn replace the underlying endpoint with one carrying a *new*
/// id; the id is never mutated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId([u8; ACTOR_ID_BYTES]);

impl ActorId {
    /// Generate a fresh, randomly chosen id.
    pub fn new() -> Self {
        let mut bytes = [0u8; ACTOR_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Build an id from raw bytes (used when reconstructing from a wire frame).
    pub fn from_bytes(bytes: [u8; ACTOR_ID_BYTES]) -> Self {
        Self(bytes)
    }

    /// The raw bytes backing this id.
    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_BYTES] {
        &self.0
    }

    /// Lowercase hex representation, the canonical on-wire form.
    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Error returned when a hex string cannot be parsed into an [`ActorId`].
#[derive(Debug, thiserror::Error)]
#[error("invalid actor id: {0}")]
pub struct ParseActorIdError(String);

impl FromStr for ActorId {
    type Err = ParseActorIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ACTOR_ID_BYTES * 2 {
            return Err(ParseActorIdError(s.to_string()));
        }
        let mut bytes = [0u8; ACTOR_ID_BYTES];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let chunk = &s[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(chunk, 16).map_err(|_| ParseActorIdError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for ActorId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = ActorId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a 24-character hex string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// A per-bus monotonic message id (spec §3: "Message ids are per-bus
/// monotonic"). Not a process-wide unique id; two buses number their
/// frames from zero independently.
#[derive(Debug, Default)]
pub struct MessageIdGenerator(AtomicU32);

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Allocate the next id on this bus.
    pub fn next(&self) -> MessageId {
        MessageId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// A message id, unique within the bus that generated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn actor_ids_are_unique_with_overwhelming_probability() {
        let a = ActorId::new();
        let b = ActorId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn actor_id_hex_roundtrip() {
        let id = ActorId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        let parsed: ActorId = hex.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn actor_id_json_roundtrip() {
        let id = ActorId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: ActorId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn actor_id_rejects_malformed_hex() {
        assert!("not-hex".parse::<ActorId>().is_err());
        assert!("abcd".parse::<ActorId>().is_err());
    }

    #[test]
    fn message_ids_increase_monotonically_per_bus() {
        let gen = MessageIdGenerator::new();
        let first = gen.next();
        let second = gen.next();
        assert_eq!(first.0 + 1, second.0);
    }

    #[test]
    fn independent_buses_can_collide() {
        let a = MessageIdGenerator::new();
        let b = MessageIdGenerator::new();
        assert_eq!(a.next(), b.next());
    }
}
