//! Identifiers and small helpers shared across the crate.

pub mod ids;

pub use ids::{ActorId, MessageId};
