//! # transept - a location-transparent actor runtime
//!
//! Actors that message each other identically whether co-located in the
//! same process, forked into a child process, spawned onto a worker
//! thread, or dialed over TCP on a remote host. The value this crate
//! provides is *location transparency plus supervision*: a
//! [`actor::ClientProxy`] behaves the same regardless of where its
//! owner lives, and a crashed actor can be respawned without disturbing
//! its siblings.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use transept::actor::{ActorConfig, TopicMap};
//! use transept::system::ActorSystem;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = ActorSystem::builder().build();
//!     let behavior = TopicMap::new().on("hello", |args, _proxy| async move {
//!         let name = args.first().and_then(Value::as_str).unwrap_or("world");
//!         Ok(Value::String(format!("Hello {name}")))
//!     });
//!
//!     let root = system.root_actor(Box::new(behavior), ActorConfig::in_memory()).await?;
//!     let reply = root.send_and_receive("hello", vec![Value::String("World".into())]).await?;
//!     assert_eq!(reply, Value::String("Hello World".into()));
//!     Ok(())
//! }
//! ```
//!
//! # Module organization
//!
//! ## Core actor model
//! - [`actor`] - lifecycle/supervision state machine, behaviors, forwarding,
//!   configuration and the [`actor::ClientProxy`] handle (C4).
//! - [`endpoint`] - the four dispatch variants (in-memory, forked, remote,
//!   threaded) plus the parent-proxy mirror (C5).
//! - [`balancer`] - round-robin/random/custom strategies for clustered
//!   actors (C6).
//!
//! ## Messaging plane
//! - [`message`] - on-wire frames and the message-level value marshaller
//!   registry (C1 body format).
//! - [`transport`] - length-framed JSON duplex channel and the transport
//!   bus abstraction every non-in-memory endpoint is built on (C1, C2).
//! - [`marshal`] - converts live actor handles to portable reference
//!   descriptors and back across process/host boundaries (C3).
//!
//! ## System & process
//! - [`system`] - the actor system factory, registries, admission
//!   control, inbound TCP listener, and `actors.json` hot-reload (C7).
//! - [`bus`] - the process-wide, loop-free event bus (C8).
//! - [`worker`] - bootstrap code for a spawned child process or worker
//!   thread (C9).
//! - [`util`] - `ActorId`/`MessageId` and other small shared helpers.
//!
//! # Non-goals
//!
//! This crate does not provide durable mailboxes, exactly-once delivery,
//! cluster-wide actor discovery beyond a static endpoint list, cross-actor
//! transactions, ordering guarantees across distinct sender/receiver
//! pairs, fine-grained back-pressure, or wire authentication/encryption.

pub mod actor;
pub mod balancer;
pub mod bus;
pub mod endpoint;
pub mod marshal;
pub mod message;
pub mod system;
pub mod transport;
pub mod util;
pub mod worker;

pub use actor::{ActorConfig, ActorError, ActorMode, ActorState, ClientProxy, OnCrash};
pub use system::{ActorSystem, ActorSystemBuilder};
pub use util::{ActorId, MessageId};
