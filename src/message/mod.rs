//! On-wire frames and the actor-level message envelope.

pub mod frame;
pub mod marshaller;

pub use frame::{Frame, FrameKind};
pub use marshaller::{marshalled, prepare_incoming, prepare_outgoing, MarshalError, MarshallerRegistry, ValueMarshaller};
