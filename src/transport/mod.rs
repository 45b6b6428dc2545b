//! The messaging plane: framing (C1) and the transport bus abstraction
//! (C2) that every non-in-memory endpoint is built on.

pub mod bus;
pub mod socket;

pub use bus::{FramedBus, InProcessBus, TransportBus};
pub use socket::FrameCodec;
