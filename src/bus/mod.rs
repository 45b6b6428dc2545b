//! Process-wide event bus (C8).

pub mod system_bus;

pub use system_bus::{ForkedRecipient, SystemBus, SystemEvent};
