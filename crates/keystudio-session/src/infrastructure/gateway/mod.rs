//! Device gateway backends.
//!
//! Only the in-memory backend ships in this crate; a HID backend implements
//! the same [`DeviceGateway`](crate::application::gateway::DeviceGateway)
//! trait from outside.

pub mod memory;

pub use memory::{demo_layout, DeviceFixture, InMemoryGateway};
