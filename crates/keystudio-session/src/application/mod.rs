//! Application layer: the device session and the rules around it.
//!
//! # What is the "application" layer? (for beginners)
//!
//! This layer sits between the pure data model in `keystudio-core` and the
//! concrete device backends in `infrastructure`.  Code here:
//!
//! - **Orchestrates** core types to fulfil a user goal ("stage this binding
//!   and show whether the device is now dirty").
//! - **Depends on the [`DeviceGateway`] trait**, never on a concrete backend.
//! - **Performs no HID or file I/O of its own.**
//!
//! # Sub-modules
//!
//! - **`session`** – The connection state machine: connect, stage, apply,
//!   revert, commit, refresh, and the busy rule that serializes them.
//! - **`gateway`** – The async trait every device backend implements.
//! - **`translate_binding`** – Turns symbolic bindings into what a
//!   direct-keymap (VIA) device can store.
//! - **`device_list`** – Stable ordering of the device picker across polls.
//! - **`interaction`** – Tracks drags so polling stays out of the way.
//! - **`error`** – Session errors and their user-facing form.

pub mod device_list;
pub mod error;
pub mod gateway;
pub mod interaction;
pub mod session;
pub mod translate_binding;

pub use device_list::{reconcile_devices, sort_devices, DeviceListUpdate};
pub use error::{SessionError, UserError};
pub use gateway::{DeviceGateway, GatewayError};
pub use interaction::InteractionMonitor;
pub use session::{
    hydrate_bundle, spawn_device_poller, BusyOp, DeviceSession, Phase, SessionState, SyncStatus,
};
pub use translate_binding::{translate_for_via, TranslationError};
