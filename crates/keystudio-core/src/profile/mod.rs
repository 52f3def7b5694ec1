//! Profiles, bindings, device wire models, and sync-state tracking.

pub mod actions;
pub mod binding;
pub mod checksum;
pub mod device;
pub mod state;

pub use actions::{resolve_action, ActionIntent, SystemPlan};
pub use binding::{Binding, BindingEntry, Layer, Meta, Profile, Sequence, StaleBinding, Step};
pub use checksum::profile_checksum;
pub use device::{
    Capabilities, DeviceInfo, DeviceMode, HidInterface, ProfileBundle, StatusSnapshot, ViaProbe,
    ViaState, WireLayer, WireProfile,
};
pub use state::{StateSnapshot, SyncState};
