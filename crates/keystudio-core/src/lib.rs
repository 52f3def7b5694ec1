//! # keystudio-core
//!
//! Pure domain library for KeyStudio: the keycode catalog and codec, the VIA
//! layout normalizer, and the profile / binding model shared with the session
//! crate.
//!
//! Nothing here touches a device, the filesystem, or an async runtime.
//!
//! # Architecture overview (for beginners)
//!
//! KeyStudio edits what the keys of a programmable keyboard do.  Three pieces
//! live in this crate:
//!
//! - **`keycode`** – Converts between symbolic keycode ids such as `KC_A` or
//!   `QK_MO` with a layer parameter and the 16-bit numbers keyboard firmware
//!   stores, and produces the short labels drawn on each key.
//!
//! - **`layout`** – Turns a VIA keyboard descriptor (rows of labels and
//!   positioning directives) into absolute key and control geometry, and
//!   derives the list of target ids a binding may be attached to.
//!
//! - **`profile`** – Bindings, layers, and profiles; the shapes a device
//!   reports; the committed / applied / staged snapshots; and the checksum
//!   used to decide whether there are unsaved edits.

pub mod keycode;
pub mod layout;
pub mod profile;

// Re-export the most-used types at the crate root so callers can write
// `keystudio_core::KeycodeCodec` instead of the full module path.
pub use keycode::{CatalogId, CatalogRegistry, CodecError, KeycodeCodec, KeycodeLabel, OsProfile};
pub use layout::{normalize_via_layout, NormalizationResult, NormalizedLayout};
pub use profile::{
    profile_checksum, Binding, Capabilities, DeviceInfo, DeviceMode, Profile, ProfileBundle,
    StateSnapshot, StatusSnapshot, SyncState,
};
