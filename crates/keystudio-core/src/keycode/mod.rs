//! Keycode catalog and codec.
//!
//! Firmware for QMK/VIA-class keyboards stores every key action as a single
//! 16-bit integer.  This module maps between those integers and the symbolic
//! ids users work with (`"KC_A"`, `"QK_MO"` + layer 3, …).
//!
//! # Encoding shapes (for beginners)
//!
//! A catalog entry has one of four shapes:
//!
//! | Kind       | Layout of the 16-bit code                      | Example          |
//! |------------|------------------------------------------------|------------------|
//! | `basic`    | fixed value                                    | `KC_A = 0x0004`  |
//! | `layer`    | `base + layer` (layer is 6 bits)               | `MO(3) = 0x5223` |
//! | `layerTap` | `base \| layer << 8 \| tap`                    | `LT(1, A)`       |
//! | `modTap`   | `base \| mods << 8 \| tap`                     | `MT(LSFT, A) = 0x6204` |
//!
//! Decoding always tries exact `basic` matches first, then the range-based
//! shapes in the order above.  A code matching nothing decodes to `None`;
//! [`KeycodeCodec::decode_label`] turns that into a "User n" / "Custom" /
//! "Unknown" legend instead.
//!
//! The catalog itself is immutable.  Switching catalogs goes through
//! [`registry::CatalogRegistry`], which swaps in a brand-new `Arc<Catalog>`.

pub mod catalog;
pub mod codec;
pub mod label;
pub mod registry;

pub use catalog::{
    Catalog, CatalogData, CatalogEntry, CatalogError, CatalogStats, EntryKind, KeycodeGroup,
    Level,
};
pub use codec::{CodecError, DecodedKeycode, KeyOption, KeycodeCodec, KeycodeParams};
pub use label::{format_code, DisplayLegend, DisplayOverrides, KeycodeLabel, Legend, OsProfile};
pub use registry::{CatalogId, CatalogRegistry};
