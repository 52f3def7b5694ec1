//! Physical layout model and the VIA descriptor normalizer.
//!
//! The normalized layout is the addressable space of binding targets: every
//! key, every control block, and the rotation sub-targets of encoders.

pub mod encoder;
pub mod model;
pub mod normalizer;

pub use model::{
    Bounds, ControlElement, ControlFlags, ControlKind, KeyElement, NormalizedLayout,
    ENCODER_CCW_SUFFIX, ENCODER_CW_SUFFIX,
};
pub use normalizer::{
    normalize_via_layout, normalize_via_layout_str, Diagnostic, DiagnosticLevel,
    NormalizationResult,
};
