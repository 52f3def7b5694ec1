//! Bidirectional mapping between symbolic keycode ids and 16-bit firmware codes.
//!
//! [`KeycodeCodec`] pairs an immutable [`Catalog`] with the [`OsProfile`] used
//! for labels.  Encoding and decoding are pure: the same catalog and input
//! always produce the same output, and neither direction touches shared state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::{Catalog, CatalogEntry, EntryKind, KeycodeGroup, LAYER_WINDOW};
use super::label::{fallback_label, resolve_legend, KeycodeLabel, OsProfile};

/// Mask selecting the 6-bit layer number.
const LAYER_MASK: u16 = 0x3F;
/// High nibble that identifies a layer-tap / mod-tap family.
const FAMILY_MASK: u16 = 0xF000;
/// Shifted symbols on the number row, `1` through `0`.
const SHIFTED_DIGITS: [&str; 10] = ["!", "@", "#", "$", "%", "^", "&", "*", "(", ")"];
/// First code of the number row (`KC_1`).
const NUMBER_ROW_START: u16 = 0x1E;
const TRANSPARENT_ID: &str = "KC_TRNS";

/// Error type for encoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The id is neither an entry id nor an alias in the active catalog.
    #[error("keycode {0} is not in the active catalog")]
    NotFound(String),
}

/// Structured parameters of layer / layer-tap / mod-tap keycodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycodeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u8>,
    /// Basic keycode id sent on tap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tap: Option<String>,
    /// Modifier id held on hold, e.g. `"LSFT"`.
    #[serde(default, rename = "mod", skip_serializing_if = "Option::is_none")]
    pub modifier: Option<String>,
}

impl KeycodeParams {
    pub fn layer(layer: u8) -> Self {
        Self {
            layer: Some(layer),
            ..Self::default()
        }
    }

    pub fn layer_tap(layer: u8, tap: impl Into<String>) -> Self {
        Self {
            layer: Some(layer),
            tap: Some(tap.into()),
            modifier: None,
        }
    }

    pub fn mod_tap(modifier: impl Into<String>, tap: impl Into<String>) -> Self {
        Self {
            layer: None,
            tap: Some(tap.into()),
            modifier: Some(modifier.into()),
        }
    }
}

/// Result of decoding (or describing) a keycode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedKeycode {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<KeycodeParams>,
    pub label: KeycodeLabel,
    pub requires: Vec<String>,
}

/// A selectable basic keycode with its rendered label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyOption {
    pub code: u16,
    pub id: String,
    pub label: KeycodeLabel,
    pub group: KeycodeGroup,
}

/// Encoder/decoder bound to one catalog and one label profile.
#[derive(Debug, Clone)]
pub struct KeycodeCodec {
    catalog: Arc<Catalog>,
    os_profile: OsProfile,
}

impl KeycodeCodec {
    pub fn new(catalog: Arc<Catalog>, os_profile: OsProfile) -> Self {
        Self {
            catalog,
            os_profile,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn os_profile(&self) -> OsProfile {
        self.os_profile
    }

    // ── Encoding ──────────────────────────────────────────────────────────────

    /// Encodes `id` (+ params) to its firmware code.
    ///
    /// Layer numbers are masked to 6 bits; callers that care about range must
    /// validate before calling.  Layer-tap codes only round-trip for layers
    /// `0..=15`: from 16 up the layer spills into the family nibble and the
    /// code decodes as something else, or not at all.  An unknown tap id
    /// encodes as tap code 0 and an unknown modifier as bitmask 0.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotFound`] if `id` is not in the catalog.
    pub fn encode(&self, id: &str, params: Option<&KeycodeParams>) -> Result<u16, CodecError> {
        let entry = self
            .catalog
            .get(id)
            .ok_or_else(|| CodecError::NotFound(id.to_string()))?;
        Ok(self.encode_entry(entry, params))
    }

    /// Like [`encode`](Self::encode) but returns the full descriptor of what was
    /// encoded, with params canonicalised to catalog ids.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotFound`] if `id` is not in the catalog.
    pub fn encode_keycode(
        &self,
        id: &str,
        params: Option<&KeycodeParams>,
    ) -> Result<(u16, DecodedKeycode), CodecError> {
        let entry = self
            .catalog
            .get(id)
            .ok_or_else(|| CodecError::NotFound(id.to_string()))?;
        let code = self.encode_entry(entry, params);
        let canonical = self.canonical_params(entry, params);
        let decoded = self.describe(entry, canonical);
        Ok((code, decoded))
    }

    fn encode_entry(&self, entry: &CatalogEntry, params: Option<&KeycodeParams>) -> u16 {
        let layer = params.and_then(|p| p.layer).map_or(0, u16::from) & LAYER_MASK;
        match entry.kind {
            EntryKind::Basic { code } => code,
            EntryKind::Layer { base } => base.wrapping_add(layer),
            EntryKind::LayerTap { base } => base | (layer << 8) | self.tap_code(params),
            EntryKind::ModTap { base } => {
                let bits = params
                    .and_then(|p| p.modifier.as_deref())
                    .and_then(|m| self.catalog.modifier_bits(m))
                    .map_or(0, u16::from);
                base | (bits << 8) | self.tap_code(params)
            }
        }
    }

    fn tap_code(&self, params: Option<&KeycodeParams>) -> u16 {
        params
            .and_then(|p| p.tap.as_deref())
            .and_then(|tap| self.catalog.basic_code(tap))
            .map_or(0, |code| code & 0xFF)
    }

    fn canonical_params(
        &self,
        entry: &CatalogEntry,
        params: Option<&KeycodeParams>,
    ) -> Option<KeycodeParams> {
        let layer = params.and_then(|p| p.layer).map(|l| l & LAYER_MASK as u8);
        let tap = params
            .and_then(|p| p.tap.as_deref())
            .and_then(|tap| self.catalog.get(tap))
            .filter(|e| e.basic_code().is_some())
            .map(|e| e.id.clone());
        let modifier = params
            .and_then(|p| p.modifier.as_deref())
            .filter(|m| self.catalog.modifier_bits(m).is_some())
            .map(str::to_string);

        match entry.kind {
            EntryKind::Basic { .. } => None,
            EntryKind::Layer { .. } => Some(KeycodeParams::layer(layer.unwrap_or(0))),
            EntryKind::LayerTap { .. } => Some(KeycodeParams {
                layer: Some(layer.unwrap_or(0)),
                tap,
                modifier: None,
            }),
            EntryKind::ModTap { .. } => Some(KeycodeParams {
                layer: None,
                tap,
                modifier,
            }),
        }
    }

    // ── Decoding ──────────────────────────────────────────────────────────────

    /// Decodes a firmware code.
    ///
    /// Exact `basic` matches win over every range-based interpretation.  Then
    /// `layer` windows `[base, base + 64)`, then layer-tap and mod-tap families
    /// selected by the high nibble.  Returns `None` for unknown codes.
    pub fn decode(&self, code: u16) -> Option<DecodedKeycode> {
        if let Some(entry) = self.catalog.entry_for_code(code) {
            return Some(self.describe(entry, None));
        }

        for entry in self.catalog.layer_entries() {
            if let EntryKind::Layer { base } = entry.kind {
                if code >= base && u32::from(code) < u32::from(base) + u32::from(LAYER_WINDOW) {
                    let layer = (code - base) as u8;
                    return Some(self.describe(entry, Some(KeycodeParams::layer(layer))));
                }
            }
        }

        // The family nibble is stripped before reading the payload byte, so
        // only the low nibble of the layer / modifier byte survives decoding.
        let payload = code & !FAMILY_MASK;
        let tap = self
            .catalog
            .entry_for_code(payload & 0xFF)
            .map(|e| e.id.clone());

        for entry in self.catalog.layer_tap_entries() {
            if let EntryKind::LayerTap { base } = entry.kind {
                if code & FAMILY_MASK == base {
                    let params = KeycodeParams {
                        layer: Some(((payload >> 8) & LAYER_MASK) as u8),
                        tap: tap.clone(),
                        modifier: None,
                    };
                    return Some(self.describe(entry, Some(params)));
                }
            }
        }

        for entry in self.catalog.mod_tap_entries() {
            if let EntryKind::ModTap { base } = entry.kind {
                if code & FAMILY_MASK == base {
                    let bits = (payload >> 8) as u8;
                    let params = KeycodeParams {
                        layer: None,
                        tap: tap.clone(),
                        modifier: self.catalog.modifier_for_bits(bits).map(str::to_string),
                    };
                    return Some(self.describe(entry, Some(params)));
                }
            }
        }

        None
    }

    /// Cap label for any code, including ones the catalog does not know.
    pub fn decode_label(&self, code: u16) -> KeycodeLabel {
        match self.decode(code) {
            Some(decoded) if decoded.id == TRANSPARENT_ID => KeycodeLabel::new(""),
            Some(decoded) => decoded.label,
            None => fallback_label(code),
        }
    }

    /// Every basic entry with its rendered label, in catalog order.
    pub fn key_options(&self) -> Vec<KeyOption> {
        self.catalog
            .entries()
            .iter()
            .filter_map(|entry| {
                entry.basic_code().map(|code| KeyOption {
                    code,
                    id: entry.id.clone(),
                    label: self.make_label(entry, None),
                    group: entry.group,
                })
            })
            .collect()
    }

    // ── Labels ────────────────────────────────────────────────────────────────

    fn describe(&self, entry: &CatalogEntry, params: Option<KeycodeParams>) -> DecodedKeycode {
        DecodedKeycode {
            id: entry.id.clone(),
            label: self.make_label(entry, params.as_ref()),
            params,
            requires: entry.requires.clone(),
        }
    }

    fn make_label(&self, entry: &CatalogEntry, params: Option<&KeycodeParams>) -> KeycodeLabel {
        let legend = resolve_legend(entry, self.os_profile);
        let layer = params.and_then(|p| p.layer).unwrap_or(0);
        let tap_label = params
            .and_then(|p| p.tap.as_deref())
            .and_then(|tap| self.catalog.get(tap))
            .map(|tap| resolve_legend(tap, self.os_profile).label);

        match entry.kind {
            EntryKind::Basic { code } if entry.group == KeycodeGroup::Number => {
                let index = code.wrapping_sub(NUMBER_ROW_START) as usize;
                match SHIFTED_DIGITS.get(index) {
                    Some(shifted) => {
                        KeycodeLabel::with_secondary(*shifted, ((index + 1) % 10).to_string())
                    }
                    None => KeycodeLabel::new(legend.label),
                }
            }
            EntryKind::Basic { .. } => KeycodeLabel::new(legend.label),
            EntryKind::Layer { .. } => {
                let primary = match &legend.short {
                    Some(short) => format!("{short}({layer})"),
                    None => format!("Layer {layer}"),
                };
                KeycodeLabel::with_secondary(primary, legend.label)
            }
            EntryKind::LayerTap { .. } => KeycodeLabel {
                primary: format!("L{layer}"),
                secondary: tap_label,
            },
            EntryKind::ModTap { .. } => {
                let modifier = params
                    .and_then(|p| p.modifier.clone())
                    .unwrap_or_else(|| "?".to_string());
                let name = legend.short.unwrap_or(legend.label);
                KeycodeLabel {
                    primary: format!("{name}({modifier})"),
                    secondary: tap_label,
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
