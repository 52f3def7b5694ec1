//! The keycode catalog: an immutable, indexed table of [`CatalogEntry`] values
//! plus a modifier-id → bitmask table.
//!
//! A catalog is built once from its JSON asset by [`Catalog::from_json`] and
//! never mutated afterwards.  Construction validates two invariants:
//!
//! - every entry `id` is unique, and
//! - no alias equals another entry's `id`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::label::DisplayOverrides;

/// Version tag reported for assets that do not carry one.
pub const DEFAULT_CATALOG_VERSION: &str = "1.0.0";

/// Width of the address window owned by a `layer` entry.
pub const LAYER_WINDOW: u16 = 64;

/// Error type for catalog construction.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The asset is not valid catalog JSON.
    #[error("failed to parse catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two entries share the same id.
    #[error("duplicate keycode id in catalog: {0}")]
    DuplicateId(String),

    /// An alias shadows another entry's primary id.
    #[error("alias {alias} of {owner} collides with an existing keycode id")]
    AliasCollision { alias: String, owner: String },
}

/// Classification tag used for grouping entries in pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeycodeGroup {
    Alpha,
    Number,
    #[serde(alias = "punc")]
    Punctuation,
    #[serde(alias = "mod")]
    Modifier,
    #[serde(alias = "nav")]
    Navigation,
    Function,
    Numpad,
    #[serde(alias = "audio")]
    Media,
    Mouse,
    #[serde(alias = "rgb", alias = "backlight")]
    System,
    Macro,
    Layer,
    LayerTap,
    ModTap,
    Oneshot,
    #[serde(alias = "control")]
    Special,
    User,
}

/// Visibility / risk tier of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Common,
    Advanced,
    Danger,
}

/// The numeric shape of an entry, tagged by `"type"` in the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EntryKind {
    /// Fixed code.
    Basic { code: u16 },
    /// `base + layer`, layer in `0..64`.
    Layer { base: u16 },
    /// `base | layer << 8 | tap`; `base` must occupy only the high nibble.
    LayerTap { base: u16 },
    /// `base | mods << 8 | tap`; `base` must occupy only the high nibble.
    ModTap { base: u16 },
}

/// One keycode definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    #[serde(
        default,
        rename = "semanticId",
        skip_serializing_if = "Option::is_none"
    )]
    pub semantic_id: Option<String>,
    pub label: String,
    #[serde(
        default,
        rename = "short",
        alias = "shortLabel",
        skip_serializing_if = "Option::is_none"
    )]
    pub short_label: Option<String>,
    pub group: KeycodeGroup,
    #[serde(default)]
    pub level: Level,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayOverrides>,
    #[serde(flatten)]
    pub kind: EntryKind,
}

impl CatalogEntry {
    /// The fixed code of a `basic` entry.
    pub fn basic_code(&self) -> Option<u16> {
        match self.kind {
            EntryKind::Basic { code } => Some(code),
            _ => None,
        }
    }
}

/// Serialized form of a catalog asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub keycodes: Vec<CatalogEntry>,
    /// Modifier id → bitmask, e.g. `"LSFT" → 0x02`.
    #[serde(default)]
    pub mods: BTreeMap<String, u8>,
}

/// Summary counts reported by [`Catalog::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub version: String,
    pub total: usize,
    pub basic: usize,
    pub layer: usize,
    pub layer_tap: usize,
    pub mod_tap: usize,
    pub aliases: usize,
    pub modifiers: usize,
}

/// Immutable, indexed keycode table.
#[derive(Debug, Clone)]
pub struct Catalog {
    version: String,
    entries: Vec<CatalogEntry>,
    by_id: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
    by_code: HashMap<u16, usize>,
    layers: Vec<usize>,
    layer_taps: Vec<usize>,
    mod_taps: Vec<usize>,
    modifiers: BTreeMap<String, u8>,
}

impl Catalog {
    /// Parses and indexes a catalog asset.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] for malformed JSON and the invariant
    /// errors described in [`Catalog::from_data`].
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let data: CatalogData = serde_json::from_str(json)?;
        Self::from_data(data)
    }

    /// Indexes already-deserialized catalog data.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::DuplicateId`] if two entries share an id.
    /// - [`CatalogError::AliasCollision`] if an alias equals another entry's id.
    pub fn from_data(data: CatalogData) -> Result<Self, CatalogError> {
        let entries = data.keycodes;

        let mut by_id = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.id.clone(), index).is_some() {
                return Err(CatalogError::DuplicateId(entry.id.clone()));
            }
        }

        let mut by_alias = HashMap::new();
        let mut by_code = HashMap::new();
        let mut layers = Vec::new();
        let mut layer_taps = Vec::new();
        let mut mod_taps = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            for alias in &entry.aliases {
                if alias != &entry.id && by_id.contains_key(alias) {
                    return Err(CatalogError::AliasCollision {
                        alias: alias.clone(),
                        owner: entry.id.clone(),
                    });
                }
                by_alias.entry(alias.clone()).or_insert(index);
            }

            match entry.kind {
                // First entry wins when two basic entries share a code.
                EntryKind::Basic { code } => {
                    by_code.entry(code).or_insert(index);
                }
                EntryKind::Layer { .. } => layers.push(index),
                EntryKind::LayerTap { .. } => layer_taps.push(index),
                EntryKind::ModTap { .. } => mod_taps.push(index),
            }
        }

        let catalog = Self {
            version: data
                .version
                .unwrap_or_else(|| DEFAULT_CATALOG_VERSION.to_string()),
            entries,
            by_id,
            by_alias,
            by_code,
            layers,
            layer_taps,
            mod_taps,
            modifiers: data.mods,
        };
        catalog.warn_on_overlapping_layer_windows();
        Ok(catalog)
    }

    /// Version tag of the asset this catalog was built from.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// All entries in asset order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Looks up an entry by exact id, then by alias.
    pub fn get(&self, id_or_alias: &str) -> Option<&CatalogEntry> {
        self.by_id
            .get(id_or_alias)
            .or_else(|| self.by_alias.get(id_or_alias))
            .map(|&index| &self.entries[index])
    }

    /// The `basic` entry whose fixed code equals `code`.
    pub fn entry_for_code(&self, code: u16) -> Option<&CatalogEntry> {
        self.by_code.get(&code).map(|&index| &self.entries[index])
    }

    /// Fixed code of the basic entry named `id_or_alias`.
    pub fn basic_code(&self, id_or_alias: &str) -> Option<u16> {
        self.get(id_or_alias).and_then(CatalogEntry::basic_code)
    }

    pub(crate) fn layer_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.layers.iter().map(|&index| &self.entries[index])
    }

    pub(crate) fn layer_tap_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.layer_taps.iter().map(|&index| &self.entries[index])
    }

    pub(crate) fn mod_tap_entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.mod_taps.iter().map(|&index| &self.entries[index])
    }

    /// Entries belonging to `group`, in asset order.
    pub fn entries_in_group(&self, group: KeycodeGroup) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |entry| entry.group == group)
    }

    /// Bitmask for a modifier id such as `"LSFT"`.
    pub fn modifier_bits(&self, modifier: &str) -> Option<u8> {
        self.modifiers.get(modifier).copied()
    }

    /// Modifier id whose bitmask equals `bits` exactly.
    pub fn modifier_for_bits(&self, bits: u8) -> Option<&str> {
        self.modifiers
            .iter()
            .find(|(_, &value)| value == bits)
            .map(|(id, _)| id.as_str())
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            version: self.version.clone(),
            total: self.entries.len(),
            basic: self.basic_count(),
            layer: self.layers.len(),
            layer_tap: self.layer_taps.len(),
            mod_tap: self.mod_taps.len(),
            aliases: self.entries.iter().map(|e| e.aliases.len()).sum(),
            modifiers: self.modifiers.len(),
        }
    }

    fn basic_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.kind, EntryKind::Basic { .. }))
            .count()
    }

    /// Overlapping layer windows make decoding order-dependent.
    fn warn_on_overlapping_layer_windows(&self) {
        let windows: Vec<(&str, u32)> = self
            .layer_entries()
            .filter_map(|entry| match entry.kind {
                EntryKind::Layer { base } => Some((entry.id.as_str(), u32::from(base))),
                _ => None,
            })
            .collect();

        for (i, &(first, base_a)) in windows.iter().enumerate() {
            for &(second, base_b) in &windows[i + 1..] {
                let width = u32::from(LAYER_WINDOW);
                if base_a < base_b + width && base_b < base_a + width {
                    warn!(
                        %first,
                        %second,
                        "layer keycode windows overlap; decoding prefers the earlier entry"
                    );
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
