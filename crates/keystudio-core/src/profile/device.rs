//! Wire shapes exchanged with the device gateway.
//!
//! These mirror what a device backend reports: device identity, capability
//! flags, the profile bundle hydrated at session open, and the lightweight
//! status snapshot re-read after every mutating operation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::binding::{BindingEntry, Layer, Profile, Sequence};
use super::state::StateSnapshot;
use crate::layout::NormalizedLayout;

/// Vendor-defined HID usage page used by VIA's raw-HID interface.
pub const VIA_USAGE_PAGE: u16 = 0xFF60;
/// HID usage of VIA's raw-HID interface.
pub const VIA_USAGE: u16 = 0x61;

/// One HID interface exposed by a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HidInterface {
    pub usage_page: u16,
    pub usage: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_number: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// A device visible to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<HidInterface>,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, transport: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport: transport.into(),
            vendor_id: None,
            product_id: None,
            firmware_version: None,
            interfaces: Vec::new(),
        }
    }

    /// Whether the device exposes VIA's raw-HID interface.
    pub fn has_via_interface(&self) -> bool {
        self.interfaces
            .iter()
            .any(|i| i.usage_page == VIA_USAGE_PAGE && i.usage == VIA_USAGE)
    }
}

/// What a connected device accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Bindings can be loaded into RAM without touching flash.
    #[serde(default)]
    pub volatile_apply: bool,
    /// RAM contents can be committed to flash.
    #[serde(default)]
    pub commit: bool,
    /// The device stores a layout descriptor.
    #[serde(default)]
    pub layouts: bool,
    /// Per-key bindings can be written.
    #[serde(default)]
    pub keymap: bool,
    /// Sequences (macros) can be stored and run.
    #[serde(default, alias = "scripts")]
    pub sequences: bool,
}

impl Capabilities {
    pub fn mode(&self) -> DeviceMode {
        if self.volatile_apply && self.commit {
            DeviceMode::StudioHid
        } else if self.keymap {
            DeviceMode::ViaDirect
        } else {
            DeviceMode::ReadOnly
        }
    }
}

/// How bindings reach a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceMode {
    /// Rich bindings staged in RAM and committed to flash.
    StudioHid,
    /// One numeric keycode per slot, written directly.
    ViaDirect,
    /// Nothing can be written.
    ReadOnly,
}

/// A layer as carried in a bundle: bindings listed as entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireLayer {
    pub id: u32,
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

/// A profile as carried in a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub layers: Vec<WireLayer>,
}

impl WireProfile {
    /// Converts to the in-memory profile.  Later entries for the same slot
    /// win; `none` bindings are dropped.
    pub fn into_profile(self) -> Profile {
        let mut layers: Vec<Layer> = Vec::with_capacity(self.layers.len());
        for wire in self.layers {
            let index = match layers.iter().position(|l| l.id == wire.id) {
                Some(index) => index,
                None => {
                    layers.push(Layer::new(wire.id));
                    layers.len() - 1
                }
            };
            let layer = &mut layers[index];
            for entry in wire.bindings {
                if entry.binding.is_none() {
                    layer.bindings.remove(&entry.target_id);
                } else {
                    layer.bindings.insert(entry.target_id, entry.binding);
                }
            }
        }
        layers.sort_by_key(|l| l.id);
        Profile {
            id: self.id,
            name: self.name,
            layers,
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            id: profile.id.clone(),
            name: profile.name.clone(),
            layers: profile
                .layers
                .iter()
                .map(|layer| WireLayer {
                    id: layer.id,
                    bindings: layer
                        .bindings
                        .iter()
                        .map(|(target_id, binding)| BindingEntry {
                            target_id: target_id.clone(),
                            layer_id: Some(layer.id),
                            binding: binding.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Everything needed to hydrate a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileBundle {
    pub session_id: String,
    pub device: DeviceInfo,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub profile: WireProfile,
    /// Already-normalized layout, if the backend normalized it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<NormalizedLayout>,
    /// Raw VIA descriptor to normalize when `layout` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_layout: Option<Value>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, alias = "scripts")]
    pub sequences: Vec<Sequence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_state: Option<StateSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_state: Option<StateSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_state: Option<StateSnapshot>,
    /// Extra bindings outside the profile's layer list (layer 0 unless set).
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

/// Lightweight status re-read after mutating operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Id of the sequence currently running, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<String>,
    #[serde(default)]
    pub ram_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_state: Option<StateSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_state: Option<StateSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_state: Option<StateSnapshot>,
}

/// Result of probing a device for VIA support.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViaProbe {
    pub via_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_protocol_version: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_bytes: Option<Vec<u8>>,
}

/// Dynamic keymap read over VIA: `keymap[layer][row][col]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViaState {
    pub layer_count: u8,
    #[serde(default)]
    pub keymap: Vec<Vec<Vec<u16>>>,
}

impl ViaState {
    pub fn keycode(&self, layer: u8, row: u32, col: u32) -> Option<u16> {
        self.keymap
            .get(usize::from(layer))?
            .get(row as usize)?
            .get(col as usize)
            .copied()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
