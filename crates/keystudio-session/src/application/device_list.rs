//! Stable ordering of the device list across polls.
//!
//! Devices seen on the previous poll keep their previous relative order so
//! the list does not jump under the user's pointer.  Newly listed devices
//! are sorted by name (case-insensitive), then id, and appended.

use std::cmp::Ordering;
use std::collections::HashMap;

use keystudio_core::profile::DeviceInfo;

/// Display name of the stand-in row for a selected device that is absent.
pub const PLACEHOLDER_NAME: &str = "Previously selected";
const PLACEHOLDER_TRANSPORT: &str = "hid";

/// Result of merging a fresh device listing into the current list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListUpdate {
    pub devices: Vec<DeviceInfo>,
    /// The connected device is no longer listed; the session must close.
    pub connected_device_vanished: bool,
}

/// Orders `listed` relative to `previous`.
pub fn sort_devices(mut listed: Vec<DeviceInfo>, previous: &[DeviceInfo]) -> Vec<DeviceInfo> {
    let prior: HashMap<&str, usize> = previous
        .iter()
        .enumerate()
        .map(|(index, device)| (device.id.as_str(), index))
        .collect();

    listed.sort_by(|a, b| {
        match (prior.get(a.id.as_str()), prior.get(b.id.as_str())) {
            (Some(ia), Some(ib)) => ia.cmp(ib),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => by_name_then_id(a, b),
        }
    });
    listed
}

fn by_name_then_id(a: &DeviceInfo, b: &DeviceInfo) -> Ordering {
    let name_a = a.name.to_lowercase();
    let name_b = b.name.to_lowercase();
    if !name_a.is_empty() && !name_b.is_empty() && name_a != name_b {
        return name_a.cmp(&name_b);
    }
    a.id.to_lowercase().cmp(&b.id.to_lowercase())
}

/// Merges a fresh listing.
///
/// `selected` is the connected device, or the preferred one while
/// disconnected.  A connected device that vanished is reported so the
/// caller can force a disconnect; a preferred device that is absent while
/// disconnected is kept as a placeholder row.
pub fn reconcile_devices(
    listed: Vec<DeviceInfo>,
    previous: &[DeviceInfo],
    selected: Option<&str>,
    connected: bool,
) -> DeviceListUpdate {
    let mut devices = sort_devices(listed, previous);
    let Some(selected) = selected else {
        return DeviceListUpdate {
            devices,
            connected_device_vanished: false,
        };
    };

    let present = devices.iter().any(|d| d.id == selected);
    if present {
        return DeviceListUpdate {
            devices,
            connected_device_vanished: false,
        };
    }

    if connected {
        return DeviceListUpdate {
            devices,
            connected_device_vanished: true,
        };
    }

    devices.push(DeviceInfo::new(selected, PLACEHOLDER_NAME, PLACEHOLDER_TRANSPORT));
    DeviceListUpdate {
        devices,
        connected_device_vanished: false,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
