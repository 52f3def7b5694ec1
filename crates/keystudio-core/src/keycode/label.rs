//! Presentation of keycodes: OS-profile legend overrides and the fallback
//! labels for codes the catalog does not know.
//!
//! Nothing here affects the numeric encode/decode contract.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::catalog::CatalogEntry;

/// Codes reserved for firmware-defined user keycodes.
pub const USER_RANGE: RangeInclusive<u16> = 0x00A0..=0x00DF;

/// Codes reserved for keyboard-specific custom keycodes.
pub const CUSTOM_RANGE: RangeInclusive<u16> = 0x5F80..=0x7FFF;

/// Which platform's key names to show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsProfile {
    #[default]
    Default,
    Mac,
    Win,
    Linux,
}

impl OsProfile {
    /// Parses a user-supplied profile name.  Accepts `mac`/`darwin`,
    /// `win`/`windows`, `linux`, and `default`, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Some(Self::Default),
            "mac" | "darwin" | "macos" => Some(Self::Mac),
            "win" | "windows" => Some(Self::Win),
            "linux" => Some(Self::Linux),
            _ => None,
        }
    }

    /// Profile matching the operating system this binary was built for.
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "macos" => Self::Mac,
            "windows" => Self::Win,
            "linux" => Self::Linux,
            _ => Self::Default,
        }
    }
}

/// Optional legend fields supplied by one override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayLegend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// Per-profile legend overrides attached to a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DisplayLegend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<DisplayLegend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win: Option<DisplayLegend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<DisplayLegend>,
}

impl DisplayOverrides {
    fn for_profile(&self, os: OsProfile) -> Option<&DisplayLegend> {
        match os {
            OsProfile::Default => self.default.as_ref(),
            OsProfile::Mac => self.mac.as_ref(),
            OsProfile::Win => self.win.as_ref(),
            OsProfile::Linux => self.linux.as_ref(),
        }
    }
}

/// Fully resolved legend for one entry under one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Legend {
    pub label: String,
    pub short: Option<String>,
    pub symbol: Option<String>,
}

/// Two-line key cap text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycodeLabel {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

impl KeycodeLabel {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    pub fn with_secondary(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: Some(secondary.into()),
        }
    }
}

/// Resolves each legend field: profile override, then `default` override,
/// then the entry's built-in value.
pub fn resolve_legend(entry: &CatalogEntry, os: OsProfile) -> Legend {
    let display = entry.display.as_ref();
    let specific = display.and_then(|d| d.for_profile(os));
    let fallback = display.and_then(|d| d.default.as_ref());

    let pick = |field: fn(&DisplayLegend) -> Option<&String>| {
        specific
            .and_then(field)
            .or_else(|| fallback.and_then(field))
            .cloned()
    };

    Legend {
        label: pick(|l| l.label.as_ref()).unwrap_or_else(|| entry.label.clone()),
        short: pick(|l| l.short.as_ref()).or_else(|| entry.short_label.clone()),
        symbol: pick(|l| l.symbol.as_ref()),
    }
}

/// `0x00A5` style rendering of a raw code.
pub fn format_code(code: u16) -> String {
    format!("0x{code:04X}")
}

/// Label for a code that decodes to no catalog entry.
pub fn fallback_label(code: u16) -> KeycodeLabel {
    if USER_RANGE.contains(&code) {
        KeycodeLabel::with_secondary(format!("User {}", code - USER_RANGE.start()), format_code(code))
    } else if CUSTOM_RANGE.contains(&code) {
        KeycodeLabel::with_secondary("Custom", format_code(code))
    } else {
        KeycodeLabel::with_secondary("Unknown", format_code(code))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
