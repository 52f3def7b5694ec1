//! Normalized layout geometry.
//!
//! All coordinates are in abstract key units (1.0 = one standard key width).
//! A [`NormalizedLayout`] is never edited in place: repositioning an element
//! produces a new layout with recomputed bounds.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Suffix of the counter-clockwise encoder sub-target.
pub const ENCODER_CCW_SUFFIX: &str = "#ccw";
/// Suffix of the clockwise encoder sub-target.
pub const ENCODER_CW_SUFFIX: &str = "#cw";

/// Tight bounding box of all elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Bounding box of `rects` given as `(x, y, w, h)`; `None` when empty.
    pub fn enclosing(rects: impl IntoIterator<Item = (f64, f64, f64, f64)>) -> Option<Self> {
        let mut iter = rects.into_iter();
        let (x, y, w, h) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x + w, y + h);
        for (x, y, w, h) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x + w);
            max_y = max_y.max(y + h);
        }
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

/// A physical key wired to the switch matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyElement {
    pub element_id: String,
    /// Raw `"row,col"` text this key was parsed from.
    #[serde(default, alias = "matrixId")]
    pub matrix_row_col: Option<String>,
    pub row: u32,
    pub col: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

/// Kind of a non-key block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlKind {
    Block,
    #[serde(alias = "encoder-block")]
    EncoderBlock,
    Knob,
    Encoder,
    Oled,
    Button,
    Other,
}

impl ControlKind {
    pub fn is_encoder(self) -> bool {
        matches!(self, Self::EncoderBlock | Self::Encoder | Self::Knob)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    #[serde(default)]
    pub encoder: bool,
}

/// A decorative or control block that is not a matrix key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlElement {
    pub element_id: String,
    pub kind: ControlKind,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_label: Option<String>,
    /// `"row,col"` taken from the first line of the label, if it had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_hint: Option<String>,
    /// Position of the source cell in the flattened descriptor.
    pub layout_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_id: Option<u32>,
    #[serde(default)]
    pub flags: ControlFlags,
}

/// Keys and controls of one device plus their bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedLayout {
    pub keys: Vec<KeyElement>,
    pub controls: Vec<ControlElement>,
    pub bounds: Bounds,
}

impl NormalizedLayout {
    /// Builds a layout and computes its bounds; `None` if there are no elements.
    pub fn new(keys: Vec<KeyElement>, controls: Vec<ControlElement>) -> Option<Self> {
        let rects = keys
            .iter()
            .map(|k| (k.x, k.y, k.w, k.h))
            .chain(controls.iter().map(|c| (c.x, c.y, c.w, c.h)));
        let bounds = Bounds::enclosing(rects)?;
        Some(Self {
            keys,
            controls,
            bounds,
        })
    }

    pub fn element_count(&self) -> usize {
        self.keys.len() + self.controls.len()
    }

    pub fn contains_element(&self, element_id: &str) -> bool {
        self.keys.iter().any(|k| k.element_id == element_id)
            || self.controls.iter().any(|c| c.element_id == element_id)
    }

    /// Every addressable binding point: key ids, control ids, and the `#ccw`
    /// / `#cw` sub-targets of encoder controls.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.keys.iter().map(|k| k.element_id.clone()).collect();
        for control in &self.controls {
            targets.push(control.element_id.clone());
            if control.flags.encoder || control.kind.is_encoder() {
                targets.push(format!("{}{ENCODER_CCW_SUFFIX}", control.element_id));
                targets.push(format!("{}{ENCODER_CW_SUFFIX}", control.element_id));
            }
        }
        targets
    }

    pub fn target_set(&self) -> HashSet<String> {
        self.targets().into_iter().collect()
    }

    /// New layout with `element_id` moved by `(dx, dy)`.  `None` if no such element.
    pub fn with_element_offset(&self, element_id: &str, dx: f64, dy: f64) -> Option<Self> {
        if !self.contains_element(element_id) {
            return None;
        }
        let keys = self
            .keys
            .iter()
            .map(|k| {
                let mut key = k.clone();
                if key.element_id == element_id {
                    key.x += dx;
                    key.y += dy;
                }
                key
            })
            .collect();
        let controls = self
            .controls
            .iter()
            .map(|c| {
                let mut control = c.clone();
                if control.element_id == element_id {
                    control.x += dx;
                    control.y += dy;
                }
                control
            })
            .collect();
        Self::new(keys, controls)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
