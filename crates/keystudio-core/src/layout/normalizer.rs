//! VIA layout descriptor → [`NormalizedLayout`].
//!
//! The descriptor is a loosely typed JSON document whose `layouts.keymap`
//! value is an array of rows.  Each row mixes three kinds of cells:
//!
//! - `"2,5"` – a matrix key at row 2, column 5;
//! - any other string – a decorative or control block (encoders, OLEDs, …);
//! - `{ "x": 0.5, "w": 1.5 }` – a directive that moves the cursor or sets the
//!   size of the *next* real cell.
//!
//! Normalization never fails hard.  Every outcome is a
//! [`NormalizationResult`]: an optional layout plus diagnostics.  A `None`
//! layout always comes with at least one `Error` diagnostic.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::encoder::{EncoderAssignment, EncoderGrouper, MatrixHint, MAX_ENCODER_SPAN};
use super::model::{ControlElement, ControlFlags, ControlKind, KeyElement, NormalizedLayout};

const KEYMAP_PATH: &str = "layouts.keymap";
/// Marker for encoder blocks: a newline followed by `e`.
const ENCODER_MARKER: &str = "\ne";

/// Severity of a normalization diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Info,
    Warning,
    Error,
}

/// One finding about the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            level,
            message: message.into(),
            path,
        }
    }
}

/// Layout (if usable) plus everything worth telling the user about the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub layout: Option<NormalizedLayout>,
    pub diagnostics: Vec<Diagnostic>,
}

impl NormalizationResult {
    fn failed(
        message: impl Into<String>,
        path: Option<String>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Self {
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, message, path));
        Self {
            layout: None,
            diagnostics,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
    }
}

/// Parses descriptor text and normalizes it.
pub fn normalize_via_layout_str(text: &str) -> NormalizationResult {
    match serde_json::from_str::<Value>(text) {
        Ok(raw) => normalize_via_layout(&raw),
        Err(e) => NormalizationResult::failed(
            format!("Layout descriptor is not valid JSON: {e}"),
            None,
            Vec::new(),
        ),
    }
}

/// Normalizes a VIA-style layout descriptor.
///
/// Block ids (`blk-001`, …) and encoder ids restart for every call, so
/// normalizing the same descriptor twice yields equal layouts.
pub fn normalize_via_layout(raw: &Value) -> NormalizationResult {
    let Some(rows) = raw.pointer("/layouts/keymap").and_then(Value::as_array) else {
        return NormalizationResult::failed(
            "Missing or invalid layouts.keymap array.",
            Some(KEYMAP_PATH.to_string()),
            Vec::new(),
        );
    };

    let mut walker = Walker::default();
    for (row_index, row) in rows.iter().enumerate() {
        match row.as_array() {
            Some(cells) => walker.walk_row(row_index, cells),
            None => walker.warn(
                format!("Row {row_index} is not an array; skipping."),
                format!("{KEYMAP_PATH}[{row_index}]"),
            ),
        }
    }

    let Walker {
        keys,
        controls,
        diagnostics,
        ..
    } = walker;

    debug!(
        keys = keys.len(),
        controls = controls.len(),
        diagnostics = diagnostics.len(),
        "normalized VIA layout"
    );

    match NormalizedLayout::new(keys, controls) {
        Some(layout) => NormalizationResult {
            layout: Some(layout),
            diagnostics,
        },
        None => NormalizationResult::failed(
            "No keys or controls found after normalization.",
            Some(KEYMAP_PATH.to_string()),
            diagnostics,
        ),
    }
}

// ── Row walker ────────────────────────────────────────────────────────────────

/// Cursor position and the size the next real cell will take.
struct Cursor {
    x: f64,
    y: f64,
    next_w: f64,
    next_h: f64,
}

impl Cursor {
    fn at_row(row_index: usize) -> Self {
        Self {
            x: 0.0,
            y: row_index as f64,
            next_w: 1.0,
            next_h: 1.0,
        }
    }

    fn consume(&mut self) -> (f64, f64, f64, f64) {
        let rect = (self.x, self.y, self.next_w, self.next_h);
        self.x += self.next_w;
        self.next_w = 1.0;
        self.next_h = 1.0;
        rect
    }
}

#[derive(Default)]
struct Walker {
    keys: Vec<KeyElement>,
    controls: Vec<ControlElement>,
    diagnostics: Vec<Diagnostic>,
    key_ids: HashSet<String>,
    blocks_emitted: usize,
    grouper: EncoderGrouper,
}

impl Walker {
    fn warn(&mut self, message: String, path: String) {
        self.diagnostics
            .push(Diagnostic::new(DiagnosticLevel::Warning, message, Some(path)));
    }

    fn walk_row(&mut self, row_index: usize, cells: &[Value]) {
        let mut cursor = Cursor::at_row(row_index);
        for (col_index, cell) in cells.iter().enumerate() {
            let path = format!("{KEYMAP_PATH}[{row_index}][{col_index}]");
            match cell {
                Value::String(raw) => {
                    let rect = cursor.consume();
                    if is_coordinate(raw.trim()) {
                        self.emit_key(raw.trim(), rect, path);
                    } else {
                        self.emit_control(raw, rect, path);
                    }
                }
                Value::Object(directive) => {
                    let mut recognised = false;
                    if let Some(dx) = directive.get("x").and_then(Value::as_f64) {
                        cursor.x += dx;
                        recognised = true;
                    }
                    if let Some(dy) = directive.get("y").and_then(Value::as_f64) {
                        cursor.y += dy;
                        recognised = true;
                    }
                    if let Some(w) = directive.get("w").and_then(Value::as_f64) {
                        cursor.next_w = w;
                        recognised = true;
                    }
                    if let Some(h) = directive.get("h").and_then(Value::as_f64) {
                        cursor.next_h = h;
                        recognised = true;
                    }
                    if !recognised {
                        self.diagnostics.push(Diagnostic::new(
                            DiagnosticLevel::Info,
                            "Directive has no numeric x/y/w/h fields; ignoring.",
                            Some(path),
                        ));
                    }
                }
                _ => self.warn(format!("Unsupported cell {cell}; skipping."), path),
            }
        }
    }

    fn emit_key(&mut self, coordinate: &str, (x, y, w, h): (f64, f64, f64, f64), path: String) {
        let Some(hint) = parse_coordinate(coordinate) else {
            self.warn(format!("Unparseable key id \"{coordinate}\"."), path);
            return;
        };
        let element_id = format!("key:{coordinate}");
        if !self.key_ids.insert(element_id.clone()) {
            self.warn(format!("Duplicate key {coordinate}; skipping."), path);
            return;
        }
        self.keys.push(KeyElement {
            element_id,
            matrix_row_col: Some(coordinate.to_string()),
            row: hint.row,
            col: hint.col,
            x,
            y,
            w,
            h,
            rotation: None,
        });
    }

    fn emit_control(&mut self, raw: &str, (x, y, w, h): (f64, f64, f64, f64), path: String) {
        self.blocks_emitted += 1;
        let element_id = format!("blk-{:03}", self.blocks_emitted);

        let first_line = raw.split('\n').next().unwrap_or_default().trim();
        let matrix_hint = is_coordinate(first_line).then(|| first_line.to_string());
        let is_encoder = raw.contains(ENCODER_MARKER);

        let encoder_id = is_encoder.then(|| {
            let hint = matrix_hint.as_deref().and_then(parse_coordinate);
            let assignment = self.grouper.assign(hint);
            if let EncoderAssignment::Overflow(_) = assignment {
                self.warn(
                    format!(
                        "Encoder group spans more than {MAX_ENCODER_SPAN} blocks; \
                         {element_id} starts a new encoder."
                    ),
                    path.clone(),
                );
            }
            assignment.encoder_id()
        });

        self.controls.push(ControlElement {
            element_id,
            kind: if is_encoder {
                ControlKind::EncoderBlock
            } else {
                ControlKind::Block
            },
            x,
            y,
            w,
            h,
            rotation: None,
            raw_label: Some(raw.to_string()),
            matrix_hint,
            layout_index: self.blocks_emitted - 1,
            encoder_id,
            flags: ControlFlags {
                encoder: is_encoder,
            },
        });
    }
}

/// Strict `digits,digits` check.
fn is_coordinate(text: &str) -> bool {
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    text.split_once(',')
        .is_some_and(|(row, col)| is_digits(row) && is_digits(col))
}

fn parse_coordinate(text: &str) -> Option<MatrixHint> {
    let (row, col) = text.split_once(',')?;
    Some(MatrixHint {
        row: row.parse().ok()?,
        col: col.parse().ok()?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_keymap_is_single_fatal_error() {
        // Arrange
        let raw = json!({ "name": "No layout" });

        // Act
        let result = normalize_via_layout(&raw);

        // Assert
        assert!(result.layout.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].level, DiagnosticLevel::Error);
        assert_eq!(result.diagnostics[0].path.as_deref(), Some("layouts.keymap"));
    }

    #[test]
    fn test_keymap_that_is_not_an_array_is_fatal() {
        let result = normalize_via_layout(&json!({ "layouts": { "keymap": "0,0" } }));
        assert!(result.layout.is_none());
        assert!(result.has_errors());
    }

    #[test]
    fn test_only_directives_yields_no_elements_error() {
        let raw = json!({ "layouts": { "keymap": [[{ "x": 1 }, { "w": 2 }]] } });

        let result = normalize_via_layout(&raw);

        assert!(result.layout.is_none());
        let last = result.diagnostics.last().expect("diagnostic");
        assert_eq!(last.level, DiagnosticLevel::Error);
        assert_eq!(last.message, "No keys or controls found after normalization.");
    }

    #[test]
    fn test_keys_follow_cursor_and_pending_size() {
        // Arrange
        let raw = json!({ "layouts": { "keymap": [
            ["0,0", { "w": 2 }, "0,1", { "x": 0.5 }, "0,2"],
            [{ "h": 2 }, "1,0"]
        ] } });

        // Act
        let layout = normalize_via_layout(&raw).layout.expect("layout");

        // Assert
        let positions: Vec<(&str, f64, f64, f64, f64)> = layout
            .keys
            .iter()
            .map(|k| (k.element_id.as_str(), k.x, k.y, k.w, k.h))
            .collect();
        assert_eq!(
            positions,
            vec![
                ("key:0,0", 0.0, 0.0, 1.0, 1.0),
                ("key:0,1", 1.0, 0.0, 2.0, 1.0),
                ("key:0,2", 3.5, 0.0, 1.0, 1.0),
                ("key:1,0", 0.0, 1.0, 1.0, 2.0),
            ]
        );
        assert_eq!(layout.bounds.max_x, 4.5);
        assert_eq!(layout.bounds.max_y, 3.0);
    }

    #[test]
    fn test_key_records_matrix_position() {
        let raw = json!({ "layouts": { "keymap": [[" 3,12 "]] } });
        let layout = normalize_via_layout(&raw).layout.expect("layout");
        assert_eq!(layout.keys[0].row, 3);
        assert_eq!(layout.keys[0].col, 12);
        assert_eq!(layout.keys[0].matrix_row_col.as_deref(), Some("3,12"));
    }

    #[test]
    fn test_non_coordinate_strings_become_sequential_blocks() {
        let raw = json!({ "layouts": { "keymap": [["OLED", "0,0", "logo"]] } });

        let layout = normalize_via_layout(&raw).layout.expect("layout");

        let ids: Vec<&str> = layout.controls.iter().map(|c| c.element_id.as_str()).collect();
        assert_eq!(ids, vec!["blk-001", "blk-002"]);
        assert_eq!(layout.controls[0].kind, ControlKind::Block);
        assert_eq!(layout.controls[0].encoder_id, None);
        assert_eq!(layout.controls[1].layout_index, 1);
        assert_eq!(layout.controls[1].x, 2.0);
    }

    #[test]
    fn test_encoder_blocks_group_by_adjacent_hints() {
        // Arrange
        let raw = json!({ "layouts": { "keymap": [
            ["2,0\ne0", "2,1\ne0", "legend"],
            ["3,0\ne1"]
        ] } });

        // Act
        let layout = normalize_via_layout(&raw).layout.expect("layout");

        // Assert
        let c = &layout.controls;
        assert_eq!(c[0].kind, ControlKind::EncoderBlock);
        assert!(c[0].flags.encoder);
        assert_eq!(c[0].matrix_hint.as_deref(), Some("2,0"));
        assert_eq!(c[0].encoder_id, c[1].encoder_id);
        assert_eq!(c[2].encoder_id, None);
        assert!(c[3].encoder_id.is_some());
        assert_ne!(c[3].encoder_id, c[0].encoder_id);
    }

    #[test]
    fn test_encoder_group_wider_than_three_blocks_warns() {
        let raw = json!({ "layouts": { "keymap": [
            ["0,0\ne", "0,1\ne", "0,2\ne", "0,3\ne"]
        ] } });

        let result = normalize_via_layout(&raw);

        let layout = result.layout.as_ref().expect("layout");
        assert_eq!(layout.controls[2].encoder_id, Some(0));
        assert_eq!(layout.controls[3].encoder_id, Some(1));
        assert_eq!(result.warnings().count(), 1);
    }

    #[test]
    fn test_bad_rows_and_cells_warn_but_continue() {
        let raw = json!({ "layouts": { "keymap": [
            "not a row",
            ["0,0", 42, null, "99999999999,1"]
        ] } });

        let result = normalize_via_layout(&raw);

        let layout = result.layout.as_ref().expect("layout");
        assert_eq!(layout.keys.len(), 1);
        assert_eq!(result.warnings().count(), 4);
        assert!(!result.has_errors());
    }

    #[test]
    fn test_duplicate_key_is_skipped_with_warning() {
        let raw = json!({ "layouts": { "keymap": [["0,0", "0,0"]] } });

        let result = normalize_via_layout(&raw);

        assert_eq!(result.layout.as_ref().map(|l| l.keys.len()), Some(1));
        assert_eq!(result.warnings().count(), 1);
    }

    #[test]
    fn test_normalizing_twice_is_structurally_equal() {
        let raw = json!({ "layouts": { "keymap": [
            ["0,0", "enc\ne", { "w": 1.5 }, "0,1"],
            ["1,0\ne", "1,1\ne"]
        ] } });

        let first = normalize_via_layout(&raw);
        let second = normalize_via_layout(&raw);

        assert_eq!(first, second);
    }

    #[test]
    fn test_invalid_json_text_is_fatal() {
        let result = normalize_via_layout_str("{ layouts: ");
        assert!(result.layout.is_none());
        assert!(result.has_errors());
    }

    #[test]
    fn test_targets_from_normalized_layout_include_encoder_sub_targets() {
        let raw = json!({ "layouts": { "keymap": [["0,0", "0,1\ne"]] } });
        let layout = normalize_via_layout(&raw).layout.expect("layout");
        assert_eq!(
            layout.targets(),
            vec!["key:0,0", "blk-001", "blk-001#ccw", "blk-001#cw"]
        );
    }
}
