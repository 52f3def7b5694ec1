//! Translation of symbolic bindings for direct-keymap (VIA) devices.
//!
//! A `via-direct` device stores one numeric keycode per slot plus simple
//! macros.  Before a binding is sent to such a device:
//!
//! - `simpleAction` is resolved to a keycode and its `arg` set to `0xNNNN`;
//!   layer, layer-tap and mod-tap keycodes take their parameters from the
//!   original `arg` (`"2"`, `"1,KC_SPC"`, `"LSFT,KC_A"`, or a JSON object);
//! - `sequenceRef` is expanded into an `inlineSequence` of normalized steps;
//! - `inlineSequence` steps are normalized in place;
//! - `program` bindings are rejected.
//!
//! Translation is all-or-nothing: the first failing step rejects the binding.

use keystudio_core::keycode::{format_code, CodecError, EntryKind, KeycodeCodec, KeycodeParams};
use keystudio_core::profile::{resolve_action, ActionIntent, Binding, Sequence, Step};
use serde_json::Value;
use thiserror::Error;

/// Largest delay a VIA macro can encode, in milliseconds.
pub const MAX_VIA_DELAY_MS: u32 = 65_535;

/// Highest layer of a layer keycode (`MO`, `TG`, `TT`).
pub const MAX_LAYER: u8 = 63;

/// Highest layer of a layer-tap keycode; the layer shares a nibble with the
/// keycode family.
pub const MAX_LAYER_TAP_LAYER: u8 = 15;

const KEYCODE_ID_PREFIX: &str = "KC_";
const KEYCODE_ACTION_PREFIX: &str = "KC:";
const DELAY_OPS: &[&str] = &["WAIT", "DELAY"];
const KEY_OPS: &[&str] = &[
    "TAP", "KEY", "PRESS", "KD", "KEY_DOWN", "KEYDOWN", "DOWN", "KU", "KEY_UP", "KEYUP", "UP",
];

/// Why a binding cannot be written to a direct-keymap device.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    /// The action names no keycode (unknown, or a host-side system action).
    #[error("VIA keycode could not be resolved from action '{0}'")]
    UnresolvedAction(String),

    /// The action names a keycode the active catalog does not contain.
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("sequence '{0}' not found for binding")]
    SequenceNotFound(String),

    #[error("delay must be 0-{MAX_VIA_DELAY_MS} ms for VIA macros, got '{0}'")]
    DelayOutOfRange(String),

    #[error("unsupported macro op '{0}'")]
    UnsupportedOp(String),

    #[error("unrecognized keycode '{0}'")]
    UnrecognizedKeycode(String),

    /// A layer, layer-tap or mod-tap keycode without usable parameters.
    #[error("keycode '{keycode}' needs valid parameters, got '{arg}'")]
    InvalidParams { keycode: String, arg: String },

    /// Only keycode and sequence bindings can be stored.
    #[error("VIA only supports keycode or sequence bindings, not {0}")]
    UnsupportedBinding(&'static str),
}

/// Translates `binding` into what a direct-keymap device accepts.
///
/// `sequences` is the profile's sequence library, used to expand
/// `sequenceRef` bindings.
///
/// # Errors
///
/// Returns the first [`TranslationError`] encountered; nothing is partially
/// translated.
pub fn translate_for_via(
    binding: &Binding,
    codec: &KeycodeCodec,
    sequences: &[Sequence],
) -> Result<Binding, TranslationError> {
    match binding {
        Binding::None => Ok(Binding::None),
        Binding::SimpleAction { action, arg, meta } => {
            let code = encode_action(action, arg.as_deref(), codec)?;
            Ok(Binding::SimpleAction {
                action: action.clone(),
                arg: Some(format_code(code)),
                meta: meta.clone(),
            })
        }
        Binding::SequenceRef { sequence_id, meta } => {
            let sequence = sequences
                .iter()
                .find(|s| &s.id == sequence_id)
                .ok_or_else(|| TranslationError::SequenceNotFound(sequence_id.clone()))?;
            let steps = normalize_steps(&sequence.steps, codec)?;
            let mut meta = meta.clone().unwrap_or_default();
            meta.insert("sequenceId".into(), Value::String(sequence_id.clone()));
            Ok(Binding::InlineSequence {
                steps,
                meta: Some(meta),
            })
        }
        Binding::InlineSequence { steps, meta } => Ok(Binding::InlineSequence {
            steps: normalize_steps(steps, codec)?,
            meta: meta.clone(),
        }),
        Binding::Program { .. } => Err(TranslationError::UnsupportedBinding(binding.kind_name())),
    }
}

/// Resolves a `simpleAction` name to a firmware keycode.
fn encode_action(
    action: &str,
    arg: Option<&str>,
    codec: &KeycodeCodec,
) -> Result<u16, TranslationError> {
    let keycode_id = match resolve_action(action, arg) {
        Some(ActionIntent::Keycode(id)) => id,
        Some(ActionIntent::System(_)) => {
            return Err(TranslationError::UnresolvedAction(action.to_string()))
        }
        None if action.starts_with(KEYCODE_ID_PREFIX) => action.to_string(),
        None => return Err(TranslationError::UnresolvedAction(action.to_string())),
    };
    let kind = codec
        .catalog()
        .get(&keycode_id)
        .map(|entry| entry.kind)
        .ok_or_else(|| CodecError::NotFound(keycode_id.clone()))?;
    if let EntryKind::Basic { code } = kind {
        return Ok(code);
    }

    let arg = arg.unwrap_or_default().trim();
    let params = parse_params(kind, arg, codec).ok_or_else(|| TranslationError::InvalidParams {
        keycode: keycode_id.clone(),
        arg: arg.to_string(),
    })?;
    Ok(codec.encode(&keycode_id, Some(&params))?)
}

/// Parses and validates the parameters of a non-basic keycode.
///
/// Accepts a comma list in parameter order (`"2"`, `"1,KC_SPC"`,
/// `"LSFT,KC_A"`) or a JSON object such as `{"mod":"LSFT","tap":"A"}`.
fn parse_params(kind: EntryKind, arg: &str, codec: &KeycodeCodec) -> Option<KeycodeParams> {
    let params = if arg.starts_with('{') {
        let params: KeycodeParams = serde_json::from_str(arg).ok()?;
        KeycodeParams {
            tap: params.tap.as_deref().map(keycode_id),
            modifier: params.modifier.map(|m| m.to_ascii_uppercase()),
            ..params
        }
    } else {
        let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
        match (kind, parts.as_slice()) {
            (EntryKind::Layer { .. }, [layer]) => KeycodeParams::layer(layer.parse().ok()?),
            (EntryKind::LayerTap { .. }, [layer, tap]) => {
                KeycodeParams::layer_tap(layer.parse().ok()?, keycode_id(tap))
            }
            (EntryKind::ModTap { .. }, [modifier, tap]) => {
                KeycodeParams::mod_tap(modifier.to_ascii_uppercase(), keycode_id(tap))
            }
            _ => return None,
        }
    };

    let catalog = codec.catalog();
    let tap_ok = || params.tap.as_deref().and_then(|t| catalog.basic_code(t)).is_some();
    let valid = match kind {
        EntryKind::Basic { .. } => false,
        EntryKind::Layer { .. } => params.layer.is_some_and(|l| l <= MAX_LAYER),
        EntryKind::LayerTap { .. } => {
            params.layer.is_some_and(|l| l <= MAX_LAYER_TAP_LAYER) && tap_ok()
        }
        EntryKind::ModTap { .. } => {
            params
                .modifier
                .as_deref()
                .and_then(|m| catalog.modifier_bits(m))
                .is_some()
                && tap_ok()
        }
    };
    valid.then_some(params)
}

/// Upper-cased keycode id with the `KC:` prefix stripped and `KC_` added.
fn keycode_id(arg: &str) -> String {
    let upper = arg.trim().to_ascii_uppercase();
    let id = upper.strip_prefix(KEYCODE_ACTION_PREFIX).unwrap_or(&upper);
    if id.starts_with(KEYCODE_ID_PREFIX) {
        id.to_string()
    } else {
        format!("{KEYCODE_ID_PREFIX}{id}")
    }
}

/// Normalizes macro steps: delays become `WAIT` with a decimal millisecond
/// arg; key ops are upper-cased with a `0xNNNN` keycode arg.
///
/// # Errors
///
/// Fails on the first delay out of range, unknown op, or unresolvable key.
pub fn normalize_steps(steps: &[Step], codec: &KeycodeCodec) -> Result<Vec<Step>, TranslationError> {
    steps
        .iter()
        .map(|step| {
            let op = step.op.trim().to_ascii_uppercase();
            let arg = step.arg.as_deref().unwrap_or_default().trim();

            if DELAY_OPS.contains(&op.as_str()) {
                let ms = parse_delay(arg)
                    .ok_or_else(|| TranslationError::DelayOutOfRange(arg.to_string()))?;
                return Ok(Step {
                    op: "WAIT".into(),
                    arg: Some(ms.to_string()),
                    ..step.clone()
                });
            }

            if !KEY_OPS.contains(&op.as_str()) {
                return Err(TranslationError::UnsupportedOp(step.op.clone()));
            }

            let code = parse_keycode_arg(arg, codec)
                .ok_or_else(|| TranslationError::UnrecognizedKeycode(arg.to_string()))?;
            Ok(Step {
                op,
                arg: Some(format_code(code)),
                ..step.clone()
            })
        })
        .collect()
}

/// Delay in ms; an empty arg means zero.
fn parse_delay(arg: &str) -> Option<u32> {
    if arg.is_empty() {
        return Some(0);
    }
    arg.parse::<u32>().ok().filter(|ms| *ms <= MAX_VIA_DELAY_MS)
}

/// Accepts `0x`-prefixed hex, plain decimal, or a keycode id with or without
/// the `KC_` / `KC:` prefix.
fn parse_keycode_arg(arg: &str, codec: &KeycodeCodec) -> Option<u16> {
    if arg.is_empty() {
        return None;
    }
    if let Some(hex) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        return u16::from_str_radix(hex, 16).ok();
    }
    if arg.bytes().all(|b| b.is_ascii_digit()) {
        return arg.parse().ok();
    }

    codec.encode(&keycode_id(arg), None).ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
