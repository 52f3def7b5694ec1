//! Symbolic action names used by `simpleAction` bindings.
//!
//! An action either names a keycode (`KEY_A` → `KC_A`, or `KC:<id>` verbatim)
//! or a host-side system command (`OPEN_WEBSITE`, `PASTE_TEXT`, ...).  Only the
//! keycode kind can be written to a direct-keymap device.

use std::collections::BTreeMap;

/// Prefix naming a catalog keycode id directly.
pub const KEYCODE_ACTION_PREFIX: &str = "KC:";

const KEYCODE_ACTIONS: &[(&str, &str)] = &[
    // Alpha
    ("KEY_A", "KC_A"),
    ("KEY_B", "KC_B"),
    ("KEY_C", "KC_C"),
    ("KEY_D", "KC_D"),
    ("KEY_E", "KC_E"),
    ("KEY_F", "KC_F"),
    ("KEY_G", "KC_G"),
    ("KEY_H", "KC_H"),
    ("KEY_I", "KC_I"),
    ("KEY_J", "KC_J"),
    ("KEY_K", "KC_K"),
    ("KEY_L", "KC_L"),
    ("KEY_M", "KC_M"),
    ("KEY_N", "KC_N"),
    ("KEY_O", "KC_O"),
    ("KEY_P", "KC_P"),
    ("KEY_Q", "KC_Q"),
    ("KEY_R", "KC_R"),
    ("KEY_S", "KC_S"),
    ("KEY_T", "KC_T"),
    ("KEY_U", "KC_U"),
    ("KEY_V", "KC_V"),
    ("KEY_W", "KC_W"),
    ("KEY_X", "KC_X"),
    ("KEY_Y", "KC_Y"),
    ("KEY_Z", "KC_Z"),
    // Digits
    ("DIGIT_0", "KC_0"),
    ("DIGIT_1", "KC_1"),
    ("DIGIT_2", "KC_2"),
    ("DIGIT_3", "KC_3"),
    ("DIGIT_4", "KC_4"),
    ("DIGIT_5", "KC_5"),
    ("DIGIT_6", "KC_6"),
    ("DIGIT_7", "KC_7"),
    ("DIGIT_8", "KC_8"),
    ("DIGIT_9", "KC_9"),
    // Punctuation and editing
    ("MINUS", "KC_MINUS"),
    ("EQUALS", "KC_EQUAL"),
    ("LBRACKET", "KC_LBRC"),
    ("RBRACKET", "KC_RBRC"),
    ("BACKSLASH", "KC_BSLS"),
    ("SEMICOLON", "KC_SCLN"),
    ("QUOTE", "KC_QUOT"),
    ("BACKTICK", "KC_GRV"),
    ("COMMA", "KC_COMM"),
    ("PERIOD", "KC_DOT"),
    ("SLASH", "KC_SLSH"),
    ("SPACE", "KC_SPACE"),
    ("TAB", "KC_TAB"),
    ("ENTER", "KC_ENTER"),
    ("BACKSPACE", "KC_BSPC"),
    ("ESC", "KC_ESC"),
    ("CAPSLOCK", "KC_CAPS"),
    // Navigation
    ("ARROW_UP", "KC_UP"),
    ("ARROW_DOWN", "KC_DOWN"),
    ("ARROW_LEFT", "KC_LEFT"),
    ("ARROW_RIGHT", "KC_RIGHT"),
    ("HOME", "KC_HOME"),
    ("END", "KC_END"),
    // Function
    ("F1", "KC_F1"),
    ("F2", "KC_F2"),
    ("F3", "KC_F3"),
    ("F4", "KC_F4"),
    ("F5", "KC_F5"),
    // Numpad
    ("NUMPAD_0", "KC_P0"),
    ("NUMPAD_1", "KC_P1"),
    ("NUMPAD_2", "KC_P2"),
    ("NUMPAD_PLUS", "KC_PPLS"),
    ("NUMPAD_ENTER", "KC_PENT"),
    // Modifiers
    ("LCTRL", "KC_LCTL"),
    ("LSHIFT", "KC_LSFT"),
    ("LALT", "KC_LALT"),
    ("LGUI", "KC_LGUI"),
    ("RCTRL", "KC_RCTL"),
    ("RSHIFT", "KC_RSFT"),
    ("RALT", "KC_RALT"),
    ("RGUI", "KC_RGUI"),
    // Media
    ("VOLUME_UP", "KC_VOLU"),
    ("VOLUME_DOWN", "KC_VOLD"),
    ("VOLUME_TOGGLE_MUTE", "KC_MUTE"),
    // Mouse
    ("MOUSE_LEFT", "KC_BTN1"),
    ("MOUSE_RIGHT", "KC_BTN2"),
    ("MOUSE_MIDDLE", "KC_BTN3"),
    ("MOUSE_BUTTON_4", "KC_BTN4"),
    ("MOUSE_BUTTON_5", "KC_BTN5"),
];

/// System actions and the argument slot the user-supplied arg fills.
const SYSTEM_ACTIONS: &[(&str, &str, &str)] = &[
    ("OPEN_FILE", "path", "{file}"),
    ("OPEN_FOLDER", "path", "{folder}"),
    ("OPEN_WEBSITE", "url", "{url}"),
    ("PASTE_TEXT", "text", "{text}"),
    ("SARCASIFY_TEXT", "text", "{text}"),
];

/// A host-side command with its arguments filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPlan {
    pub op: String,
    pub args: BTreeMap<String, String>,
}

/// What a symbolic action resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionIntent {
    /// A catalog keycode id (not yet checked against any catalog).
    Keycode(String),
    System(SystemPlan),
}

/// Resolves an action name.  `arg` replaces the placeholder argument of a
/// system action and is ignored for keycode actions.
pub fn resolve_action(action: &str, arg: Option<&str>) -> Option<ActionIntent> {
    if let Some(keycode_id) = action.strip_prefix(KEYCODE_ACTION_PREFIX) {
        return Some(ActionIntent::Keycode(keycode_id.to_string()));
    }

    if let Some((_, keycode_id)) = KEYCODE_ACTIONS.iter().find(|(name, _)| *name == action) {
        return Some(ActionIntent::Keycode((*keycode_id).to_string()));
    }

    SYSTEM_ACTIONS
        .iter()
        .find(|(name, _, _)| *name == action)
        .map(|(name, slot, placeholder)| {
            let value = arg.filter(|a| !a.is_empty()).unwrap_or(placeholder);
            ActionIntent::System(SystemPlan {
                op: (*name).to_string(),
                args: BTreeMap::from([((*slot).to_string(), value.to_string())]),
            })
        })
}

/// Every named keycode action, in table order.
pub fn keycode_actions() -> impl Iterator<Item = (&'static str, &'static str)> {
    KEYCODE_ACTIONS.iter().copied()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keycode::{CatalogId, CatalogRegistry, OsProfile};

    #[test]
    fn test_named_action_resolves_to_keycode() {
        assert_eq!(
            resolve_action("KEY_A", None),
            Some(ActionIntent::Keycode("KC_A".into()))
        );
    }

    #[test]
    fn test_prefixed_action_passes_id_through() {
        assert_eq!(
            resolve_action("KC:KC_F12", None),
            Some(ActionIntent::Keycode("KC_F12".into()))
        );
    }

    #[test]
    fn test_system_action_fills_argument() {
        // Act
        let intent = resolve_action("OPEN_WEBSITE", Some("https://example.org"));

        // Assert
        let Some(ActionIntent::System(plan)) = intent else {
            panic!("expected system plan, got {intent:?}");
        };
        assert_eq!(plan.op, "OPEN_WEBSITE");
        assert_eq!(plan.args.get("url").map(String::as_str), Some("https://example.org"));
    }

    #[test]
    fn test_system_action_keeps_placeholder_without_arg() {
        let Some(ActionIntent::System(plan)) = resolve_action("PASTE_TEXT", None) else {
            panic!("expected system plan");
        };
        assert_eq!(plan.args.get("text").map(String::as_str), Some("{text}"));
    }

    #[test]
    fn test_unknown_action_is_none() {
        assert_eq!(resolve_action("LAUNCH_ROCKET", None), None);
    }

    #[test]
    fn test_every_named_action_exists_in_default_catalog() {
        let registry = CatalogRegistry::new(CatalogId::Default, OsProfile::Default)
            .expect("bundled catalog");
        let catalog = registry.active();
        for (name, keycode_id) in keycode_actions() {
            assert!(
                catalog.get(keycode_id).is_some(),
                "{name} points at missing keycode {keycode_id}"
            );
        }
    }
}
