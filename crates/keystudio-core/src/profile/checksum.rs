//! Structural checksum over a profile's bindable payload.
//!
//! The payload is rendered as canonical JSON (object keys sorted, `none`
//! bindings omitted, bindings ordered by target id, referenced sequences
//! ordered by id) and hashed with `h = h * 31 + unit` over its UTF-16 code
//! units in wrapping `u32` arithmetic.  The same profile therefore hashes to
//! the same value on every platform and in every release.

use serde_json::{Map, Value};

use super::binding::{Profile, Sequence};

/// Checksum of `profile` plus the sequences its bindings reference.
///
/// Sequences in `sequences` that nothing references do not contribute.
pub fn profile_checksum(profile: &Profile, sequences: &[Sequence]) -> u32 {
    hash_text(&canonical_payload(profile, sequences).to_string())
}

/// The canonical JSON value that [`profile_checksum`] hashes.
pub fn canonical_payload(profile: &Profile, sequences: &[Sequence]) -> Value {
    let layers: Vec<Value> = profile
        .layers
        .iter()
        .map(|layer| {
            // BTreeMap iteration is already sorted by target id.
            let bindings: Vec<Value> = layer
                .bindings
                .iter()
                .filter(|(_, binding)| !binding.is_none())
                .map(|(target_id, binding)| {
                    let mut entry = Map::new();
                    entry.insert("targetId".into(), Value::String(target_id.clone()));
                    entry.insert(
                        "binding".into(),
                        serde_json::to_value(binding).unwrap_or(Value::Null),
                    );
                    Value::Object(entry)
                })
                .collect();
            let mut object = Map::new();
            object.insert("id".into(), Value::from(layer.id));
            object.insert("bindings".into(), Value::Array(bindings));
            Value::Object(object)
        })
        .collect();

    let referenced = profile.referenced_sequences();
    let mut used: Vec<&Sequence> = sequences
        .iter()
        .filter(|s| referenced.contains(s.id.as_str()))
        .collect();
    used.sort_by(|a, b| a.id.cmp(&b.id));
    used.dedup_by(|a, b| a.id == b.id);

    let mut payload = Map::new();
    payload.insert("profileId".into(), Value::String(profile.id.clone()));
    payload.insert(
        "layerIds".into(),
        Value::Array(profile.layer_ids().into_iter().map(Value::from).collect()),
    );
    payload.insert("layers".into(), Value::Array(layers));
    payload.insert(
        "sequences".into(),
        Value::Array(
            used.into_iter()
                .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
                .collect(),
        ),
    );
    Value::Object(payload)
}

fn hash_text(text: &str) -> u32 {
    text.encode_utf16()
        .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::binding::{Binding, Step};

    fn sequence(id: &str) -> Sequence {
        Sequence {
            id: id.into(),
            profile_id: "p1".into(),
            name: format!("Seq {id}"),
            steps: vec![Step {
                id: 1,
                name: "Tap".into(),
                op: "TAP".into(),
                arg: Some("KC_A".into()),
                class: None,
            }],
        }
    }

    #[test]
    fn test_hash_of_known_text() {
        // "ab" = 97 * 31 + 98
        assert_eq!(hash_text("ab"), 97 * 31 + 98);
        assert_eq!(hash_text(""), 0);
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let profile = Profile::new("p1", "Main")
            .with_binding(0, "key:0,1", Binding::simple("KEY_B", None))
            .with_binding(0, "key:0,0", Binding::simple("KEY_A", None));
        let again = Profile::new("p1", "Main")
            .with_binding(0, "key:0,0", Binding::simple("KEY_A", None))
            .with_binding(0, "key:0,1", Binding::simple("KEY_B", None));
        assert_eq!(profile_checksum(&profile, &[]), profile_checksum(&again, &[]));
    }

    #[test]
    fn test_checksum_changes_with_binding() {
        // Arrange
        let base = Profile::new("p1", "Main");
        let edited = base.with_binding(0, "key:0,0", Binding::simple("KEY_A", None));

        // Act / Assert
        assert_ne!(profile_checksum(&base, &[]), profile_checksum(&edited, &[]));
    }

    #[test]
    fn test_profile_name_does_not_contribute() {
        let a = Profile::new("p1", "Main");
        let b = Profile::new("p1", "Renamed");
        assert_eq!(profile_checksum(&a, &[]), profile_checksum(&b, &[]));
    }

    #[test]
    fn test_unreferenced_sequences_are_ignored() {
        let profile = Profile::new("p1", "Main");
        assert_eq!(
            profile_checksum(&profile, &[]),
            profile_checksum(&profile, &[sequence("s1")])
        );
    }

    #[test]
    fn test_referenced_sequence_contents_contribute() {
        // Arrange
        let profile = Profile::new("p1", "Main").with_binding(0, "key:0,0", Binding::sequence("s1"));
        let mut changed = sequence("s1");
        changed.steps[0].arg = Some("KC_B".into());

        // Act
        let before = profile_checksum(&profile, &[sequence("s1")]);
        let after = profile_checksum(&profile, &[changed]);

        // Assert
        assert_ne!(before, after);
    }

    #[test]
    fn test_payload_keys_are_sorted() {
        let profile = Profile::new("p1", "Main");
        let text = canonical_payload(&profile, &[]).to_string();
        assert_eq!(
            text,
            r#"{"layerIds":[0],"layers":[{"bindings":[],"id":0}],"profileId":"p1","sequences":[]}"#
        );
    }
}
