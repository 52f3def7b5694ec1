//! Bindings, sequences, layers, and profiles.
//!
//! A [`Profile`] is a list of [`Layer`]s, each mapping target ids to a
//! [`Binding`].  Edits never mutate a binding in place: [`Profile::with_binding`]
//! returns a new profile with the whole value replaced.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form metadata carried alongside a binding.
pub type Meta = BTreeMap<String, Value>;

/// One step of a macro sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<i32>,
}

/// A named, reusable macro owned by a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sequence {
    pub id: String,
    pub profile_id: String,
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// What a target does on one layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Binding {
    #[default]
    None,
    #[serde(rename_all = "camelCase")]
    SequenceRef {
        #[serde(alias = "scriptId")]
        sequence_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Meta>,
    },
    SimpleAction {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Meta>,
    },
    InlineSequence {
        steps: Vec<Step>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Meta>,
    },
    Program {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Meta>,
    },
}

impl Binding {
    pub fn simple(action: impl Into<String>, arg: Option<String>) -> Self {
        Self::SimpleAction {
            action: action.into(),
            arg,
            meta: None,
        }
    }

    pub fn sequence(sequence_id: impl Into<String>) -> Self {
        Self::SequenceRef {
            sequence_id: sequence_id.into(),
            meta: None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Sequence referenced by this binding, if any.
    pub fn sequence_id(&self) -> Option<&str> {
        match self {
            Self::SequenceRef { sequence_id, .. } => Some(sequence_id),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SequenceRef { .. } => "sequenceRef",
            Self::SimpleAction { .. } => "simpleAction",
            Self::InlineSequence { .. } => "inlineSequence",
            Self::Program { .. } => "program",
        }
    }
}

/// A binding addressed to a target (and optionally a layer) on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingEntry {
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_id: Option<u32>,
    pub binding: Binding,
}

/// One layer: target id → binding.  `None` bindings are not stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub id: u32,
    #[serde(default)]
    pub bindings: BTreeMap<String, Binding>,
}

impl Layer {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            bindings: BTreeMap::new(),
        }
    }

    pub fn binding(&self, target_id: &str) -> Option<&Binding> {
        self.bindings.get(target_id)
    }
}

/// A binding dropped during hydration because its target no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleBinding {
    pub layer_id: u32,
    pub target_id: String,
}

/// A named set of layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Profile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            layers: vec![Layer::new(0)],
        }
    }

    pub fn layer(&self, layer_id: u32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == layer_id)
    }

    pub fn layer_ids(&self) -> Vec<u32> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn binding(&self, layer_id: u32, target_id: &str) -> Option<&Binding> {
        self.layer(layer_id).and_then(|l| l.binding(target_id))
    }

    /// New profile with `binding` at `(layer_id, target_id)`.
    ///
    /// A `None` binding clears the slot.  The layer is created if missing.
    pub fn with_binding(&self, layer_id: u32, target_id: &str, binding: Binding) -> Self {
        let mut next = self.clone();
        let index = match next.layers.iter().position(|l| l.id == layer_id) {
            Some(index) => index,
            None => {
                next.layers.push(Layer::new(layer_id));
                next.layers.sort_by_key(|l| l.id);
                next.layers
                    .iter()
                    .position(|l| l.id == layer_id)
                    .unwrap_or_default()
            }
        };
        let layer = &mut next.layers[index];
        if binding.is_none() {
            layer.bindings.remove(target_id);
        } else {
            layer.bindings.insert(target_id.to_string(), binding);
        }
        next
    }

    /// New profile containing layers `0..count`, keeping existing layers.
    pub fn with_layer_count(&self, count: u32) -> Self {
        let mut next = self.clone();
        for id in 0..count {
            if next.layer(id).is_none() {
                next.layers.push(Layer::new(id));
            }
        }
        next.layers.sort_by_key(|l| l.id);
        next
    }

    /// Splits off bindings whose target is not in `targets`.
    pub fn retain_targets(&self, targets: &HashSet<String>) -> (Self, Vec<StaleBinding>) {
        let mut stale = Vec::new();
        let layers = self
            .layers
            .iter()
            .map(|layer| {
                let bindings = layer
                    .bindings
                    .iter()
                    .filter(|(target_id, _)| {
                        let keep = targets.contains(target_id.as_str());
                        if !keep {
                            stale.push(StaleBinding {
                                layer_id: layer.id,
                                target_id: (*target_id).clone(),
                            });
                        }
                        keep
                    })
                    .map(|(target_id, binding)| (target_id.clone(), binding.clone()))
                    .collect();
                Layer {
                    id: layer.id,
                    bindings,
                }
            })
            .collect();
        (
            Self {
                id: self.id.clone(),
                name: self.name.clone(),
                layers,
            },
            stale,
        )
    }

    /// Ids of every sequence referenced from any layer, deduplicated.
    pub fn referenced_sequences(&self) -> HashSet<&str> {
        self.layers
            .iter()
            .flat_map(|l| l.bindings.values())
            .filter_map(Binding::sequence_id)
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_serializes_with_type_tag() {
        // Arrange
        let binding = Binding::sequence("seq-1");

        // Act
        let json = serde_json::to_value(&binding).expect("serialize");

        // Assert
        assert_eq!(json, serde_json::json!({ "type": "sequenceRef", "sequenceId": "seq-1" }));
    }

    #[test]
    fn test_binding_accepts_legacy_script_id() {
        let json = r#"{ "type": "sequenceRef", "scriptId": "s9" }"#;
        let binding: Binding = serde_json::from_str(json).expect("deserialize");
        assert_eq!(binding, Binding::sequence("s9"));
    }

    #[test]
    fn test_none_binding_round_trips() {
        let binding: Binding = serde_json::from_str(r#"{ "type": "none" }"#).expect("deserialize");
        assert!(binding.is_none());
    }

    #[test]
    fn test_with_binding_returns_new_profile() {
        // Arrange
        let original = Profile::new("p1", "Main");

        // Act
        let updated = original.with_binding(0, "key:0,0", Binding::simple("KC_A", None));

        // Assert
        assert!(original.binding(0, "key:0,0").is_none());
        assert_eq!(
            updated.binding(0, "key:0,0"),
            Some(&Binding::simple("KC_A", None))
        );
    }

    #[test]
    fn test_with_binding_none_clears_slot() {
        let profile = Profile::new("p1", "Main")
            .with_binding(0, "key:0,0", Binding::simple("KC_A", None))
            .with_binding(0, "key:0,0", Binding::None);
        assert!(profile.binding(0, "key:0,0").is_none());
    }

    #[test]
    fn test_with_binding_creates_missing_layer_in_order() {
        let profile = Profile::new("p1", "Main").with_binding(2, "key:0,0", Binding::sequence("s"));
        assert_eq!(profile.layer_ids(), vec![0, 2]);
    }

    #[test]
    fn test_with_layer_count_fills_gaps() {
        let profile = Profile::new("p1", "Main").with_layer_count(4);
        assert_eq!(profile.layer_ids(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_retain_targets_drops_and_reports_stale_bindings() {
        // Arrange
        let profile = Profile::new("p1", "Main")
            .with_binding(0, "key:0,0", Binding::simple("KC_A", None))
            .with_binding(0, "key:9,9", Binding::simple("KC_B", None));
        let targets: HashSet<String> = ["key:0,0".to_string()].into_iter().collect();

        // Act
        let (kept, stale) = profile.retain_targets(&targets);

        // Assert
        assert!(kept.binding(0, "key:0,0").is_some());
        assert!(kept.binding(0, "key:9,9").is_none());
        assert_eq!(
            stale,
            vec![StaleBinding {
                layer_id: 0,
                target_id: "key:9,9".to_string()
            }]
        );
    }

    #[test]
    fn test_referenced_sequences_collects_ids() {
        let profile = Profile::new("p1", "Main")
            .with_binding(0, "a", Binding::sequence("s1"))
            .with_binding(1, "b", Binding::sequence("s1"))
            .with_binding(1, "c", Binding::sequence("s2"));
        let refs = profile.referenced_sequences();
        assert_eq!(refs.len(), 2);
        assert!(refs.contains("s2"));
    }
}
