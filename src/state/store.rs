//! Thread-safe mirror of panel elements (zones, partitions, outputs, ...)
//! and their dynamic properties.
//!
//! Grounded on `paradox.py`'s `reset()`/`update_properties()`: each
//! element is a label plus a bag of named properties, indexed both by
//! numeric key and by label for selector resolution in `control_*`.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// The kind of panel element a property update applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    Zone,
    Partition,
    Output,
    Bus,
    Keypad,
    Repeater,
    Siren,
    User,
    Site,
    System,
}

impl ElementKind {
    /// All element kinds, in the order `reset()` initializes them.
    pub const ALL: [ElementKind; 10] = [
        ElementKind::Zone,
        ElementKind::Partition,
        ElementKind::Output,
        ElementKind::Bus,
        ElementKind::Keypad,
        ElementKind::Repeater,
        ElementKind::Siren,
        ElementKind::User,
        ElementKind::Site,
        ElementKind::System,
    ];
}

/// A single dynamic property value. Panel telemetry is a mix of
/// booleans, numbers, and short strings; this is the union of what
/// `update_properties` ever assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

/// One tracked element: its label plus a bag of named properties.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub label: String,
    pub properties: HashMap<String, PropertyValue>,
}

/// A single property change, as reported by a call to
/// [`StateStore::update_properties`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub kind: ElementKind,
    pub key: u16,
    pub label: String,
    pub property: String,
    pub old: Option<PropertyValue>,
    pub new: PropertyValue,
    /// True the first time this property is ever set on this element.
    pub initial: bool,
}

#[derive(Default)]
struct Inner {
    elements: HashMap<ElementKind, HashMap<u16, Element>>,
    labels: HashMap<ElementKind, HashMap<String, u16>>,
}

impl Inner {
    fn reset() -> Self {
        let mut elements = HashMap::new();
        let mut labels = HashMap::new();
        for kind in ElementKind::ALL {
            elements.insert(kind, HashMap::new());
            labels.insert(kind, HashMap::new());
        }
        Self { elements, labels }
    }
}

/// Thread-safe, interior-mutable mirror of the panel's element state.
///
/// All methods take `&self`: the poll loop and any external control
/// thread hold the same `Arc<StateStore>` and write through a
/// `RwLock`, matching how `ControlSurface` is invoked from outside the
/// supervisor's own thread.
pub struct StateStore {
    inner: RwLock<Inner>,
}

impl StateStore {
    /// Build a freshly reset store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::reset()),
        }
    }

    /// Drop all tracked elements and labels, as `paradox.py`'s
    /// `reset()` does at the start of every connection attempt.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner::reset();
    }

    /// Register (or re-register) an element's label, growing the
    /// element table monotonically -- panels only ever add elements
    /// within a session, never remove them.
    pub fn set_label(&self, kind: ElementKind, key: u16, label: impl Into<String>) {
        let label = label.into();
        let mut inner = self.inner.write().unwrap();
        inner
            .elements
            .entry(kind)
            .or_default()
            .entry(key)
            .or_default()
            .label = label.clone();
        inner.labels.entry(kind).or_default().insert(label, key);
    }

    /// Resolve a label back to its numeric key, for selector resolution
    /// in control operations (`control_zone("Front Door", ...)`).
    pub fn key_for_label(&self, kind: ElementKind, label: &str) -> Option<u16> {
        self.inner.read().unwrap().labels.get(&kind)?.get(label).copied()
    }

    pub fn label_for_key(&self, kind: ElementKind, key: u16) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .elements
            .get(&kind)?
            .get(&key)
            .map(|e| e.label.clone())
    }

    /// Read a single property's current value, if the element and
    /// property both exist.
    pub fn get_property(&self, kind: ElementKind, key: u16, property: &str) -> Option<PropertyValue> {
        self.inner
            .read()
            .unwrap()
            .elements
            .get(&kind)?
            .get(&key)?
            .properties
            .get(property)
            .cloned()
    }

    /// True if `key` exists in `kind`'s element table. Mirrors
    /// `if key not in elements: return` in `update_properties`.
    pub fn has_element(&self, kind: ElementKind, key: u16) -> bool {
        self.inner
            .read()
            .unwrap()
            .elements
            .get(&kind)
            .map(|m| m.contains_key(&key))
            .unwrap_or(false)
    }

    /// All keys currently tracked for `kind`, mirroring `list(self.zones)`.
    pub fn keys(&self, kind: ElementKind) -> Vec<u16> {
        let mut keys: Vec<u16> = self
            .inner
            .read()
            .unwrap()
            .elements
            .get(&kind)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    pub fn element_count(&self, kind: ElementKind) -> usize {
        self.inner.read().unwrap().elements.get(&kind).map(|m| m.len()).unwrap_or(0)
    }

    /// Apply a batch of property changes to one element, aggregating
    /// any `*_trouble` property into a synthetic `trouble` property
    /// that is true if any trouble flag is set.
    ///
    /// Elements are created lazily on first write, the same way
    /// `set_label` grows the element table -- a panel may report
    /// status for a key before (or without) its label ever arriving.
    ///
    /// Returns the list of changes that actually took effect (i.e. the
    /// value changed, the property is new, or `force_publish` was
    /// set), in the order `paradox.py`'s `update_properties` walks
    /// `change.items()`, with the synthetic `trouble` update appended
    /// after the triggering `*_trouble` property.
    pub fn update_properties(
        &self,
        kind: ElementKind,
        key: u16,
        changes: &[(&str, PropertyValue)],
        force_publish: bool,
    ) -> Vec<PropertyChange> {
        let mut inner = self.inner.write().unwrap();
        let element = inner.elements.entry(kind).or_default().entry(key).or_default();

        let mut applied = Vec::new();
        for (property_name, new_value) in changes {
            let old = element.properties.get(*property_name).cloned();
            let initial = old.is_none();
            let changed = old.as_ref() != Some(new_value);

            if changed || force_publish {
                element.properties.insert((*property_name).to_string(), new_value.clone());
                applied.push(PropertyChange {
                    kind,
                    key,
                    label: element.label.clone(),
                    property: (*property_name).to_string(),
                    old: old.clone(),
                    new: new_value.clone(),
                    initial,
                });
            }

            if property_name.contains("_trouble") {
                let aggregated = if let PropertyValue::Bool(true) = new_value {
                    true
                } else {
                    element
                        .properties
                        .iter()
                        .any(|(k, v)| k.contains("_trouble") && v.as_bool() == Some(true))
                };
                let trouble_old = element.properties.get("trouble").cloned();
                let trouble_new = PropertyValue::Bool(aggregated);
                if trouble_old.as_ref() != Some(&trouble_new) || force_publish {
                    let trouble_initial = trouble_old.is_none();
                    element.properties.insert("trouble".to_string(), trouble_new.clone());
                    applied.push(PropertyChange {
                        kind,
                        key,
                        label: element.label.clone(),
                        property: "trouble".to_string(),
                        old: trouble_old,
                        new: trouble_new,
                        initial: trouble_initial,
                    });
                }
            }
        }
        applied
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_label_registers_both_directions() {
        let store = StateStore::new();
        store.set_label(ElementKind::Zone, 3, "Front Door");
        assert_eq!(store.label_for_key(ElementKind::Zone, 3).as_deref(), Some("Front Door"));
        assert_eq!(store.key_for_label(ElementKind::Zone, "Front Door"), Some(3));
    }

    #[test]
    fn update_properties_reports_initial_then_changed() {
        let store = StateStore::new();
        store.set_label(ElementKind::Zone, 1, "Kitchen");

        let first = store.update_properties(ElementKind::Zone, 1, &[("open", true.into())], false);
        assert_eq!(first.len(), 1);
        assert!(first[0].initial);
        assert_eq!(first[0].new, PropertyValue::Bool(true));

        let second = store.update_properties(ElementKind::Zone, 1, &[("open", true.into())], false);
        assert!(second.is_empty(), "no-op update should not be reported");

        let third = store.update_properties(ElementKind::Zone, 1, &[("open", false.into())], false);
        assert_eq!(third.len(), 1);
        assert!(!third[0].initial);
    }

    #[test]
    fn trouble_properties_aggregate() {
        let store = StateStore::new();
        store.set_label(ElementKind::Zone, 2, "Garage");

        let changes = store.update_properties(ElementKind::Zone, 2, &[("tamper_trouble", true.into())], false);
        assert!(changes.iter().any(|c| c.property == "tamper_trouble"));
        assert!(changes.iter().any(|c| c.property == "trouble" && c.new == PropertyValue::Bool(true)));

        let changes = store.update_properties(ElementKind::Zone, 2, &[("tamper_trouble", false.into())], false);
        assert!(changes.iter().any(|c| c.property == "trouble" && c.new == PropertyValue::Bool(false)));
    }

    #[test]
    fn update_properties_creates_the_element_lazily() {
        let store = StateStore::new();
        assert!(!store.has_element(ElementKind::Zone, 99));

        let changes = store.update_properties(ElementKind::Zone, 99, &[("open", true.into())], false);

        assert_eq!(changes.len(), 1);
        assert!(changes[0].initial);
        assert!(store.has_element(ElementKind::Zone, 99));
        assert_eq!(store.get_property(ElementKind::Zone, 99, "open"), Some(true.into()));
    }

    #[test]
    fn reset_clears_elements_and_labels() {
        let store = StateStore::new();
        store.set_label(ElementKind::Partition, 0, "Main");
        store.reset();
        assert_eq!(store.element_count(ElementKind::Partition), 0);
        assert_eq!(store.key_for_label(ElementKind::Partition, "Main"), None);
    }
}
