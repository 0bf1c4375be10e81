//! Translates raw panel events into `StateStore` property deltas and
//! severity-classified notifications.
//!
//! Grounded on `paradox.py`'s `process_event`/`generate_event_notifications`.
//! Two quirks from the source are flagged rather than "fixed", per the
//! documented open questions: the `(53, 54)`/`(53, 56)` major overlap
//! (second arm is unreachable) and the `elif minor_code == 13` branch in
//! `generate_event_notifications` (unreachable after the preceding
//! `in [..., 13]`).

use crate::notifier::Severity;
use crate::state::store::{ElementKind, PropertyValue};
use crate::state::StateStore;

/// The panel's `type` tag on a raw event (`"Zone"`, `"Partition"`, `"Output"`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTargetKind {
    Zone,
    Partition,
    Output,
    Other(String),
}

impl From<&str> for EventTargetKind {
    fn from(s: &str) -> Self {
        match s {
            "Zone" => EventTargetKind::Zone,
            "Partition" => EventTargetKind::Partition,
            "Output" => EventTargetKind::Output,
            other => EventTargetKind::Other(other.to_string()),
        }
    }
}

/// A raw event as decoded off the wire: major/minor codes each paired
/// with their human-readable text, plus the target kind.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub major: (u8, String),
    pub minor: (u8, String),
    pub kind: EventTargetKind,
}

/// An event after translation: `minor.1` has been replaced with the
/// target element's live label, when one was applied.
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub major: (u8, String),
    pub minor: (u8, String),
    pub kind: EventTargetKind,
}

/// Maps raw `(major, minor)` codes onto property deltas and,
/// independently, onto notification severity.
pub struct EventProcessor;

impl EventProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Compute the property delta for `(major, minor)`, matching the
    /// representative rule table. Returns `None` when no delta applies.
    fn delta_for(
        &self,
        state: &StateStore,
        event: &RawEvent,
    ) -> Option<(ElementKind, Vec<(&'static str, PropertyValue)>)> {
        let major = event.major.0;
        let minor = event.minor.0;

        match major {
            0 | 1 => Some((ElementKind::Zone, vec![("open", (major == 1).into())])),
            35 => {
                // Source reads `self.zones[minor]` as a bare bool; treat
                // as `zones[minor].get("bypass", false)`.
                let current = state
                    .get_property(ElementKind::Zone, minor as u16, "bypass")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Some((ElementKind::Zone, vec![("bypass", (!current).into())]))
            }
            36 | 38 => Some((ElementKind::Zone, vec![("alarm", (major == 36).into())])),
            37 | 39 => Some((ElementKind::Zone, vec![("fire_alarm", (major == 37).into())])),
            41 => Some((ElementKind::Zone, vec![("shutdown", true.into())])),
            42 | 43 => Some((ElementKind::Zone, vec![("tamper", (major == 42).into())])),
            49 | 50 => Some((ElementKind::Zone, vec![("low_battery", (major == 49).into())])),
            51 | 52 => Some((ElementKind::Zone, vec![("supervision_trouble", (major == 51).into())])),

            2 => match minor {
                2..=6 => Some((ElementKind::Partition, vec![("alarm", true.into())])),
                7 => Some((ElementKind::Partition, vec![("alarm", false.into())])),
                11 => Some((
                    ElementKind::Partition,
                    vec![
                        ("arm", false.into()),
                        ("arm_full", false.into()),
                        ("arm_sleep", false.into()),
                        ("arm_stay", false.into()),
                        ("alarm", false.into()),
                    ],
                )),
                12 => Some((ElementKind::Partition, vec![("arm", true.into())])),
                14 => Some((ElementKind::Partition, vec![("exit_delay", true.into())])),
                _ => None,
            },
            3 => match minor {
                0 | 1 => Some((ElementKind::Partition, vec![("bell", (minor == 1).into())])),
                _ => None,
            },
            6 => match minor {
                3 => Some((
                    ElementKind::Partition,
                    vec![
                        ("arm", true.into()),
                        ("arm_full", false.into()),
                        ("arm_sleep", false.into()),
                        ("arm_stay", true.into()),
                        ("alarm", false.into()),
                    ],
                )),
                4 => Some((
                    ElementKind::Partition,
                    vec![
                        ("arm", true.into()),
                        ("arm_full", false.into()),
                        ("arm_sleep", true.into()),
                        ("arm_stay", false.into()),
                        ("alarm", false.into()),
                    ],
                )),
                _ => None,
            },

            // Wireless module. The second arm is unreachable: every
            // `major == 53` event is already consumed by the first arm.
            53 | 54 => Some((
                ElementKind::Partition,
                vec![("supervision_trouble", (major == 53).into())],
            )),
            #[allow(unreachable_patterns)]
            53 | 56 => Some((ElementKind::Partition, vec![("tamper_trouble", (major == 55).into())])),

            _ => None,
        }
    }

    /// Apply the delta for a raw event, returning the translated event
    /// record (minor's text replaced by the live element label when a
    /// delta was applied to a known element).
    pub fn process(&self, state: &StateStore, raw: &RawEvent) -> ProcessedEvent {
        let minor_key = raw.minor.0 as u16;
        let mut new_minor = raw.minor.clone();

        if let Some((kind, changes)) = self.delta_for(state, raw) {
            let target_matches = matches!(
                (&raw.kind, kind),
                (EventTargetKind::Zone, ElementKind::Zone)
                    | (EventTargetKind::Partition, ElementKind::Partition)
                    | (EventTargetKind::Output, ElementKind::Output)
            );

            if target_matches && state.element_count(kind) > 0 && state.has_element(kind, minor_key) {
                state.update_properties(kind, minor_key, &changes, false);
                if let Some(label) = state.label_for_key(kind, minor_key) {
                    new_minor = (raw.minor.0, label);
                }
            }
        }

        ProcessedEvent {
            major: raw.major.clone(),
            minor: new_minor,
            kind: raw.kind.clone(),
        }
    }

    /// Classify a processed event for notification, independent of
    /// whatever property delta was applied. Returns `None` for events
    /// that should be dropped silently.
    pub fn classify(&self, state: &StateStore, event: &ProcessedEvent) -> Option<(String, Severity)> {
        let major = event.major.0;
        let minor = event.minor.0;

        // Ignored.
        if major == 45 && minor == 6 {
            return None;
        }
        if major == 0 || major == 1 {
            return None;
        }
        if major == 2 && [8, 9, 11, 12, 14].contains(&minor) {
            return None;
        }
        if major == 3 && [2, 3].contains(&minor) {
            return None;
        }
        if major == 6 && [3, 4].contains(&minor) {
            return None;
        }
        if major == 30 && [3, 5].contains(&minor) {
            return None;
        }
        if major == 34 && minor == 1 {
            return None;
        }
        if major == 48 && minor == 2 {
            return None;
        }

        // Critical: fire/alarm/tamper/new-trouble family.
        if [24, 36, 37, 38, 39, 40, 42, 43, 57].contains(&major)
            || ((major == 44 || major == 45) && (1..=7).contains(&minor))
        {
            return Some((format!("{} {}", event.major.1, event.minor.1), Severity::Critical));
        }

        if major == 2 {
            if [2, 3, 4, 5, 6, 7, 13].contains(&minor) {
                return Some((event.minor.1.clone(), Severity::Critical));
            }
            // Unreachable: every value this arm could see is already
            // covered by the `[2, 3, 4, 5, 6, 7, 13]` check above.
            #[allow(unreachable_code)]
            if minor == 13 {
                return Some((event.minor.1.clone(), Severity::Info));
            }
            return None;
        }

        // Unreachable: majors 40/44/45 with minor in 1..=7 are already
        // dispatched by the critical-family check above.
        if [40, 44, 45].contains(&major) && (1..=7).contains(&minor) {
            return Some((format!("{}: {}", event.major.1, event.minor.1), Severity::Critical));
        }

        if [18, 19, 20, 21].contains(&major) {
            let label = if state.element_count(ElementKind::Zone) > 0 {
                state.label_for_key(ElementKind::Zone, minor as u16)
            } else {
                None
            };
            let label = label.unwrap_or_else(|| event.minor.1.clone());
            return Some((format!("{}: {}", event.major.1, label), Severity::Info));
        }

        Some((format!("{}: {}", event.major.1, event.minor.1), Severity::Info))
    }
}

impl Default for EventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(major: u8, major_text: &str, minor: u8, minor_text: &str, kind: EventTargetKind) -> RawEvent {
        RawEvent {
            major: (major, major_text.to_string()),
            minor: (minor, minor_text.to_string()),
            kind,
        }
    }

    #[test]
    fn zone_open_event_updates_property_and_relabels() {
        let state = StateStore::new();
        state.set_label(ElementKind::Zone, 3, "Kitchen");
        let processor = EventProcessor::new();

        let event = raw(1, "Zone open", 3, "raw-label", EventTargetKind::Zone);
        let processed = processor.process(&state, &event);

        assert_eq!(processed.minor, (3, "Kitchen".to_string()));
        assert_eq!(
            state.get_property(ElementKind::Zone, 3, "open"),
            Some(PropertyValue::Bool(true))
        );
        assert_eq!(processor.classify(&state, &processed), None, "open/close events are dropped");
    }

    #[test]
    fn fire_alarm_is_critical() {
        let state = StateStore::new();
        state.set_label(ElementKind::Zone, 2, "Hallway");
        let processor = EventProcessor::new();

        let event = raw(37, "Fire alarm", 2, "raw", EventTargetKind::Zone);
        let processed = processor.process(&state, &event);

        assert_eq!(
            state.get_property(ElementKind::Zone, 2, "fire_alarm"),
            Some(PropertyValue::Bool(true))
        );
        let (text, severity) = processor.classify(&state, &processed).unwrap();
        assert_eq!(severity, Severity::Critical);
        assert!(text.contains("Fire alarm"));
        assert!(text.contains("Hallway"));
    }

    #[test]
    fn bypass_toggles_from_current_state() {
        let state = StateStore::new();
        state.set_label(ElementKind::Zone, 1, "Garage");
        let processor = EventProcessor::new();

        let event = raw(35, "Bypass", 1, "raw", EventTargetKind::Zone);
        processor.process(&state, &event);
        assert_eq!(
            state.get_property(ElementKind::Zone, 1, "bypass"),
            Some(PropertyValue::Bool(true))
        );

        processor.process(&state, &event);
        assert_eq!(
            state.get_property(ElementKind::Zone, 1, "bypass"),
            Some(PropertyValue::Bool(false))
        );
    }

    #[test]
    fn squawk_partition_arm_disarm_events_are_dropped() {
        let state = StateStore::new();
        let processor = EventProcessor::new();
        let event = raw(2, "Squawk", 11, "raw", EventTargetKind::Partition);
        let processed = processor.process(&state, &event);
        assert_eq!(processor.classify(&state, &processed), None);
    }

    #[test]
    fn unmapped_event_falls_through_to_info() {
        let state = StateStore::new();
        let processor = EventProcessor::new();
        let event = raw(200, "Unknown major", 1, "raw detail", EventTargetKind::Other("Bus".into()));
        let processed = processor.process(&state, &event);
        let (text, severity) = processor.classify(&state, &processed).unwrap();
        assert_eq!(severity, Severity::Info);
        assert!(text.contains("Unknown major"));
    }
}
