//! Upstream notification capability consumed by the core.
//!
//! The engine never talks to a notification channel directly -- it
//! depends only on this trait, the same shape the teacher's
//! `NotificationSender` gives the agent-notification pipeline a single
//! seam to an external system.

use crate::state::store::ElementKind;

/// Standard five-level logging severity, used for [`Notifier::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Capability interface the core depends on for all outbound
/// notification traffic: state changes, free-text alerts, and raw
/// panel events.
pub trait Notifier: Send + Sync {
    /// Fired on every accepted state change.
    fn change(&self, kind: ElementKind, label: &str, property: &str, value: &str, initial: bool);

    /// Fired for a human-readable alert at a given severity.
    fn notify(&self, source: &str, text: &str, severity: Severity);

    /// Fired for every panel event, translated to `(major, minor, kind)`.
    fn event(&self, major: (u8, &str), minor: (u8, &str), kind: &str);
}

/// Default [`Notifier`] that routes everything through the `log`
/// facade, matching the teacher's own use of `log::info!`/`log::warn!`
/// for anything not worth a dedicated sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn change(&self, kind: ElementKind, label: &str, property: &str, value: &str, initial: bool) {
        log::info!(
            "change: {:?}/{}/{} = {} (initial={})",
            kind,
            label,
            property,
            value,
            initial
        );
    }

    fn notify(&self, source: &str, text: &str, severity: Severity) {
        match severity {
            Severity::Critical => log::error!("[{source}] {text}"),
            Severity::Error => log::error!("[{source}] {text}"),
            Severity::Warning => log::warn!("[{source}] {text}"),
            Severity::Info => log::info!("[{source}] {text}"),
            Severity::Debug => log::debug!("[{source}] {text}"),
        }
    }

    fn event(&self, major: (u8, &str), minor: (u8, &str), kind: &str) {
        log::debug!("event: {} major={:?} minor={:?}", kind, major, minor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_notifier_does_not_panic() {
        let notifier = LoggingNotifier;
        notifier.change(ElementKind::Zone, "Kitchen", "open", "true", false);
        notifier.notify("Paradox", "Fire alarm Hallway", Severity::Critical);
        notifier.event((37, "Fire alarm"), (2, "Hallway"), "Zone");
    }
}
