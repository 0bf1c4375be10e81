//! Arm/disarm/bypass/output control, dispatched through a
//! [`Dispatcher`] and a shared [`StateStore`] for selector resolution.
//!
//! Grounded on `paradox.py.control_zone`/`control_partition`/
//! `control_output`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::constants::{partition_actions, pgm_actions, zone_actions};
use crate::dispatcher::Dispatcher;
use crate::profile::{MessageArgs, MessageName, MessageTemplate, PanelProfile};
use crate::state::{ElementKind, StateStore};

const PERFORM_ACTION_RETRIES: u32 = 5;
const PERFORM_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

fn resolve_selector(state: &StateStore, kind: ElementKind, selector: &str) -> Vec<u16> {
    if selector == "all" || selector == "0" {
        return state.keys(kind);
    }
    if let Some(key) = state.key_for_label(kind, selector) {
        return vec![key];
    }
    if let Ok(number) = selector.parse::<u16>() {
        if state.has_element(kind, number) {
            return vec![number];
        }
    }
    Vec::new()
}

/// Arm/disarm partitions, bypass zones, and toggle outputs.
///
/// Shared across threads via `Arc<ControlSurface>`: all state is either
/// immutable after construction or goes through `Dispatcher`'s own
/// mutex / `StateStore`'s own `RwLock`.
pub struct ControlSurface {
    dispatcher: Arc<Dispatcher>,
    profile: Arc<dyn PanelProfile>,
    state: Arc<StateStore>,
    wake: Arc<AtomicBool>,
}

impl ControlSurface {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        profile: Arc<dyn PanelProfile>,
        state: Arc<StateStore>,
        wake: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dispatcher,
            profile,
            state,
            wake,
        }
    }

    fn perform_action(&self, action: u8, argument: u8) -> bool {
        let args = MessageArgs {
            action: Some(action),
            argument: Some(argument),
            ..Default::default()
        };
        let reply = self.dispatcher.send_wait(
            self.profile.as_ref(),
            Some(MessageTemplate {
                name: MessageName::PerformAction,
            }),
            &args,
            PERFORM_ACTION_RETRIES,
            PERFORM_ACTION_TIMEOUT,
            Some(crate::constants::MSG_ACTION_ACCEPTED),
            |_event| {
                // Events observed while waiting for a control ack are
                // dropped here; the supervisor's own poll loop owns
                // event routing into `StateStore`.
            },
        );
        matches!(reply, Ok(Some(_)))
    }

    /// Arm/disarm a zone selected by `"all"`/`"0"`, label, or numeric key.
    pub fn control_zone(&self, zone: &str, command: &str) -> bool {
        let action = match command {
            "bypass" | "clear_bypass" => zone_actions::BYPASS,
            _ => return false,
        };

        let targets = resolve_selector(&self.state, ElementKind::Zone, zone);
        if targets.is_empty() {
            return false;
        }

        let mut accepted = false;
        for key in targets {
            if self.perform_action(action, key.saturating_sub(1) as u8) {
                accepted = true;
            }
        }
        self.wake.store(true, Ordering::SeqCst);
        accepted
    }

    /// Arm/disarm a partition selected by `"all"`/`"0"`, label, or numeric key.
    pub fn control_partition(&self, partition: &str, command: &str) -> bool {
        let action = match command {
            "arm" => partition_actions::ARM,
            "disarm" => partition_actions::DISARM,
            "arm_stay" => partition_actions::ARM_STAY,
            "arm_sleep" => partition_actions::ARM_SLEEP,
            "arm_stay_stayd" => partition_actions::ARM_STAY_STAYD,
            "arm_sleep_stay" => partition_actions::ARM_SLEEP_STAY,
            "disarm_all" => partition_actions::DISARM_ALL,
            _ => return false,
        };

        let targets = resolve_selector(&self.state, ElementKind::Partition, partition);
        if targets.is_empty() {
            return false;
        }

        let mut accepted = false;
        for key in targets {
            if self.perform_action(action, key.saturating_sub(1) as u8) {
                accepted = true;
            }
        }
        self.wake.store(true, Ordering::SeqCst);
        accepted
    }

    /// Toggle an output selected by `"all"`/`"0"`, label, or numeric key.
    /// `"pulse"` turns on, waits 1s, then turns off.
    pub fn control_output(&self, output: &str, command: &str) -> bool {
        let targets = resolve_selector(&self.state, ElementKind::Output, output);
        if targets.is_empty() {
            return false;
        }

        let mut accepted = false;
        for key in targets {
            let argument = key.saturating_sub(1) as u8;
            match command {
                "pulse" => {
                    if self.perform_action(pgm_actions::ON, argument) {
                        accepted = true;
                    }
                    thread::sleep(Duration::from_secs(1));
                    if self.perform_action(pgm_actions::OFF, argument) {
                        accepted = true;
                    }
                }
                "on_override" => accepted |= self.perform_action(pgm_actions::ON_OVERRIDE, argument),
                "off_override" => accepted |= self.perform_action(pgm_actions::OFF_OVERRIDE, argument),
                "on" => accepted |= self.perform_action(pgm_actions::ON, argument),
                "off" => accepted |= self.perform_action(pgm_actions::OFF, argument),
                _ => return false,
            }
        }
        self.wake.store(true, Ordering::SeqCst);
        accepted
    }
}
