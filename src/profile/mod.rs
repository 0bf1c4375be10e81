//! Panel-family plug-in: a capability chosen at connect by `product_id`.
//!
//! Byte-layout tables for each panel family are out of scope (the
//! distilled spec's Non-goals); this module ships the trait shape plus
//! one concrete, generically-templated implementation sufficient to
//! drive the engine end-to-end, grounded on `paradox.py`'s
//! `create_panel`/`panel.get_message`/`panel.parse_message` call sites.

mod generic;

pub use generic::GenericProfile;

use std::collections::HashMap;
use std::sync::Arc;

use crate::state::StateStore;

/// Names of the request templates the core ever builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageName {
    InitiateCommunication,
    StartCommunication,
    SetTimeDate,
    ReadEEPROM,
    PerformAction,
    CloseConnection,
}

/// A request template, bound to a concrete profile, not yet rendered
/// to bytes. Mirrors `panel.get_message(name)` returning a `construct`
/// template object in the original source.
#[derive(Debug, Clone, Copy)]
pub struct MessageTemplate {
    pub name: MessageName,
}

/// Union of the argument fields used across every request template.
/// `paradox.py` builds a fresh `dict(...)` per call site; this is the
/// union of those dicts.
#[derive(Debug, Clone, Default)]
pub struct MessageArgs {
    pub address: Option<u32>,
    pub action: Option<u8>,
    pub argument: Option<u8>,
    pub source_id: Option<u8>,
    pub century: Option<u8>,
    pub year: Option<u8>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
}

/// A single live power reading, reported once per `POWER_UPDATE_INTERVAL`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub vdc: f64,
    pub battery: f64,
    pub dc: f64,
}

/// One field out of a status bulk reply: either a full per-key property
/// block (`{kind}_status`) or a single property value per key
/// (`{kind}_{prop}`), matching `process_status_bulk`'s two shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusField {
    /// `{kind}_status`: key -> full property block.
    Status(HashMap<u16, HashMap<String, crate::state::PropertyValue>>),
    /// `{kind}_{prop}`: key -> single property value, applied under `prop`.
    Value(HashMap<u16, crate::state::PropertyValue>),
}

/// A fully decoded application message. `None` from `parse_message`
/// means "not a complete/known message" (distinct from an explicit
/// `Reply`/`Event`/`Terminate`/`StatusBulk`).
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedMessage {
    /// A reply to a request, keyed by its command code.
    Reply { code: u8, body: Vec<u8> },
    /// An asynchronous panel event (command `0x0E`).
    Event {
        major: (u8, String),
        minor: (u8, String),
        kind: String,
    },
    /// A connection-terminate notice (command `0x70`).
    Terminate,
    /// A bulk status reply (command `0x05`), keyed by status-request index.
    StatusBulk {
        status_request: u8,
        power: Option<PowerReading>,
        rf_noise_floor: Option<f64>,
        troubles: HashMap<String, bool>,
        fields: HashMap<String, StatusField>,
    },
}

impl ParsedMessage {
    /// The raw command code this message carries, for `Dispatcher`'s
    /// reply-code matching. Events/Terminate/StatusBulk have fixed codes.
    pub fn command_code(&self) -> u8 {
        match self {
            ParsedMessage::Reply { code, .. } => *code,
            ParsedMessage::Event { .. } => crate::constants::MSG_EVENT,
            ParsedMessage::Terminate => crate::constants::MSG_TERMINATE,
            ParsedMessage::StatusBulk { .. } => crate::constants::MSG_STATUS_REPLY,
        }
    }
}

/// Capabilities required of a concrete panel family.
///
/// All methods take `&self` rather than `&mut self`: `ControlSurface`
/// is invoked from an external I/O thread and shares the profile via
/// `Arc<dyn PanelProfile>`, so any state a profile needs must use
/// interior mutability internally rather than `&mut self` borrows.
pub trait PanelProfile: Send + Sync {
    /// Build the wire payload for a named request template.
    fn get_message(&self, template: MessageTemplate, args: &MessageArgs) -> Vec<u8>;

    /// Parse one decrypted application payload. `None` means the bytes
    /// don't form a complete or recognized message.
    fn parse_message(&self, bytes: &[u8]) -> Option<ParsedMessage>;

    /// Consume the `InitiateCommunication` reply and the configured
    /// panel password to complete handshake-time setup. Returns `false`
    /// on failure (caller transitions the supervisor to `STOP`).
    fn initialize_communication(&self, initial_reply: Option<&ParsedMessage>, password: &str) -> bool;

    /// Populate element labels into `state` by reading the panel's
    /// EEPROM label regions.
    fn update_labels(&self, state: &StateStore);

    /// A short identifier for logging (`"generic"`, `"evo"`, `"dgp-neo"`).
    fn family(&self) -> &'static str;
}

/// Selects a concrete [`PanelProfile`] by the `product_id` byte a panel
/// reports in its `StartCommunication` reply, mirroring
/// `create_panel(self, reply.fields.value.product_id)`.
pub struct ProfileRegistry {
    factories: HashMap<u8, Arc<dyn Fn() -> Arc<dyn PanelProfile> + Send + Sync>>,
}

impl ProfileRegistry {
    /// A registry that resolves every known Evo/DGP Neo product id,
    /// falling back to [`GenericProfile`] for anything else.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(0x00, || Arc::new(GenericProfile::evo()));
        registry.register(0x01, || Arc::new(GenericProfile::dgp_neo()));
        registry
    }

    pub fn register<F>(&mut self, product_id: u8, factory: F)
    where
        F: Fn() -> Arc<dyn PanelProfile> + Send + Sync + 'static,
    {
        self.factories.insert(product_id, Arc::new(factory));
    }

    /// Resolve `product_id` to a concrete profile, defaulting to the
    /// generic profile for unrecognized ids.
    pub fn resolve(&self, product_id: Option<u8>) -> Arc<dyn PanelProfile> {
        match product_id.and_then(|id| self.factories.get(&id)) {
            Some(factory) => factory(),
            None => Arc::new(GenericProfile::generic()),
        }
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
