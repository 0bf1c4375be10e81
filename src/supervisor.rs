//! Connection lifecycle state machine and poll loop: `connect`/
//! `disconnect`/`pause`/`resume`, status polling, and status-bulk
//! application.
//!
//! Grounded on `paradox.py.connect`/`loop`/`disconnect`/`pause`/
//! `resume`/`handle_status`/`process_status_bulk`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::constants::MEM_STATUS_BASE;
use crate::control::ControlSurface;
use crate::dispatcher::Dispatcher;
use crate::notifier::{Notifier, Severity};
use crate::profile::{
    MessageArgs, MessageName, MessageTemplate, PanelProfile, ParsedMessage, ProfileRegistry, StatusField,
};
use crate::state::{ElementKind, EventProcessor, PropertyValue, RawEvent, StateStore};
use crate::transport::{RelayNegotiator, SiteDirectoryClient, Transport};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stop,
    Run,
    Pause,
    Error,
}

/// Maps a `process_status_bulk` field-name prefix (`zone`, `pgm`, ...)
/// to the element kind it targets, and the config inclusion list that
/// gates whether a given key is applied.
fn kind_for_prefix(prefix: &str) -> Option<ElementKind> {
    match prefix {
        "zone" => Some(ElementKind::Zone),
        "partition" => Some(ElementKind::Partition),
        "pgm" => Some(ElementKind::Output),
        "bus" => Some(ElementKind::Bus),
        "wireless-repeater" => Some(ElementKind::Repeater),
        "wireless-keypad" => Some(ElementKind::Keypad),
        _ => None,
    }
}

fn limit_list<'a>(config: &'a Config, kind: ElementKind) -> &'a [u16] {
    match kind {
        ElementKind::Zone => &config.zones,
        ElementKind::Partition => &config.partitions,
        ElementKind::Output => &config.outputs,
        ElementKind::Bus => &config.buses,
        ElementKind::Repeater => &config.repeaters,
        ElementKind::Keypad => &config.keypads,
        _ => &[],
    }
}

/// Drives the connection lifecycle, poll loop, and status-bulk
/// application on top of a live [`Dispatcher`]/[`PanelProfile`] pair.
pub struct Supervisor {
    config: Config,
    state: Arc<StateStore>,
    notifier: Arc<dyn Notifier>,
    event_processor: EventProcessor,
    run_state: Mutex<RunState>,
    wake: Arc<AtomicBool>,
    dispatcher: Mutex<Option<Arc<Dispatcher>>>,
    profile: Mutex<Option<Arc<dyn PanelProfile>>>,
    registry: ProfileRegistry,
    last_power_update: Mutex<Instant>,
    status_cache: Mutex<HashMap<String, StatusField>>,
}

impl Supervisor {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            state: Arc::new(StateStore::new()),
            notifier,
            event_processor: EventProcessor::new(),
            run_state: Mutex::new(RunState::Stop),
            wake: Arc::new(AtomicBool::new(false)),
            dispatcher: Mutex::new(None),
            profile: Mutex::new(None),
            registry: ProfileRegistry::with_defaults(),
            last_power_update: Mutex::new(Instant::now() - Duration::from_secs(86_400)),
            status_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> Arc<StateStore> {
        self.state.clone()
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.lock().unwrap()
    }

    /// A control surface bound to the currently live dispatcher/profile,
    /// or `None` when not connected.
    pub fn control_surface(&self) -> Option<ControlSurface> {
        let dispatcher = self.dispatcher.lock().unwrap().clone()?;
        let profile = self.profile.lock().unwrap().clone()?;
        Some(ControlSurface::new(dispatcher, profile, self.state.clone(), self.wake.clone()))
    }

    fn open_transport(&self) -> anyhow::Result<Transport> {
        if self.config.uses_relay() {
            let site_id = self.config.ip_connection_siteid.as_deref().unwrap();
            let email = self.config.ip_connection_email.as_deref().unwrap();
            let directory = SiteDirectoryClient::new()?;
            let endpoint = directory.lookup(site_id, email)?;
            let stream = RelayNegotiator::new().negotiate(&endpoint.xoraddr)?;
            Ok(Transport::from_stream(stream))
        } else {
            Ok(Transport::connect_direct(
                &self.config.ip_connection_host,
                self.config.ip_connection_port,
                Duration::from_secs(5),
            )?)
        }
    }

    /// Reset all state, open the transport, run the four-step IP
    /// handshake, then the panel-level handshake. Transitions
    /// `STOP -> RUN` on success; `STOP` otherwise.
    pub fn connect(&self) -> bool {
        self.state.reset();
        self.seed_system_labels();
        *self.status_cache.lock().unwrap() = HashMap::new();
        *self.run_state.lock().unwrap() = RunState::Run;

        let result = self.try_connect();
        if result {
            return true;
        }

        *self.run_state.lock().unwrap() = RunState::Stop;
        false
    }

    fn try_connect(&self) -> bool {
        let mut transport = match self.open_transport() {
            Ok(t) => t,
            Err(e) => {
                log::warn!("connect failed opening transport: {e:#}");
                return false;
            }
        };

        if let Err(e) = transport.open(self.config.ip_connection_password.as_bytes()) {
            log::warn!("connect failed during IP handshake: {e}");
            return false;
        }

        let dispatcher = Arc::new(Dispatcher::new(transport));
        let mut profile: Arc<dyn PanelProfile> = self.registry.resolve(None);

        log::info!("Initiating communication");
        let initial_reply = dispatcher
            .send_wait(
                profile.as_ref(),
                Some(MessageTemplate {
                    name: MessageName::InitiateCommunication,
                }),
                &MessageArgs::default(),
                5,
                Duration::from_secs(5),
                Some(0x07),
                |_| {},
            )
            .ok()
            .flatten();

        if initial_reply.is_none() {
            log::warn!("Unknown panel. Some features may not be supported");
        }

        log::info!("Starting communication");
        let start_reply = dispatcher.send_wait(
            profile.as_ref(),
            Some(MessageTemplate {
                name: MessageName::StartCommunication,
            }),
            &MessageArgs {
                source_id: Some(0x02),
                ..Default::default()
            },
            5,
            Duration::from_secs(5),
            Some(0x00),
            |_| {},
        );

        let start_reply = match start_reply {
            Ok(Some(reply)) => reply,
            _ => return false,
        };

        let product_id = match &start_reply {
            ParsedMessage::Reply { body, .. } => body.first().copied(),
            _ => None,
        };
        profile = self.registry.resolve(product_id);

        if !profile.initialize_communication(initial_reply.as_ref(), &self.config.password) {
            return false;
        }

        if self.config.sync_time {
            self.sync_time(&dispatcher, profile.as_ref());
        }

        profile.update_labels(&self.state);

        *self.dispatcher.lock().unwrap() = Some(dispatcher);
        *self.profile.lock().unwrap() = Some(profile);

        log::info!("Connection OK");
        true
    }

    fn seed_system_labels(&self) {
        self.state.set_label(ElementKind::System, 0, "power");
        self.state.set_label(ElementKind::System, 1, "rf");
        self.state.set_label(ElementKind::System, 2, "trouble");
    }

    fn sync_time(&self, dispatcher: &Dispatcher, profile: &dyn PanelProfile) {
        use chrono::{Datelike, Timelike};
        let now = chrono::Local::now();
        let args = MessageArgs {
            century: Some((now.year() / 100) as u8),
            year: Some((now.year() % 100) as u8),
            month: Some(now.month() as u8),
            day: Some(now.day() as u8),
            hour: Some(now.hour() as u8),
            minute: Some(now.minute() as u8),
            ..Default::default()
        };
        let reply = dispatcher.send_wait(
            profile,
            Some(MessageTemplate {
                name: MessageName::SetTimeDate,
            }),
            &args,
            5,
            Duration::from_secs(5),
            Some(0x03),
            |_| {},
        );
        if matches!(reply, Ok(None) | Err(_)) {
            log::warn!("Could not set panel time");
        }
    }

    /// `RUN -> STOP`: politely close the session.
    pub fn disconnect(&self) {
        if self.run_state() != RunState::Run {
            return;
        }
        *self.run_state.lock().unwrap() = RunState::Stop;
        self.close_connection();
    }

    /// `RUN -> PAUSE`: close the session without fully stopping.
    pub fn pause(&self) {
        if self.run_state() != RunState::Run {
            return;
        }
        *self.run_state.lock().unwrap() = RunState::Pause;
        self.close_connection();
    }

    /// `PAUSE -> RUN`: re-run `connect`.
    pub fn resume(&self) -> bool {
        if self.run_state() != RunState::Pause {
            return false;
        }
        self.connect()
    }

    fn close_connection(&self) {
        if let (Some(dispatcher), Some(profile)) = (
            self.dispatcher.lock().unwrap().clone(),
            self.profile.lock().unwrap().clone(),
        ) {
            let _ = dispatcher.send_wait(
                profile.as_ref(),
                Some(MessageTemplate {
                    name: MessageName::CloseConnection,
                }),
                &MessageArgs::default(),
                0,
                Duration::from_secs(5),
                Some(0x07),
                |_| {},
            );
            dispatcher.close();
        }
        *self.dispatcher.lock().unwrap() = None;
        *self.profile.lock().unwrap() = None;
    }

    /// Poll continuously until `run_state` leaves `RUN` (via
    /// `disconnect`/`pause` from another thread, typically a signal
    /// handler).
    pub fn run(&self) {
        while self.run_state() == RunState::Run {
            self.poll_once();
        }
    }

    /// Run exactly one status-request/keep-alive iteration, regardless
    /// of `run_state`. Intended for `--once` smoke-testing a config.
    pub fn run_once(&self) {
        self.poll_once();
    }

    /// Run one iteration of the status-request poll plus the
    /// between-poll event-draining wait. A terminate frame or a
    /// transport error at any point ends the session and transitions
    /// to `STOP` immediately, per spec.md §4.10/§7.
    fn poll_once(&self) {
        let (dispatcher, profile) = match (
            self.dispatcher.lock().unwrap().clone(),
            self.profile.lock().unwrap().clone(),
        ) {
            (Some(d), Some(p)) => (d, p),
            _ => return,
        };

        self.wake.store(false, Ordering::SeqCst);
        let mut last_reply_at = Instant::now();

        for &i in &self.config.status_requests.clone() {
            let args = MessageArgs {
                address: Some(MEM_STATUS_BASE + i as u32),
                ..Default::default()
            };
            let reply = dispatcher.send_wait(
                profile.as_ref(),
                Some(MessageTemplate {
                    name: MessageName::ReadEEPROM,
                }),
                &args,
                5,
                Duration::from_secs(5),
                Some(crate::constants::MSG_STATUS_REPLY),
                |event| self.deliver_event(event),
            );

            if let Err(e) = &reply {
                log::warn!("poll loop: transport error, ending session: {e}");
                self.end_session();
                return;
            }
            if dispatcher.terminated() {
                log::info!("panel closed the session");
                self.end_session();
                return;
            }

            if let Ok(Some(ParsedMessage::StatusBulk {
                status_request,
                power,
                rf_noise_floor,
                troubles,
                fields,
            })) = reply
            {
                last_reply_at = Instant::now();
                self.handle_status(status_request, power, rf_noise_floor, &troubles, fields);
            }
        }

        let keep_alive = Duration::from_secs(self.config.keep_alive_interval);
        while last_reply_at.elapsed() < keep_alive
            && self.run_state() == RunState::Run
            && !self.wake.load(Ordering::SeqCst)
        {
            let remaining = keep_alive.saturating_sub(last_reply_at.elapsed()).min(Duration::from_secs(1));
            let reply = dispatcher.send_wait(profile.as_ref(), None, &MessageArgs::default(), 0, remaining, None, |event| {
                self.deliver_event(event)
            });

            if reply.is_err() {
                log::warn!("keep-alive wait: transport error, ending session");
                self.end_session();
                return;
            }
            if dispatcher.terminated() {
                log::info!("panel closed the session");
                self.end_session();
                return;
            }
        }
    }

    /// The session ended unexpectedly (terminate frame or transport
    /// error): drop the dispatcher/profile and transition to `STOP`
    /// without attempting a final `CloseConnection` round-trip.
    fn end_session(&self) {
        *self.run_state.lock().unwrap() = RunState::Stop;
        *self.dispatcher.lock().unwrap() = None;
        *self.profile.lock().unwrap() = None;
    }

    fn deliver_event(&self, raw: RawEvent) {
        let processed = self.event_processor.process(&self.state, &raw);
        if let Some((text, severity)) = self.event_processor.classify(&self.state, &processed) {
            self.notifier.notify("Paradox", &text, severity);
        }
        self.notifier.event(
            (processed.major.0, &processed.major.1),
            (processed.minor.0, &processed.minor.1),
            match &processed.kind {
                crate::state::EventTargetKind::Zone => "Zone",
                crate::state::EventTargetKind::Partition => "Partition",
                crate::state::EventTargetKind::Output => "Output",
                crate::state::EventTargetKind::Other(s) => s.as_str(),
            },
        );
    }

    /// `handle_status`: for status-request 0, periodically refresh
    /// power/RF telemetry and trouble flags, then apply the bulk
    /// update; for 1..=5, apply the bulk update directly.
    fn handle_status(
        &self,
        status_request: u8,
        power: Option<crate::profile::PowerReading>,
        rf_noise_floor: Option<f64>,
        troubles: &HashMap<String, bool>,
        fields: HashMap<String, StatusField>,
    ) {
        if status_request == 0 {
            let mut last = self.last_power_update.lock().unwrap();
            if last.elapsed() >= Duration::from_secs(self.config.power_update_interval) {
                *last = Instant::now();
                drop(last);
                let force = self.config.push_power_update_without_change;
                if let Some(p) = power {
                    self.apply_changes(
                        ElementKind::System,
                        0,
                        &[
                            ("vdc", round2(p.vdc).into()),
                            ("battery", round2(p.battery).into()),
                            ("dc", round2(p.dc).into()),
                        ],
                        force,
                    );
                }
                if let Some(rf) = rf_noise_floor {
                    self.apply_changes(ElementKind::System, 1, &[("rf_noise_floor", round2(rf).into())], force);
                }
            }

            for (name, value) in troubles {
                if name.contains("not_used") {
                    continue;
                }
                self.apply_changes(ElementKind::System, 2, &[(name.as_str(), (*value).into())], false);
            }
        }

        if status_request <= 5 {
            self.process_status_bulk(fields);
        }
    }

    /// `process_status_bulk`: apply every field whose value changed
    /// since the last bulk reply, honoring the config key-inclusion
    /// lists.
    fn process_status_bulk(&self, fields: HashMap<String, StatusField>) {
        for (field_name, value) in fields {
            let Some((prefix, prop_name)) = field_name.split_once('_') else {
                continue;
            };
            let Some(kind) = kind_for_prefix(prefix) else {
                continue;
            };

            {
                let mut cache = self.status_cache.lock().unwrap();
                if cache.get(&field_name) == Some(&value) {
                    continue;
                }
                cache.insert(field_name.clone(), value.clone());
            }

            let allowed = limit_list(&self.config, kind);
            match value {
                StatusField::Status(blocks) => {
                    for (key, block) in blocks {
                        if !allowed.contains(&key) {
                            continue;
                        }
                        let changes: Vec<(&str, PropertyValue)> =
                            block.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
                        self.apply_changes(kind, key, &changes, self.config.push_update_without_change);
                    }
                }
                StatusField::Value(values) => {
                    for (key, v) in values {
                        if !allowed.contains(&key) {
                            continue;
                        }
                        self.apply_changes(kind, key, &[(prop_name, v)], self.config.push_update_without_change);
                    }
                }
            }
        }
    }

    fn apply_changes(&self, kind: ElementKind, key: u16, changes: &[(&str, PropertyValue)], force: bool) {
        let applied = self.state.update_properties(kind, key, changes, force);
        for change in applied {
            let is_partition_notify = kind == ElementKind::Partition
                && !self.config.partitions_change_notification_ignore.contains(&change.property);
            let is_trouble = change.property.contains("trouble");
            self.notifier.change(
                kind,
                &change.label,
                &change.property,
                &format!("{:?}", change.new),
                change.initial,
            );
            if !change.initial && (is_partition_notify || is_trouble) {
                self.notifier.notify(
                    "Paradox",
                    &format!("{} {} {:?}", change.label, change.property, change.new),
                    Severity::Info,
                );
            }
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
