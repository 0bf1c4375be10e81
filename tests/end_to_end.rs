//! End-to-end scenarios against the public API, covering the literal
//! cases from the bridge's behavioral spec: handshake, zone open, fire
//! alarm, partition arm by label, and bulk-status idempotency.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use paradox_bridge::control::ControlSurface;
use paradox_bridge::dispatcher::Dispatcher;
use paradox_bridge::profile::{GenericProfile, PanelProfile};
use paradox_bridge::state::{EventProcessor, EventTargetKind, RawEvent};
use paradox_bridge::transport::{FrameHeader, IpFrameCodec};
use paradox_bridge::{ElementKind, Severity, StateStore, Transport};

fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client_thread = thread::spawn(move || TcpStream::connect(addr).unwrap());
    let (server, _) = listener.accept().unwrap();
    (client_thread.join().unwrap(), server)
}

fn frame(command: u8, payload: &[u8], key: &[u8]) -> Vec<u8> {
    let header = FrameHeader {
        length: payload.len() as u8,
        unknown0: 0x04,
        flags: 0x01,
        command,
    };
    IpFrameCodec::build(header, payload, key)
}

/// Scenario 1: a fake panel replies to the four handshake steps and
/// `Transport::open` returns the reported version, keyed by the
/// session key the panel handed back.
#[test]
fn handshake_happy_path() {
    let (client, mut server) = loopback_pair();
    let mut transport = Transport::from_stream(client);

    let password = b"pw";
    let mut session_key = b"sessionkeysixte".to_vec();
    session_key.resize(16, 0);
    let key_for_server = session_key.clone();

    let server_thread = thread::spawn(move || {
        let mut buf = [0u8; 4096];
        let n = server.read(&mut buf).unwrap();
        let (_, payload) = IpFrameCodec::parse(&buf[..n], b"pw").unwrap();
        assert_eq!(payload, b"pw".to_vec());

        let mut reply = key_for_server.clone();
        reply.extend_from_slice(&[5, 2, 1, 9]);
        let header = FrameHeader {
            length: reply.len() as u8,
            unknown0: 0x03,
            flags: 0x01,
            command: 0xF0,
        };
        server.write_all(&IpFrameCodec::build(header, &reply, b"pw")).unwrap();

        for cmd in [0xF2u8, 0xF3, 0xF8] {
            let n = server.read(&mut buf).unwrap();
            let (parsed, _) = IpFrameCodec::parse(&buf[..n], &key_for_server).unwrap();
            assert_eq!(parsed.command, cmd);
            let header = FrameHeader {
                length: 0,
                unknown0: 0x03,
                flags: 0x01,
                command: cmd,
            };
            server.write_all(&IpFrameCodec::build(header, b"", &key_for_server)).unwrap();
        }
    });

    let version = transport.open(password).unwrap();
    assert_eq!((version.major, version.minor, version.ip_major, version.ip_minor), (5, 2, 1, 9));
    server_thread.join().unwrap();
}

/// Scenario 2: a zone-open event updates state and produces no
/// notification (open/close transitions are dropped at classify time).
#[test]
fn zone_open_event_updates_state_without_notifying() {
    let state = StateStore::new();
    state.set_label(ElementKind::Zone, 3, "Kitchen");
    let processor = EventProcessor::new();

    let raw = RawEvent {
        major: (1, "Zone open".to_string()),
        minor: (3, "raw".to_string()),
        kind: EventTargetKind::Zone,
    };
    let processed = processor.process(&state, &raw);

    assert_eq!(state.get_property(ElementKind::Zone, 3, "open"), Some(true.into()));
    assert_eq!(processed.minor.1, "Kitchen");
    assert!(processor.classify(&state, &processed).is_none());
}

/// Scenario 3: a fire alarm event updates state and produces a
/// critical notification mentioning the zone's live label.
#[test]
fn fire_alarm_event_is_critical_and_mentions_label() {
    let state = StateStore::new();
    state.set_label(ElementKind::Zone, 2, "Hallway");
    let processor = EventProcessor::new();

    let raw = RawEvent {
        major: (37, "Fire alarm".to_string()),
        minor: (2, "raw".to_string()),
        kind: EventTargetKind::Zone,
    };
    let processed = processor.process(&state, &raw);
    let (text, severity) = processor.classify(&state, &processed).unwrap();

    assert_eq!(severity, Severity::Critical);
    assert!(text.contains("Fire alarm"));
    assert!(text.contains("Hallway"));
    assert_eq!(state.get_property(ElementKind::Zone, 2, "fire_alarm"), Some(true.into()));
}

/// Scenario 4: arming a partition selected by its label runs the
/// handshake, then dispatches `PerformAction(action=ARM, argument=0)`
/// and returns true on an accepted reply.
#[test]
fn partition_arm_via_label_dispatches_perform_action() {
    let (client, mut server) = loopback_pair();
    let mut transport = Transport::from_stream(client);

    let mut session_key = b"partitionsess16b".to_vec();
    session_key.resize(16, 0);
    let key_for_server = session_key.clone();

    let server_thread = thread::spawn(move || {
        let mut buf = [0u8; 4096];

        let n = server.read(&mut buf).unwrap();
        let (_, payload) = IpFrameCodec::parse(&buf[..n], b"pw").unwrap();
        assert_eq!(payload, b"pw".to_vec());
        let mut reply = key_for_server.clone();
        reply.extend_from_slice(&[1, 0, 0, 0]);
        let header = FrameHeader {
            length: reply.len() as u8,
            unknown0: 0x03,
            flags: 0x01,
            command: 0xF0,
        };
        server.write_all(&IpFrameCodec::build(header, &reply, b"pw")).unwrap();

        for cmd in [0xF2u8, 0xF3, 0xF8] {
            let n = server.read(&mut buf).unwrap();
            let (parsed, _) = IpFrameCodec::parse(&buf[..n], &key_for_server).unwrap();
            assert_eq!(parsed.command, cmd);
            let header = FrameHeader {
                length: 0,
                unknown0: 0x03,
                flags: 0x01,
                command: cmd,
            };
            server.write_all(&IpFrameCodec::build(header, b"", &key_for_server)).unwrap();
        }

        let n = server.read(&mut buf).unwrap();
        let (_, payload) = IpFrameCodec::parse(&buf[..n], &key_for_server).unwrap();
        assert_eq!(payload, vec![0x04, 0x04, 0x00]); // action=ARM, argument=key(1)-1
        server.write_all(&frame(0x00, &[0x04], &key_for_server)).unwrap();
    });

    transport.open(b"pw").unwrap();

    let state = Arc::new(StateStore::new());
    state.set_label(ElementKind::Partition, 1, "Home");
    let dispatcher = Arc::new(Dispatcher::new(transport));
    let profile: Arc<dyn PanelProfile> = Arc::new(GenericProfile::generic());
    let wake = Arc::new(AtomicBool::new(false));
    let control = ControlSurface::new(dispatcher, profile, state, wake);

    assert!(control.control_partition("Home", "arm"));
    server_thread.join().unwrap();
}

/// Bulk-status idempotency (spec'd invariant underlying scenario 5):
/// two successive writes of the identical value produce one applied
/// change, then none.
#[test]
fn identical_property_write_is_idempotent() {
    let state = StateStore::new();
    state.set_label(ElementKind::Zone, 1, "Kitchen");

    let first = state.update_properties(ElementKind::Zone, 1, &[("open", true.into())], false);
    assert_eq!(first.len(), 1);

    let second = state.update_properties(ElementKind::Zone, 1, &[("open", true.into())], false);
    assert!(second.is_empty(), "re-applying the identical value must not re-notify");
}
