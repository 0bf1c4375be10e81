//! A single, honest wire encoding shared by every supported panel
//! family. Real per-family EEPROM/label byte layouts are out of scope;
//! this profile is enough to drive handshake, control, and status
//! polling through the whole engine in tests, with the same
//! `get_message`/`parse_message`/`initialize_communication`/
//! `update_labels` seam a real per-family profile would fill in.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::{PropertyValue, StateStore};

use super::{
    MessageArgs, MessageName, MessageTemplate, ParsedMessage, PanelProfile, PowerReading, StatusField,
};

#[derive(Serialize, Deserialize)]
struct EventWire {
    major: (u8, String),
    minor: (u8, String),
    kind: String,
}

#[derive(Serialize, Deserialize)]
enum StatusFieldWire {
    Status(HashMap<u16, HashMap<String, PropertyValue>>),
    Value(HashMap<u16, PropertyValue>),
}

#[derive(Serialize, Deserialize)]
struct StatusBulkWire {
    status_request: u8,
    power: Option<(f64, f64, f64)>,
    rf_noise_floor: Option<f64>,
    troubles: HashMap<String, bool>,
    fields: HashMap<String, StatusFieldWire>,
}

const TAG_EVENT: u8 = crate::constants::MSG_EVENT;
const TAG_TERMINATE: u8 = crate::constants::MSG_TERMINATE;
const TAG_STATUS_BULK: u8 = crate::constants::MSG_STATUS_REPLY;

/// A generic profile, parameterized only by a family label for logging
/// and `update_labels` seeding. `Evo` and `DgpNeo` are thin aliases
/// until real per-family label/EEPROM layouts are added.
pub struct GenericProfile {
    family: &'static str,
}

impl GenericProfile {
    pub fn generic() -> Self {
        Self { family: "generic" }
    }

    pub fn evo() -> Self {
        Self { family: "evo" }
    }

    pub fn dgp_neo() -> Self {
        Self { family: "dgp-neo" }
    }
}

impl PanelProfile for GenericProfile {
    fn get_message(&self, template: MessageTemplate, args: &MessageArgs) -> Vec<u8> {
        match template.name {
            MessageName::InitiateCommunication => vec![0x00],
            MessageName::StartCommunication => vec![0x01, args.source_id.unwrap_or(0)],
            MessageName::SetTimeDate => vec![
                0x02,
                args.century.unwrap_or(0),
                args.year.unwrap_or(0),
                args.month.unwrap_or(0),
                args.day.unwrap_or(0),
                args.hour.unwrap_or(0),
                args.minute.unwrap_or(0),
            ],
            MessageName::ReadEEPROM => {
                let mut out = vec![0x03];
                out.extend_from_slice(&args.address.unwrap_or(0).to_le_bytes());
                out
            }
            MessageName::PerformAction => vec![0x04, args.action.unwrap_or(0), args.argument.unwrap_or(0)],
            MessageName::CloseConnection => vec![0x05],
        }
    }

    fn parse_message(&self, bytes: &[u8]) -> Option<ParsedMessage> {
        let (&tag, rest) = bytes.split_first()?;

        match tag {
            TAG_EVENT => {
                let wire: EventWire = serde_json::from_slice(rest).ok()?;
                Some(ParsedMessage::Event {
                    major: wire.major,
                    minor: wire.minor,
                    kind: wire.kind,
                })
            }
            TAG_TERMINATE => Some(ParsedMessage::Terminate),
            TAG_STATUS_BULK => {
                let wire: StatusBulkWire = serde_json::from_slice(rest).ok()?;
                let power = wire.power.map(|(vdc, battery, dc)| PowerReading { vdc, battery, dc });
                let fields = wire
                    .fields
                    .into_iter()
                    .map(|(k, v)| {
                        let field = match v {
                            StatusFieldWire::Status(m) => StatusField::Status(m),
                            StatusFieldWire::Value(m) => StatusField::Value(m),
                        };
                        (k, field)
                    })
                    .collect();
                Some(ParsedMessage::StatusBulk {
                    status_request: wire.status_request,
                    power,
                    rf_noise_floor: wire.rf_noise_floor,
                    troubles: wire.troubles,
                    fields,
                })
            }
            code => Some(ParsedMessage::Reply {
                code,
                body: rest.to_vec(),
            }),
        }
    }

    fn initialize_communication(&self, _initial_reply: Option<&ParsedMessage>, password: &str) -> bool {
        !password.is_empty()
    }

    fn update_labels(&self, _state: &StateStore) {
        // Real per-family profiles read EEPROM label regions here and
        // populate zone/partition/output labels from them. The generic
        // profile has no EEPROM layout to read, so there is nothing to
        // do: the system labels are already seeded by
        // `Supervisor::seed_system_labels` before this is called.
    }

    fn family(&self) -> &'static str {
        self.family
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiate_communication_message_is_one_byte() {
        let profile = GenericProfile::generic();
        let msg = profile.get_message(
            MessageTemplate {
                name: MessageName::InitiateCommunication,
            },
            &MessageArgs::default(),
        );
        assert_eq!(msg, vec![0x00]);
    }

    #[test]
    fn read_eeprom_encodes_little_endian_address() {
        let profile = GenericProfile::generic();
        let msg = profile.get_message(
            MessageTemplate {
                name: MessageName::ReadEEPROM,
            },
            &MessageArgs {
                address: Some(0x8002),
                ..Default::default()
            },
        );
        assert_eq!(msg, vec![0x03, 0x02, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn parses_event_message() {
        let profile = GenericProfile::generic();
        let wire = EventWire {
            major: (37, "Fire alarm".into()),
            minor: (2, "Hallway".into()),
            kind: "Zone".into(),
        };
        let mut bytes = vec![TAG_EVENT];
        bytes.extend_from_slice(&serde_json::to_vec(&wire).unwrap());

        let parsed = profile.parse_message(&bytes).unwrap();
        match parsed {
            ParsedMessage::Event { major, minor, kind } => {
                assert_eq!(major, (37, "Fire alarm".to_string()));
                assert_eq!(minor, (2, "Hallway".to_string()));
                assert_eq!(kind, "Zone");
            }
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn parses_terminate_message() {
        let profile = GenericProfile::generic();
        assert_eq!(profile.parse_message(&[TAG_TERMINATE]), Some(ParsedMessage::Terminate));
    }

    #[test]
    fn parses_plain_reply() {
        let profile = GenericProfile::generic();
        let parsed = profile.parse_message(&[0x07, 0xAA, 0xBB]).unwrap();
        assert_eq!(
            parsed,
            ParsedMessage::Reply {
                code: 0x07,
                body: vec![0xAA, 0xBB]
            }
        );
    }

    #[test]
    fn initialize_communication_requires_nonempty_password() {
        let profile = GenericProfile::generic();
        assert!(!profile.initialize_communication(None, ""));
        assert!(profile.initialize_communication(None, "1234"));
    }
}
