//! STUN/TURN-style rendezvous negotiation with the vendor's cloud relay.
//!
//! Opens a TCP control channel to [`crate::constants::RELAY_HOST`] and
//! performs, in order: change-request, binding request, connect request
//! (bearing the module's `xoraddr`), then opens a second TCP connection
//! to the same peer and sends connection-bind with the connection id
//! returned by the connect request. The second socket is the data
//! channel handed to [`crate::transport::Transport`].

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::constants::RELAY_HOST;

/// Errors from relay negotiation.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A socket operation failed.
    #[error("relay socket error: {0}")]
    Io(#[from] std::io::Error),

    /// A relay response carried an error attribute, or negotiation
    /// otherwise failed to produce a usable connection.
    #[error("relay setup failed at {step}: {reason}")]
    Setup { step: &'static str, reason: String },
}

const MSG_TYPE_CHANGE_REQUEST: u16 = 0x0003;
const MSG_TYPE_BINDING_REQUEST: u16 = 0x0001;
const MSG_TYPE_CONNECT_REQUEST: u16 = 0x000A;
const MSG_TYPE_CONNECTION_BIND: u16 = 0x000B;

const ATTR_XOR_ADDR: u16 = 0x0001;
const ATTR_CONNECTION_ID: u16 = 0x002A;
const ATTR_ERROR_CODE: u16 = 0x0009;

/// A minimal STUN-style message: 2-byte type, 2-byte length, then
/// length-prefixed TLV attributes.
struct StunMessage {
    msg_type: u16,
    attributes: Vec<(u16, Vec<u8>)>,
}

impl StunMessage {
    fn request(msg_type: u16) -> Self {
        Self {
            msg_type,
            attributes: Vec::new(),
        }
    }

    fn with_attribute(mut self, attr_type: u16, value: Vec<u8>) -> Self {
        self.attributes.push((attr_type, value));
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (attr_type, value) in &self.attributes {
            body.write_u16::<BigEndian>(*attr_type).unwrap();
            body.write_u16::<BigEndian>(value.len() as u16).unwrap();
            body.extend_from_slice(value);
        }

        let mut out = Vec::with_capacity(4 + body.len());
        out.write_u16::<BigEndian>(self.msg_type).unwrap();
        out.write_u16::<BigEndian>(body.len() as u16).unwrap();
        out.extend_from_slice(&body);
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, RelayError> {
        if bytes.len() < 4 {
            return Err(RelayError::Setup {
                step: "decode",
                reason: "response shorter than header".into(),
            });
        }
        let mut cursor = &bytes[..];
        let msg_type = cursor.read_u16::<BigEndian>().unwrap();
        let length = cursor.read_u16::<BigEndian>().unwrap() as usize;
        if cursor.len() < length {
            return Err(RelayError::Setup {
                step: "decode",
                reason: "truncated attribute body".into(),
            });
        }

        let mut attributes = Vec::new();
        let mut body = &cursor[..length];
        while body.len() >= 4 {
            let attr_type = body.read_u16::<BigEndian>().unwrap();
            let attr_len = body.read_u16::<BigEndian>().unwrap() as usize;
            if body.len() < attr_len {
                break;
            }
            attributes.push((attr_type, body[..attr_len].to_vec()));
            body = &body[attr_len..];
        }

        Ok(Self { msg_type, attributes })
    }

    fn attribute(&self, attr_type: u16) -> Option<&[u8]> {
        self.attributes
            .iter()
            .find(|(t, _)| *t == attr_type)
            .map(|(_, v)| v.as_slice())
    }

    fn error(&self) -> Option<String> {
        self.attribute(ATTR_ERROR_CODE)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

fn send_and_receive(stream: &mut TcpStream, msg: StunMessage) -> Result<StunMessage, RelayError> {
    stream.write_all(&msg.encode())?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header)?;
    let length = u16::from_be_bytes([header[2], header[3]]) as usize;

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body)?;

    let mut full = header.to_vec();
    full.extend_from_slice(&body);
    StunMessage::decode(&full)
}

/// Negotiates a relayed TCP connection to a panel's IP module via the
/// vendor's STUN/TURN-style rendezvous server. Single-use: call
/// [`RelayNegotiator::negotiate`] once per connection attempt.
pub struct RelayNegotiator {
    connect_timeout: Duration,
}

impl RelayNegotiator {
    /// Create a negotiator with a 5 second control-channel connect timeout.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Run the four-step negotiation and return the data channel socket.
    pub fn negotiate(&self, xoraddr: &[u8]) -> Result<TcpStream, RelayError> {
        let control_addr = (RELAY_HOST, 3478)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RelayError::Setup {
                step: "resolve",
                reason: format!("could not resolve {RELAY_HOST}"),
            })?;

        let mut control = TcpStream::connect_timeout(&control_addr, self.connect_timeout)?;

        let change_response = send_and_receive(&mut control, StunMessage::request(MSG_TYPE_CHANGE_REQUEST))?;
        if let Some(err) = change_response.error() {
            return Err(RelayError::Setup { step: "change-request", reason: err });
        }

        let binding_response = send_and_receive(&mut control, StunMessage::request(MSG_TYPE_BINDING_REQUEST))?;
        if let Some(err) = binding_response.error() {
            return Err(RelayError::Setup { step: "binding-request", reason: err });
        }

        let connect_request =
            StunMessage::request(MSG_TYPE_CONNECT_REQUEST).with_attribute(ATTR_XOR_ADDR, xoraddr.to_vec());
        let connect_response = send_and_receive(&mut control, connect_request)?;
        if let Some(err) = connect_response.error() {
            return Err(RelayError::Setup { step: "connect-request", reason: err });
        }
        let connection_id = connect_response
            .attribute(ATTR_CONNECTION_ID)
            .ok_or_else(|| RelayError::Setup {
                step: "connect-request",
                reason: "no connection id in response".into(),
            })?
            .to_vec();

        let peer_addr = control.peer_addr()?;
        let mut data_channel = TcpStream::connect_timeout(&peer_addr, self.connect_timeout)?;

        let bind_request =
            StunMessage::request(MSG_TYPE_CONNECTION_BIND).with_attribute(ATTR_CONNECTION_ID, connection_id);
        let bind_response = send_and_receive(&mut data_channel, bind_request)?;
        if let Some(err) = bind_response.error() {
            return Err(RelayError::Setup { step: "connection-bind", reason: err });
        }

        Ok(data_channel)
    }
}

impl Default for RelayNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stun_message_round_trip() {
        let msg = StunMessage::request(MSG_TYPE_CONNECT_REQUEST)
            .with_attribute(ATTR_XOR_ADDR, vec![1, 2, 3, 4]);
        let encoded = msg.encode();
        let decoded = StunMessage::decode(&encoded).unwrap();
        assert_eq!(decoded.msg_type, MSG_TYPE_CONNECT_REQUEST);
        assert_eq!(decoded.attribute(ATTR_XOR_ADDR), Some(&[1, 2, 3, 4][..]));
        assert!(decoded.error().is_none());
    }

    #[test]
    fn stun_message_with_error_attribute() {
        let msg = StunMessage::request(MSG_TYPE_BINDING_REQUEST)
            .with_attribute(ATTR_ERROR_CODE, b"stale nonce".to_vec());
        let decoded = StunMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.error().as_deref(), Some("stale nonce"));
    }

    #[test]
    fn decode_rejects_truncated_header() {
        assert!(StunMessage::decode(&[0x00, 0x01]).is_err());
    }
}
