//! IP-module frame codec: `header(16 bytes) || payload(N bytes)`.
//!
//! ```text
//! offset 0      magic     0xAA
//! offset 1      length    unencrypted logical payload length
//! offset 2-3    unknown0  0x03 session control, 0x04 data (LE u16)
//! offset 4      flags     bit 0 = encrypted payload
//! offset 5      command   0xF0/0xF2/0xF3/0xF8 session, 0x00 data
//! offset 6-15   reserved  zeros
//! ```

use crate::constants::{BLOCK_SIZE, FRAME_MAGIC, HEADER_SIZE};
use crate::crypto;
use crate::transport::TransportError;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Logical (unencrypted) payload length.
    pub length: u8,
    /// `0x03` on session-control frames, `0x04` on data frames.
    pub unknown0: u16,
    /// Bit 0 set means the payload is encrypted.
    pub flags: u8,
    /// Command byte: `0xF0`/`0xF2`/`0xF3`/`0xF8` during handshake, `0x00` for data.
    pub command: u8,
}

impl FrameHeader {
    /// True when the encrypted-payload flag is set.
    pub fn is_encrypted(&self) -> bool {
        self.flags & 0x01 != 0
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = FRAME_MAGIC;
        buf[1] = self.length;
        buf[2..4].copy_from_slice(&self.unknown0.to_le_bytes());
        buf[4] = self.flags;
        buf[5] = self.command;
        buf
    }

    fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            length: buf[1],
            unknown0: u16::from_le_bytes([buf[2], buf[3]]),
            flags: buf[4],
            command: buf[5],
        }
    }
}

/// Stateless builder/parser for IP-module frames.
pub struct IpFrameCodec;

impl IpFrameCodec {
    /// Build a frame, encrypting `payload` under `key` when
    /// `header.flags & 1 == 1`.
    pub fn build(header: FrameHeader, payload: &[u8], key: &[u8]) -> Vec<u8> {
        let mut header = header;
        header.length = payload.len() as u8;

        let body = if header.is_encrypted() {
            crypto::encrypt(payload, key)
        } else {
            payload.to_vec()
        };

        let mut out = Vec::with_capacity(HEADER_SIZE + body.len());
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Parse a complete frame, decrypting and truncating the payload to
    /// `header.length` when the encrypted flag is set.
    ///
    /// Rejects frames whose magic byte is not `0xAA`.
    pub fn parse(bytes: &[u8], key: &[u8]) -> Result<(FrameHeader, Vec<u8>), TransportError> {
        if bytes.len() < HEADER_SIZE {
            return Err(TransportError::MalformedFrame(format!(
                "frame shorter than header: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != FRAME_MAGIC {
            return Err(TransportError::MalformedFrame(format!(
                "bad magic byte: 0x{:02x}",
                bytes[0]
            )));
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        header_buf.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = FrameHeader::from_bytes(&header_buf);

        let raw_payload = &bytes[HEADER_SIZE..];
        let payload = if header.is_encrypted() {
            if raw_payload.len() % BLOCK_SIZE != 0 {
                return Err(TransportError::MalformedFrame(format!(
                    "encrypted payload not block-aligned: {} bytes",
                    raw_payload.len()
                )));
            }
            let decrypted = crypto::decrypt(raw_payload, key);
            let len = (header.length as usize).min(decrypted.len());
            decrypted[..len].to_vec()
        } else {
            raw_payload.to_vec()
        };

        Ok((header, payload))
    }

    /// Total on-wire length for a frame whose logical payload is
    /// `logical_len` bytes and which is (or isn't) encrypted.
    pub fn wire_len(logical_len: usize, encrypted: bool) -> usize {
        if encrypted {
            let blocks = logical_len.div_ceil(BLOCK_SIZE).max(1);
            HEADER_SIZE + blocks * BLOCK_SIZE
        } else {
            HEADER_SIZE + logical_len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(command: u8, unknown0: u16, encrypted: bool) -> FrameHeader {
        FrameHeader {
            length: 0,
            unknown0,
            flags: if encrypted { 0x01 } else { 0x00 },
            command,
        }
    }

    #[test]
    fn round_trip_unencrypted() {
        let key = b"irrelevant";
        let h = header(0x00, 0x04, false);
        let payload = b"hello";
        let wire = IpFrameCodec::build(h, payload, key);
        let (parsed_header, parsed_payload) = IpFrameCodec::parse(&wire, key).unwrap();
        assert_eq!(parsed_header.command, 0x00);
        assert_eq!(parsed_header.unknown0, 0x04);
        assert!(!parsed_header.is_encrypted());
        assert_eq!(parsed_payload, payload);
    }

    #[test]
    fn round_trip_encrypted() {
        let key = b"sessionkey123456";
        let h = header(0xF0, 0x03, true);
        let payload = b"encrypt me please";
        let wire = IpFrameCodec::build(h, payload, key);
        assert_eq!((wire.len() - HEADER_SIZE) % BLOCK_SIZE, 0);

        let (parsed_header, parsed_payload) = IpFrameCodec::parse(&wire, key).unwrap();
        assert!(parsed_header.is_encrypted());
        assert_eq!(parsed_payload, payload);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut wire = IpFrameCodec::build(header(0x00, 0x04, false), b"x", b"k");
        wire[0] = 0x00;
        assert!(IpFrameCodec::parse(&wire, b"k").is_err());
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(IpFrameCodec::parse(&[0xAA, 0x01], b"k").is_err());
    }

    #[test]
    fn rejects_misaligned_encrypted_payload() {
        let mut wire = IpFrameCodec::build(header(0xF0, 0x03, true), b"x", b"k");
        wire.pop();
        assert!(IpFrameCodec::parse(&wire, b"k").is_err());
    }
}
