//! Owns the duplex socket (direct or relayed) and the session key, and
//! drives the four-step handshake plus post-handshake send/recv.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::constants::{
    BLOCK_SIZE, CMD_CONNECT, CMD_DATA, CMD_F2, CMD_F3, CMD_F8, F8_PAYLOAD, FRAME_MAGIC,
    HEADER_SIZE, UNKNOWN0_DATA, UNKNOWN0_SESSION,
};
use crate::transport::frame::{FrameHeader, IpFrameCodec};
use crate::transport::TransportError;

/// Panel firmware/IP-module version reported during the connect handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelVersion {
    pub major: u8,
    pub minor: u8,
    pub ip_major: u8,
    pub ip_minor: u8,
}

/// A duplex, encrypted, framed channel to the panel's IP module.
pub struct Transport {
    stream: TcpStream,
    key: Vec<u8>,
    read_buf: Vec<u8>,
}

impl Transport {
    /// Connect directly to `host:port`.
    pub fn connect_direct(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TransportError::MalformedFrame(format!("could not resolve {host}:{port}")))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-negotiated relay data channel.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream,
            key: Vec::new(),
            read_buf: Vec::new(),
        }
    }

    fn session_frame(&self, command: u8, payload: &[u8], key: &[u8]) -> Vec<u8> {
        let header = FrameHeader {
            length: payload.len() as u8,
            unknown0: UNKNOWN0_SESSION,
            flags: 0x01,
            command,
        };
        IpFrameCodec::build(header, payload, key)
    }

    fn handshake_roundtrip(
        &mut self,
        step: &'static str,
        command: u8,
        payload: &[u8],
        key: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let wire = self.session_frame(command, payload, key);
        self.stream.write_all(&wire)?;

        match self.read_frame(timeout, key)? {
            Some((_, body)) => Ok(body),
            None => Err(TransportError::Handshake {
                step,
                reason: "no reply before timeout".into(),
            }),
        }
    }

    /// Run the four-step handshake (`CONNECT`, `F2`, `F3`, `F8`), replacing
    /// `password` with the session key the panel returns.
    pub fn open(&mut self, password: &[u8]) -> Result<PanelVersion, TransportError> {
        let connect_reply =
            self.handshake_roundtrip("CONNECT", CMD_CONNECT, password, password, Duration::from_secs(5))?;

        if connect_reply.len() < BLOCK_SIZE {
            return Err(TransportError::Handshake {
                step: "CONNECT",
                reason: format!("reply too short for session key: {} bytes", connect_reply.len()),
            });
        }
        self.key = connect_reply[..BLOCK_SIZE].to_vec();

        let version_bytes = &connect_reply[BLOCK_SIZE..];
        let version = PanelVersion {
            major: version_bytes.first().copied().unwrap_or(0),
            minor: version_bytes.get(1).copied().unwrap_or(0),
            ip_major: version_bytes.get(2).copied().unwrap_or(0),
            ip_minor: version_bytes.get(3).copied().unwrap_or(0),
        };

        self.handshake_roundtrip("F2", CMD_F2, b"", &self.key.clone(), Duration::from_secs(5))?;
        self.handshake_roundtrip("F3", CMD_F3, b"", &self.key.clone(), Duration::from_secs(5))?;
        self.handshake_roundtrip("F8", CMD_F8, &F8_PAYLOAD, &self.key.clone(), Duration::from_secs(5))?;

        Ok(version)
    }

    /// Encrypt and frame `plain` as a post-handshake data request.
    pub fn send(&mut self, plain: &[u8]) -> Result<(), TransportError> {
        let header = FrameHeader {
            length: plain.len() as u8,
            unknown0: UNKNOWN0_DATA,
            flags: 0x01,
            command: CMD_DATA,
        };
        let wire = IpFrameCodec::build(header, plain, &self.key);
        self.stream.write_all(&wire)?;
        Ok(())
    }

    /// Read and decrypt one payload, honoring `timeout`. Returns `None`
    /// on timeout (not an error).
    pub fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.read_frame(timeout, &self.key.clone())?.map(|(_, payload)| payload))
    }

    /// Read one complete frame off the wire, resynchronizing on bad
    /// magic bytes. Returns `None` on a read timeout.
    fn read_frame(
        &mut self,
        timeout: Duration,
        key: &[u8],
    ) -> Result<Option<(FrameHeader, Vec<u8>)>, TransportError> {
        self.stream.set_read_timeout(Some(timeout))?;

        loop {
            // Resync: drop leading bytes until a magic byte starts the buffer.
            if let Some(pos) = self.read_buf.iter().position(|&b| b == FRAME_MAGIC) {
                if pos > 0 {
                    self.read_buf.drain(..pos);
                }
            } else if !self.read_buf.is_empty() {
                self.read_buf.clear();
            }

            if self.read_buf.len() >= HEADER_SIZE {
                let declared_len = self.read_buf[1] as usize;
                let is_encrypted = self.read_buf[4] & 0x01 != 0;
                let body_len = IpFrameCodec::wire_len(declared_len, is_encrypted) - HEADER_SIZE;
                let total = HEADER_SIZE + body_len;

                if self.read_buf.len() >= total {
                    let frame_bytes: Vec<u8> = self.read_buf.drain(..total).collect();
                    let (header, payload) = IpFrameCodec::parse(&frame_bytes, key)?;
                    return Ok(Some((header, payload)));
                }
            }

            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(TransportError::Socket(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "panel closed the connection",
                    )))
                }
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    return Ok(None)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Close the underlying socket.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    /// Set the session key directly, bypassing `open()`. Only for tests
    /// that need an already-keyed transport without running a handshake.
    #[cfg(test)]
    pub fn set_key_for_test(&mut self, key: Vec<u8>) {
        self.key = key;
    }
}
