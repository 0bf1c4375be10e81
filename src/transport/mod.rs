//! Encrypted, framed transport to the panel: direct TCP or cloud-relayed,
//! plus the four-step session handshake.

pub mod directory;
pub mod frame;
pub mod relay;
pub mod session;

pub use directory::{DirectoryError, ModuleEndpoint, SiteDirectoryClient};
pub use frame::{FrameHeader, IpFrameCodec};
pub use relay::{RelayError, RelayNegotiator};
pub use session::{PanelVersion, Transport};

use thiserror::Error;

/// Errors surfaced by the transport layer.
///
/// `TransportError` and `HandshakeError` (spec.md §7) are both modeled as
/// variants of one enum: both close the session and drive the supervisor
/// to `STOP`, and a caller rarely needs to distinguish them.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying socket was closed or errored.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// A frame failed to parse: bad magic after resync, truncated
    /// header, or a declared length that doesn't fit what was read.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A step of the four-step handshake got no reply or an unexpected
    /// command code.
    #[error("handshake failed at step {step}: {reason}")]
    Handshake { step: &'static str, reason: String },
}
