//! Serializes the write-then-read cycle on a single `Transport` and
//! routes asynchronous events to the event pipeline, ahead of any
//! explicit reply.
//!
//! Grounded on `paradox.py.send_wait`: a process-wide mutex there
//! becomes a `Mutex` owned by this `Dispatcher` instance instead, per
//! spec.md §9's "no process-wide singletons" design note.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::profile::{MessageArgs, MessageTemplate, ParsedMessage, PanelProfile};
use crate::state::{EventTargetKind, RawEvent};
use crate::transport::{Transport, TransportError};

/// Errors surfaced by [`Dispatcher::send_wait`] itself (as opposed to
/// ones returned as `Ok(None)`, which are expected "no reply" outcomes).
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Outcome of parsing one panel payload during a `send_wait` attempt.
enum Step {
    /// A reply that satisfies the caller (or no `reply_expected` was set).
    Matched(ParsedMessage),
    /// An event was routed to the pipeline; keep waiting without
    /// consuming a retry.
    EventConsumed,
    /// The panel closed the session.
    Terminated,
    /// Nothing usable yet; consume a retry (if any were requested).
    Retry,
}

/// Serializes request/reply traffic on one [`Transport`] and classifies
/// every inbound payload as a reply, an event, or a terminate notice.
pub struct Dispatcher {
    transport: Mutex<Transport>,
    /// Set once a `0x70` terminate frame is observed. `send_wait` itself
    /// still returns `Ok(None)` for a terminate (it's a valid "no reply"
    /// outcome to the immediate caller); this is the side channel the
    /// supervisor polls to tell a real terminate apart from a plain
    /// timeout, per spec.md §4.7's "surface an error to the supervisor
    /// and return None".
    terminated: AtomicBool,
}

impl Dispatcher {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport: Mutex::new(transport),
            terminated: AtomicBool::new(false),
        }
    }

    /// True once a terminate frame has been observed on this dispatcher.
    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Send a request built from `template`/`args` (or nothing, for a
    /// pure receive) and wait for a matching reply, retrying up to
    /// `retries` additional times. Events encountered along the way are
    /// handed to `on_event` before the retry counter advances.
    #[allow(clippy::too_many_arguments)]
    pub fn send_wait(
        &self,
        profile: &dyn PanelProfile,
        template: Option<MessageTemplate>,
        args: &MessageArgs,
        mut retries: u32,
        timeout: Duration,
        reply_expected: Option<u8>,
        mut on_event: impl FnMut(RawEvent),
    ) -> Result<Option<ParsedMessage>, DispatcherError> {
        let message = template.map(|t| profile.get_message(t, args));
        let is_pure_receive = message.is_none();

        loop {
            let raw = {
                let mut transport = self.transport.lock().unwrap();
                if let Some(bytes) = &message {
                    transport.send(bytes)?;
                }
                transport.recv(timeout)?
            };

            let Some(raw) = raw else {
                if is_pure_receive {
                    return Ok(None);
                }
                if retries == 0 {
                    return Ok(None);
                }
                retries -= 1;
                continue;
            };

            let Some(parsed) = profile.parse_message(&raw) else {
                // Not a complete/known message: treat like empty data.
                if retries == 0 && !is_pure_receive {
                    return Ok(None);
                }
                if !is_pure_receive {
                    retries -= 1;
                }
                continue;
            };

            match self.classify(&parsed, reply_expected) {
                Step::Matched(msg) => return Ok(Some(msg)),
                Step::Terminated => {
                    self.terminated.store(true, Ordering::SeqCst);
                    return Ok(None);
                }
                Step::EventConsumed => {
                    if let ParsedMessage::Event { major, minor, kind } = parsed {
                        on_event(RawEvent {
                            major,
                            minor,
                            kind: EventTargetKind::from(kind.as_str()),
                        });
                    }
                    if is_pure_receive {
                        return Ok(None);
                    }
                    // Events don't consume a retry.
                }
                Step::Retry => {
                    if retries == 0 {
                        return Ok(None);
                    }
                    retries -= 1;
                }
            }
        }
    }

    fn classify(&self, parsed: &ParsedMessage, reply_expected: Option<u8>) -> Step {
        match parsed {
            ParsedMessage::Event { .. } => Step::EventConsumed,
            ParsedMessage::Terminate => Step::Terminated,
            other => {
                let code = other.command_code();
                match reply_expected {
                    Some(expected) if expected != code => {
                        log::error!("got message {code:#04x} but expected {expected:#04x}");
                        Step::Retry
                    }
                    _ => Step::Matched(other.clone()),
                }
            }
        }
    }

    /// Close the underlying transport.
    pub fn close(&self) {
        self.transport.lock().unwrap().close();
    }
}
