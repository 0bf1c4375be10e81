//! Bridge between a Paradox IP150-connected alarm panel and a notification
//! layer: encrypted/framed transport, request/reply dispatch, a live state
//! mirror, and a control surface for arming/bypassing/toggling outputs.

pub mod config;
pub mod constants;
pub mod control;
pub mod crypto;
pub mod dispatcher;
pub mod notifier;
pub mod profile;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use config::Config;
pub use control::ControlSurface;
pub use dispatcher::Dispatcher;
pub use notifier::{LoggingNotifier, Notifier, Severity};
pub use state::{ElementKind, StateStore};
pub use supervisor::{RunState, Supervisor};
pub use transport::Transport;
