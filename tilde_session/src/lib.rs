//! Session core of the Tilde viewer client: request gate, reply dispatch,
//! navigation state machine and reconnect policy.
//!
//! Everything here is synchronous. A host feeds transport events through a
//! crossbeam channel and calls [`SessionController::tick`] periodically.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod handlers;
mod intents;
pub mod navigation;
pub mod panels;
pub mod renderer;
pub mod settings;
pub mod state;
pub mod transport;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::SessionError;
pub use intents::{DbEngine, GeneralSettings, PgCredentials};
pub use panels::{ObjectHash, Pane};
pub use renderer::{Notice, ScanEvent, TagsUpdate, Urgency, View, ViewRenderer};
pub use settings::{FileSettingsStore, MemorySettingsStore, Settings, SettingsStore, Units};
pub use transport::{Transport, TransportError, TransportEvent};
