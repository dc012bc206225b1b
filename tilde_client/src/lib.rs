pub mod app;
pub mod cli;
pub mod commands;
pub mod console;
pub mod mock_server;
pub mod ws_actor;

pub use mock_server::{Fixture, MockServer};
pub use ws_actor::{ActorTransport, LinkCommand};
