//! `crosswalk-server` — the linking service and its TCP transport.

pub mod config;
pub mod server;
pub mod service;

pub use config::ServerConfig;
pub use server::LinkServer;
pub use service::{Clock, LinkingService, SystemClock, LINK_THRESHOLD};
