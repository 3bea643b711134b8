pub mod access;
pub mod channels;
pub mod commands;
pub mod config;
pub mod limits;
pub mod placeholders;
pub mod shared;
pub mod store;
pub mod tasks;
pub mod tenant;
pub mod tests;
pub mod tickets;

pub use config::EngineConfig;
pub use shared::error::TicketError;
pub use tickets::{Invocation, Origin, TicketEngine, TicketRef};
