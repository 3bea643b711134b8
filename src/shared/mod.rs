pub mod error;
pub mod models;
pub mod utils;

pub use error::{ArchiveError, InfraError, PlatformError, TicketError, ValidationError};
