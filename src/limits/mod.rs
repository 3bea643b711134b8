pub mod lease;
pub mod rate_limit;

pub use lease::{Lease, OpenLock};
pub use rate_limit::RateLimiter;
