pub mod policy;
pub mod schedule;
pub mod types;

pub use policy::RetryPolicy;
pub use schedule::{BackoffSchedule, LinearBackoff};
pub use types::{BackoffType, RetryConfig};
