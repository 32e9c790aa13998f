pub mod breaker;
pub mod types;
pub mod window;

pub use breaker::{CallPermit, CircuitBreaker};
pub use types::{
    CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState, StateListener, StateTransition,
};
pub use window::{HealthSnapshot, SlidingWindowCounter};
