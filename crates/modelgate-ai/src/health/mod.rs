//! Model health tracking

mod breaker;
mod clock;

pub use breaker::{
    BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitState,
};
pub use clock::{Clock, ManualClock, SystemClock};
