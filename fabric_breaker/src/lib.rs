//! Circuit breaker with generation-token state tracking and a named
//! global registry, mirroring `original_source/lib/breaker`.

mod breaker;
mod config;
mod error;
mod registry;
mod two_step;

pub use breaker::{Breaker, CircuitBreaker, Counts, OnStateChange, ReadyToTrip, Settings, State};
pub use config::{BreakerConfig, ConfigError, setup};
pub use error::{BreakerError, Rejection};
pub use registry::{
    do_async_with_acceptable, do_async_with_fallback_acceptable, do_call, do_with_acceptable,
    do_with_fallback, do_with_fallback_acceptable, get_or_create, no_break_for, set_breaker,
};
pub use two_step::TwoStepBreaker;
