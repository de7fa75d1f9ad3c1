//! Two-step breaker, translated from
//! `original_source/lib/breaker/twostepbreaker.go`, for callers that can't
//! express their request as a single closure (e.g. a streaming RPC where
//! success/failure is only known after the caller has moved on).

use crate::breaker::{CircuitBreaker, Settings};
use crate::error::Rejection;

pub struct TwoStepBreaker {
    cb: CircuitBreaker,
}

impl TwoStepBreaker {
    pub fn new() -> Self {
        Self {
            cb: CircuitBreaker::new(),
        }
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            cb: CircuitBreaker::with_settings(settings),
        }
    }

    pub fn name(&self) -> &str {
        self.cb.name()
    }

    /// Checks whether a request may proceed. On success, returns a callback
    /// that must be invoked exactly once with the outcome; dropping it
    /// without calling leaves the request's generation uncounted.
    pub fn allow(&self) -> Result<impl FnOnce(bool) + '_, Rejection> {
        let generation = self.cb.before_request_pub()?;
        Ok(move |success: bool| self.cb.after_request_pub(generation, success))
    }
}

impl Default for TwoStepBreaker {
    fn default() -> Self {
        Self::new()
    }
}
